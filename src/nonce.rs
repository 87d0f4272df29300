use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use constant_time_eq::constant_time_eq;
use rand::Rng;

/// Generates a cryptographically random state parameter for `OAuth2`.
///
/// Returns a 32-character URL-safe string (24 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 24] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Compares the state echoed by the provider with the one issued at initiate.
///
/// Constant time in the length of the inputs.
#[must_use]
pub fn verify_state(expected: &str, received: &str) -> bool {
    constant_time_eq(expected.as_bytes(), received.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_length() {
        assert_eq!(generate_state().len(), 32);
    }

    #[test]
    fn test_state_url_safe() {
        let state = generate_state();
        assert!(
            state
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "state should be URL-safe: {state}"
        );
    }

    #[test]
    fn test_state_uniqueness() {
        assert_ne!(generate_state(), generate_state(), "states should be unique");
    }

    #[test]
    fn test_verify_state() {
        let state = generate_state();
        assert!(verify_state(&state, &state.clone()));
        assert!(!verify_state(&state, &generate_state()));
        assert!(!verify_state(&state, &state[..10]));
        assert!(!verify_state("", "x"));
        assert!(verify_state("", ""));
    }
}
