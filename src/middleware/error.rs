use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Authentication errors for the gateway routes.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authenticated identity on the request.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Callback arrived but no login was initiated from this session.
    #[error("Unable to verify authorization request state")]
    MissingState,

    /// Callback `state` differs from the one issued at initiate.
    #[error("Invalid authorization request state")]
    StateMismatch,

    /// The identity provider returned an `error` to the callback.
    #[error("Authorization denied: {0}")]
    Denied(String),

    /// Code exchange or profile load failed.
    #[error("Authentication failed: {0}")]
    Exchange(#[source] crate::error::Error),

    /// The session's `user` field could not be deserialized.
    #[error("Corrupt session identity: {0}")]
    CorruptIdentity(#[source] crate::error::Error),

    /// The opaque user id in the logout path did not resolve to an id.
    #[error("Invalid user identifier")]
    InvalidUserId,

    /// The identity provider's logout endpoint could not be reached or refused.
    #[error("Identity provider logout failed: {0}")]
    Logout(#[source] crate::error::Error),

    /// A redirect target could not be used as a `Location` header.
    #[error("Invalid redirect target")]
    InvalidRedirect,

    /// Session could not be written.
    #[error("Session error: {0}")]
    Session(#[source] crate::error::Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::Denied(_) => StatusCode::UNAUTHORIZED,
            Self::MissingState | Self::StateMismatch => StatusCode::FORBIDDEN,
            Self::InvalidUserId | Self::InvalidRedirect => StatusCode::BAD_REQUEST,
            Self::Exchange(_) | Self::Logout(_) => StatusCode::BAD_GATEWAY,
            Self::CorruptIdentity(_) | Self::Session(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Unauthenticated
            | Self::MissingState
            | Self::StateMismatch
            | Self::InvalidUserId
            | Self::InvalidRedirect => (status, self.to_string()).into_response(),
            Self::Denied(_) | Self::Exchange(_) => (status, "Authentication failed").into_response(),
            Self::Logout(_) => (status, "Logout failed").into_response(),
            Self::CorruptIdentity(_) | Self::Session(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Gateway internal error");
                (status, "Internal error").into_response()
            }
        }
    }
}
