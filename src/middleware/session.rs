//! Client-held signed session.
//!
//! The whole session lives in one cookie: base64url JSON, signed with the
//! primary key. The expiry instant travels inside the signed payload, so an
//! old cookie replayed by a client is rejected even if the browser kept it.

use std::fmt;

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, Key};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cookie::CookieJar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use time::{Duration, OffsetDateTime};

use super::cookies;
use super::error::AuthError;
use crate::error::Error;
use crate::identity::Identity;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "storefront-session";

/// Default session lifetime (24 hours).
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::hours(24);

/// Session contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Serialized [`Identity`], set by a successful callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Where to send the user after the callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    /// State nonce of the login currently in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_state: Option<String>,
}

impl Session {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.redirect_to.is_none() && self.oauth_state.is_none()
    }

    /// Deserialize the stored identity, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if `user` holds something other than
    /// a serialized identity.
    pub fn identity(&self) -> Result<Option<Identity>, Error> {
        self.user
            .as_deref()
            .map(Identity::from_session_value)
            .transpose()
    }
}

#[derive(Serialize)]
struct SignedPayload<'a> {
    #[serde(flatten)]
    session: &'a Session,
    expires_at: i64,
}

#[derive(Deserialize)]
struct VerifiedPayload {
    #[serde(flatten)]
    session: Session,
    expires_at: i64,
}

fn unix_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Ordered signing keys. The first is primary and signs every write; all of
/// them are accepted on read, which lets a secret be rotated without logging
/// everyone out.
#[derive(Clone)]
pub struct SessionKeys {
    keys: Vec<Key>,
}

impl SessionKeys {
    /// Derive keys from secrets, primary first.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if no secret is given or one is empty.
    pub fn from_secrets<I, S>(secrets: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let keys = secrets
            .into_iter()
            .map(|secret| {
                let secret = secret.as_ref();
                if secret.is_empty() {
                    return Err(AuthError::Config("session secrets must not be empty".into()));
                }
                Ok(Key::from(Sha512::digest(secret).as_slice()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if keys.is_empty() {
            return Err(AuthError::Config("at least one session secret is required".into()));
        }
        Ok(Self { keys })
    }

    fn primary(&self) -> &Key {
        &self.keys[0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("count", &self.keys.len())
            .finish_non_exhaustive()
    }
}

/// Reads and writes the session cookie.
#[derive(Debug, Clone)]
pub struct SessionStore {
    keys: SessionKeys,
    cookie_name: String,
    max_age: Duration,
    secure: bool,
}

impl SessionStore {
    #[must_use]
    pub fn new(keys: SessionKeys) -> Self {
        Self {
            keys,
            cookie_name: SESSION_COOKIE_NAME.into(),
            max_age: DEFAULT_SESSION_MAX_AGE,
            secure: true,
        }
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Decode a raw cookie value as seen at `now`.
    ///
    /// Never fails: a missing, forged, malformed or expired cookie is an
    /// empty session.
    #[must_use]
    pub fn load(&self, raw: Option<&str>, now: OffsetDateTime) -> Session {
        let Some(raw) = raw else {
            return Session::default();
        };

        let Some(payload) = self.verify(raw) else {
            tracing::debug!("Session signature not accepted by any key");
            return Session::default();
        };

        let verified = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|json| serde_json::from_slice::<VerifiedPayload>(&json).ok());
        let Some(verified) = verified else {
            tracing::debug!("Session payload malformed");
            return Session::default();
        };

        if unix_millis(now) >= verified.expires_at {
            tracing::debug!("Session expired");
            return Session::default();
        }
        verified.session
    }

    /// [`load`](Self::load) the session cookie from request headers.
    #[must_use]
    pub fn load_from_headers(&self, headers: &HeaderMap, now: OffsetDateTime) -> Session {
        let raw = cookies::session_value(headers, &self.cookie_name);
        self.load(raw.as_deref(), now)
    }

    /// Cookie carrying `session`, written at `now`.
    ///
    /// An empty session produces a removal cookie.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the session cannot be encoded, or
    /// [`Error::SessionLifetime`] if `now + max_age` is not a valid timestamp.
    pub fn session_cookie(&self, session: &Session, now: OffsetDateTime) -> Result<Cookie<'static>, Error> {
        if session.is_empty() {
            return Ok(cookies::clear_session_cookie(&self.cookie_name));
        }

        let expires_at = now
            .checked_add(self.max_age)
            .ok_or(Error::SessionLifetime)?;
        let payload = SignedPayload {
            session,
            expires_at: unix_millis(expires_at),
        };
        let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);

        Ok(cookies::session_cookie(
            &self.cookie_name,
            self.sign(encoded),
            self.max_age,
            self.secure,
        ))
    }

    fn sign(&self, value: String) -> String {
        let mut jar = CookieJar::new();
        jar.signed_mut(self.keys.primary())
            .add(Cookie::new(self.cookie_name.clone(), value));
        jar.get(&self.cookie_name)
            .map(|c| c.value().to_string())
            .unwrap_or_default()
    }

    fn verify(&self, raw: &str) -> Option<String> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(self.cookie_name.clone(), raw.to_string()));
        self.keys
            .keys
            .iter()
            .find_map(|key| jar.signed(key).get(&self.cookie_name))
            .map(|c| c.value().to_string())
    }
}
