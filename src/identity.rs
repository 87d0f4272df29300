use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identity established by a successful code exchange.
///
/// Stored verbatim (as JSON text) in the session's `user` field. `profile`
/// is whatever the identity provider returned; no schema is imposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub access_token: String,
    pub profile: serde_json::Value,
}

impl Identity {
    #[must_use]
    pub fn new(access_token: impl Into<String>, profile: serde_json::Value) -> Self {
        Self {
            access_token: access_token.into(),
            profile,
        }
    }

    /// Serialize for storage in the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the profile cannot be encoded.
    pub fn to_session_value(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// Inverse of [`to_session_value`](Self::to_session_value).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] for anything that is not a serialized
    /// identity. Callers treat this as tampering, not as an anonymous user.
    pub fn from_session_value(value: &str) -> Result<Self, Error> {
        serde_json::from_str(value).map_err(Into::into)
    }
}

/// Which login screen the identity provider should show.
///
/// Only echoed to the authorization endpoint; never part of the token exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginAction {
    Signin,
    Signup,
}

impl LoginAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signin => "signin",
            Self::Signup => "signup",
        }
    }
}

impl fmt::Display for LoginAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
