#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The identity provider answered with a non-success status.
    #[error("{operation} failed with status {status}: {detail}")]
    OAuth {
        operation: &'static str,
        status: u16,
        detail: String,
    },
    /// The token endpoint rejected the grant (`invalid_grant`). Never retried.
    #[error("{operation} rejected: invalid_grant ({detail})")]
    InvalidGrant {
        operation: &'static str,
        detail: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Identity serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The session lifetime pushes the expiry past the representable range.
    #[error("Session lifetime out of range")]
    SessionLifetime,
}

impl Error {
    /// Whether a retry of the same request could plausibly succeed.
    ///
    /// Transport failures (connect, timeout, interrupted body) and 5xx
    /// answers are transient; any other provider answer is final.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::OAuth { status, .. } => *status >= 500,
            Self::InvalidGrant { .. }
            | Self::Url(_)
            | Self::Serialization(_)
            | Self::SessionLifetime => false,
        }
    }
}
