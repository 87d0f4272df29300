use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};
use url::Url;

use super::error::AuthError;
use super::session::{SessionKeys, SessionStore};
use crate::logout::RemoteLogout;
use crate::oauth::{AuthClient, AuthorizationParams, DEFAULT_HTTP_TIMEOUT, OAuthConfig};

/// Gateway configuration.
///
/// Required collaborators are constructor parameters.
///
/// Use [`from_env()`](GatewayConfig::from_env) for convention-based setup,
/// or [`new()`](GatewayConfig::new) with `with_*` methods for full control.
pub struct GatewayConfig {
    pub(super) client: AuthClient,
    pub(super) logout: RemoteLogout,
    pub(super) sessions: SessionStore,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(client: AuthClient, logout: RemoteLogout, session_keys: SessionKeys) -> Self {
        Self {
            client,
            logout,
            sessions: SessionStore::new(session_keys),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `OAUTH2_AUTH_URL`, `OAUTH2_TOKEN_URL`: provider endpoints
    /// - `OAUTH2_CLIENT_ID`, `OAUTH2_CLIENT_SECRET`: client credentials
    /// - `OAUTH2_REDIRECT_URL`: callback URL registered with the provider
    /// - `OAUTH2_IDP_HOST_URL`: provider base URL; `logout` is appended
    /// - `SESSION_SECRET`: primary session signing secret
    ///
    /// # Optional env vars
    /// - `SESSION_MAX_AGE_MS`: session lifetime (default 24 hours)
    /// - `SESSION_PREVIOUS_SECRETS`: comma-separated retired secrets, still accepted on read
    /// - `SESSION_SECURE_COOKIES`: `"false"`/`"0"` drops the `Secure` attribute
    /// - `OAUTH2_USERINFO_URL`: profile endpoint queried after the code exchange
    /// - `OAUTH2_HTTP_TIMEOUT_MS`: timeout for provider calls (default 10 s)
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env()`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required values are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            var(name).ok_or_else(|| AuthError::Config(format!("{name} is required")))
        };
        let url = |name: &str, value: String| {
            value
                .parse::<Url>()
                .map_err(|e| AuthError::Config(format!("{name}: {e}")))
        };
        let millis = |name: &str| {
            var(name)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|e| AuthError::Config(format!("{name}: {e}")))
                })
                .transpose()
        };

        let mut oauth = OAuthConfig::new(
            required("OAUTH2_CLIENT_ID")?,
            required("OAUTH2_CLIENT_SECRET")?,
            url("OAUTH2_AUTH_URL", required("OAUTH2_AUTH_URL")?)?,
            url("OAUTH2_TOKEN_URL", required("OAUTH2_TOKEN_URL")?)?,
            url("OAUTH2_REDIRECT_URL", required("OAUTH2_REDIRECT_URL")?)?,
        );
        if let Some(userinfo) = var("OAUTH2_USERINFO_URL") {
            oauth = oauth.with_userinfo_url(url("OAUTH2_USERINFO_URL", userinfo)?);
        }

        let idp_host = required("OAUTH2_IDP_HOST_URL")?;
        let logout = RemoteLogout::new(&idp_host)
            .map_err(|e| AuthError::Config(format!("OAUTH2_IDP_HOST_URL: {e}")))?;

        let mut secrets = vec![required("SESSION_SECRET")?];
        if let Some(previous) = var("SESSION_PREVIOUS_SECRETS") {
            secrets.extend(
                previous
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
            );
        }
        let keys = SessionKeys::from_secrets(&secrets)?;

        let max_age = millis("SESSION_MAX_AGE_MS")?
            .map(|ms| Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX)))
            .unwrap_or(super::session::DEFAULT_SESSION_MAX_AGE);
        if OffsetDateTime::now_utc().checked_add(max_age).is_none() {
            return Err(AuthError::Config(
                "SESSION_MAX_AGE_MS: session expiry would be out of range".into(),
            ));
        }
        let timeout = millis("OAUTH2_HTTP_TIMEOUT_MS")?
            .map(StdDuration::from_millis)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let secure = !matches!(
            var("SESSION_SECURE_COOKIES").as_deref().map(str::trim),
            Some("0") | Some("false"),
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("HTTP client: {e}")))?;

        Ok(Self::new(
            AuthClient::new(oauth).with_http_client(http.clone()),
            logout.with_http_client(http),
            keys,
        )
        .with_timeout(timeout)
        .with_session_max_age(max_age)
        .with_secure_cookies(secure))
    }

    /// Timeout for every call to the identity provider.
    #[must_use]
    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self.logout = self.logout.with_timeout(timeout);
        self
    }

    #[must_use]
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.sessions = self.sessions.with_max_age(max_age);
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.sessions = self.sessions.with_cookie_name(name);
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.sessions = self.sessions.with_secure(secure);
        self
    }

    #[must_use]
    pub fn with_authorization_params(mut self, params: impl AuthorizationParams) -> Self {
        self.client = self.client.with_authorization_params(params);
        self
    }

    #[must_use]
    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}
