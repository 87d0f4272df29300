use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::identity::{Identity, LoginAction};
use crate::nonce;
use crate::retry::RetryPolicy;

/// Bound applied to every call made to the identity provider.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// `OAuth2` client configuration for the storefront identity provider.
///
/// Required fields are constructor parameters.
///
/// ```rust,ignore
/// use storefront_gateway::OAuthConfig;
///
/// let config = OAuthConfig::new(
///     "storefront",
///     "secret",
///     "https://idp.example.com/oauth2/auth".parse()?,
///     "https://idp.example.com/oauth2/token".parse()?,
///     "https://shop.example.com/callback".parse()?,
/// )
/// .with_userinfo_url("https://idp.example.com/userinfo".parse()?);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) redirect_uri: Url,
    pub(crate) userinfo_url: Option<Url>,
    pub(crate) scopes: Vec<String>,
}

impl OAuthConfig {
    /// Create a new `OAuth2` configuration with the default scopes
    /// (`offline`, `openid`).
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_url: Url,
        token_url: Url,
        redirect_uri: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url,
            token_url,
            redirect_uri,
            userinfo_url: None,
            scopes: vec!["offline".into(), "openid".into()],
        }
    }

    /// Load the profile from a userinfo endpoint after the code exchange.
    ///
    /// Without one, identities carry an empty profile object.
    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = Some(url);
        self
    }

    /// Override the `OAuth2` scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn userinfo_url(&self) -> Option<&Url> {
        self.userinfo_url.as_ref()
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("userinfo_url", &self.userinfo_url.as_ref().map(Url::as_str))
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Extension point for extra authorization request parameters.
///
/// Called once per initiate; the returned pairs are appended to the
/// authorization URL after the standard `OAuth2` parameters.
pub trait AuthorizationParams: Send + Sync + 'static {
    fn params(&self, login_action: Option<LoginAction>) -> Vec<(String, String)>;
}

/// Default hook: forwards `loginAction` and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginActionParams;

impl AuthorizationParams for LoginActionParams {
    fn params(&self, login_action: Option<LoginAction>) -> Vec<(String, String)> {
        login_action
            .map(|action| vec![("loginAction".to_owned(), action.as_str().to_owned())])
            .unwrap_or_default()
    }
}

/// `OAuth2` authorization-code client for the storefront identity provider.
#[derive(Clone)]
pub struct AuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
    timeout: Duration,
    params: Arc<dyn AuthorizationParams>,
    refresh_policy: RetryPolicy,
}

/// Authorization URL plus the state nonce to keep in the session.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Token response from the provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Result of a completed callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Authentication {
    pub identity: Identity,
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl AuthClient {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            timeout: DEFAULT_HTTP_TIMEOUT,
            params: Arc::new(LoginActionParams),
            refresh_policy: RetryPolicy::default(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Per-request timeout for provider calls.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the authorization parameter hook.
    #[must_use]
    pub fn with_authorization_params(mut self, params: impl AuthorizationParams) -> Self {
        self.params = Arc::new(params);
        self
    }

    /// Backoff for [`refresh`](Self::refresh). Pass [`RetryPolicy::none`]
    /// to make a single attempt.
    #[must_use]
    pub fn with_refresh_policy(mut self, policy: RetryPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the authorization URL for a new login attempt.
    #[must_use]
    pub fn authorization_url(&self, login_action: Option<LoginAction>) -> AuthorizationRequest {
        let state = nonce::generate_state();
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", self.config.redirect_uri.as_str())
                .append_pair("scope", &scope)
                .append_pair("state", &state);
            for (name, value) in self.params.params(login_action) {
                query.append_pair(&name, &value);
            }
        }

        AuthorizationRequest {
            url: url.into(),
            state,
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Not retried: a code is single-use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, [`Error::InvalidGrant`]
    /// if the code was rejected, or [`Error::OAuth`] for any other
    /// non-success answer.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.token_request("token exchange", &params).await
    }

    /// Fetch the user's profile with an access token.
    ///
    /// Returns an empty object when no userinfo endpoint is configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::OAuth`] if the userinfo endpoint returns an error.
    pub async fn user_profile(&self, access_token: &str) -> Result<serde_json::Value, Error> {
        let Some(userinfo_url) = &self.config.userinfo_url else {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        };

        let response = self
            .http
            .get(userinfo_url.clone())
            .timeout(self.timeout)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let response = Self::ensure_success(response, "userinfo request").await?;
        response.json().await.map_err(Into::into)
    }

    /// Complete the callback step: exchange the code, then load the profile.
    ///
    /// # Errors
    ///
    /// Propagates any failure of [`exchange_code`](Self::exchange_code) or
    /// [`user_profile`](Self::user_profile).
    pub async fn authenticate(&self, code: &str) -> Result<Authentication, Error> {
        let tokens = self.exchange_code(code).await?;
        let profile = self.user_profile(&tokens.access_token).await?;

        Ok(Authentication {
            identity: Identity::new(tokens.access_token, profile),
            refresh_token: tokens.refresh_token,
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Transient failures are retried per the client's [`RetryPolicy`];
    /// a rejected grant is returned immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGrant`] if the provider rejected the refresh
    /// token, otherwise the last transport or provider error.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.refresh_policy
            .run("token refresh", || self.token_request("token refresh", &params))
            .await
    }

    async fn token_request(
        &self,
        operation: &'static str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(self.config.token_url.clone())
            .timeout(self.timeout)
            .header(ACCEPT, "application/json")
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response.json::<TokenResponse>().await.map_err(Into::into);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<TokenErrorBody>(&body) {
            Ok(err) if err.error == "invalid_grant" => Err(Error::InvalidGrant {
                operation,
                detail: err.error_description.unwrap_or_default(),
            }),
            _ => Err(Error::OAuth {
                operation,
                status: status.as_u16(),
                detail: body,
            }),
        }
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(Error::OAuth {
            operation,
            status,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(idp: &str) -> OAuthConfig {
        OAuthConfig::new(
            "test-client",
            "test-secret",
            format!("{idp}/oauth2/auth").parse().unwrap(),
            format!("{idp}/oauth2/token").parse().unwrap(),
            "https://shop.example.com/callback".parse().unwrap(),
        )
    }

    fn fast_retries() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        }
    }

    fn query_value(url: &str, name: &str) -> Option<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_authorization_url_contains_standard_params() {
        let client = AuthClient::new(test_config("https://idp.example.com"));
        let req = client.authorization_url(Some(LoginAction::Signin));

        assert!(req.url.starts_with("https://idp.example.com/oauth2/auth?"));
        assert_eq!(query_value(&req.url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_value(&req.url, "client_id").as_deref(), Some("test-client"));
        assert_eq!(
            query_value(&req.url, "redirect_uri").as_deref(),
            Some("https://shop.example.com/callback")
        );
        assert_eq!(query_value(&req.url, "scope").as_deref(), Some("offline openid"));
        assert_eq!(query_value(&req.url, "state"), Some(req.state.clone()));
        assert_eq!(query_value(&req.url, "loginAction").as_deref(), Some("signin"));
        assert!(!req.url.contains("client_secret"));
    }

    #[test]
    fn test_authorization_url_without_login_action() {
        let client = AuthClient::new(test_config("https://idp.example.com"));
        let req = client.authorization_url(None);
        assert_eq!(query_value(&req.url, "loginAction"), None);
    }

    #[test]
    fn test_authorization_url_unique_per_call() {
        let client = AuthClient::new(test_config("https://idp.example.com"));
        let req1 = client.authorization_url(None);
        let req2 = client.authorization_url(None);
        assert_ne!(req1.state, req2.state);
    }

    #[test]
    fn test_custom_authorization_params() {
        struct Locale;
        impl AuthorizationParams for Locale {
            fn params(&self, login_action: Option<LoginAction>) -> Vec<(String, String)> {
                let mut params = LoginActionParams.params(login_action);
                params.push(("ui_locales".into(), "de".into()));
                params
            }
        }

        let client = AuthClient::new(test_config("https://idp.example.com"))
            .with_authorization_params(Locale);
        let req = client.authorization_url(Some(LoginAction::Signup));

        assert_eq!(query_value(&req.url, "loginAction").as_deref(), Some("signup"));
        assert_eq!(query_value(&req.url, "ui_locales").as_deref(), Some("de"));
    }

    #[test]
    fn test_custom_scopes() {
        let config = test_config("https://idp.example.com")
            .with_scopes(vec!["openid".into(), "profile".into(), "email".into()]);
        let req = AuthClient::new(config).authorization_url(None);

        assert_eq!(query_value(&req.url, "scope").as_deref(), Some("openid profile email"));
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let debug = format!("{:?}", test_config("https://idp.example.com"));
        assert!(!debug.contains("test-secret"));
        assert!(debug.contains("[redacted]"));
    }

    #[tokio::test]
    async fn test_exchange_code_sends_client_credentials() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("client_secret=test-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "token_type": "bearer",
                "refresh_token": "rt-1",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&idp)
            .await;

        let client = AuthClient::new(test_config(&idp.uri()));
        let tokens = client.exchange_code("abc").await.unwrap();

        assert_eq!(tokens.access_token, "at-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "code expired"
            })))
            .expect(1)
            .mount(&idp)
            .await;

        let client = AuthClient::new(test_config(&idp.uri()));
        let err = client.exchange_code("stale").await.unwrap_err();

        assert!(matches!(err, Error::InvalidGrant { detail, .. } if detail == "code expired"));
    }

    #[tokio::test]
    async fn test_authenticate_without_userinfo_has_empty_profile() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at-1" })),
            )
            .mount(&idp)
            .await;

        let client = AuthClient::new(test_config(&idp.uri()));
        let auth = client.authenticate("abc").await.unwrap();

        assert_eq!(auth.identity, Identity::new("at-1", json!({})));
        assert_eq!(auth.refresh_token, None);
    }

    #[tokio::test]
    async fn test_authenticate_loads_profile() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at-1" })),
            )
            .mount(&idp)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "sub": "users:42" })),
            )
            .expect(1)
            .mount(&idp)
            .await;

        let config = test_config(&idp.uri())
            .with_userinfo_url(format!("{}/userinfo", idp.uri()).parse().unwrap());
        let auth = AuthClient::new(config).authenticate("abc").await.unwrap();

        assert_eq!(auth.identity.profile, json!({ "sub": "users:42" }));
    }

    #[tokio::test]
    async fn test_authenticate_fails_when_userinfo_fails() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at-1" })),
            )
            .mount(&idp)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&idp)
            .await;

        let config = test_config(&idp.uri())
            .with_userinfo_url(format!("{}/userinfo", idp.uri()).parse().unwrap());
        let err = AuthClient::new(config).authenticate("abc").await.unwrap_err();

        assert!(matches!(err, Error::OAuth { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_refresh_retries_server_errors() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&idp)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at-2" })),
            )
            .expect(1)
            .mount(&idp)
            .await;

        let client = AuthClient::new(test_config(&idp.uri())).with_refresh_policy(fast_retries());
        let tokens = client.refresh("rt-1").await.unwrap();

        assert_eq!(tokens.access_token, "at-2");
    }

    #[tokio::test]
    async fn test_refresh_does_not_retry_invalid_grant() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
            )
            .expect(1)
            .mount(&idp)
            .await;

        let client = AuthClient::new(test_config(&idp.uri())).with_refresh_policy(fast_retries());
        let err = client.refresh("revoked").await.unwrap_err();

        assert!(matches!(err, Error::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_refresh_without_retries() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&idp)
            .await;

        let client =
            AuthClient::new(test_config(&idp.uri())).with_refresh_policy(RetryPolicy::none());
        let err = client.refresh("rt-1").await.unwrap_err();

        assert!(matches!(err, Error::OAuth { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_refresh_retries_timeouts() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "too-late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(3)
            .mount(&idp)
            .await;

        let client = AuthClient::new(test_config(&idp.uri()))
            .with_timeout(Duration::from_millis(50))
            .with_refresh_policy(fast_retries());
        let err = client.refresh("rt-1").await.unwrap_err();

        assert!(matches!(&err, Error::Http(e) if e.is_timeout()));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_refresh_retries_connection_failures() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let idp = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        let client = AuthClient::new(test_config(&idp)).with_refresh_policy(policy);
        let started = std::time::Instant::now();
        let err = client.refresh("rt-1").await.unwrap_err();

        assert!(matches!(&err, Error::Http(e) if e.is_connect()));
        assert!(err.is_transient());
        // Backoff of 20 ms then 40 ms: only reached after three failed attempts.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
