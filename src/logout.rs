use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::oauth::DEFAULT_HTTP_TIMEOUT;

/// Client for the identity provider's logout endpoint (`<host>logout?userId=<id>`).
#[derive(Debug, Clone)]
pub struct RemoteLogout {
    endpoint: Url,
    http: reqwest::Client,
    timeout: Duration,
}

impl RemoteLogout {
    /// `idp_host` is used as a prefix: `logout` is appended verbatim, so
    /// it normally ends with `/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the resulting endpoint is not a valid URL.
    pub fn new(idp_host: &str) -> Result<Self, Error> {
        let endpoint = Url::parse(&format!("{idp_host}logout"))?;
        Ok(Self {
            endpoint,
            http: reqwest::Client::new(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Logout URL for one user.
    #[must_use]
    pub fn logout_url(&self, user_id: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("userId", user_id);
        url
    }

    /// Ends the user's session at the identity provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failure or timeout, and
    /// [`Error::OAuth`] when the provider answers with a non-success status.
    pub async fn logout(&self, user_id: &str) -> Result<(), Error> {
        let response = self
            .http
            .get(self.logout_url(user_id))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        Err(Error::OAuth {
            operation: "remote logout",
            status: status.as_u16(),
            detail,
        })
    }
}
