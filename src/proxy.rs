//! Reverse proxy to the storefront application.

use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::error::Error;
use crate::middleware::AuthUser;

/// Header carrying the signed-in user's access token to the application.
pub const ACCESS_TOKEN_HEADER: &str = "x-forwarded-access-token";

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Per-request timeout for upstream calls.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The application behind the gateway.
#[derive(Debug, Clone)]
pub struct Downstream {
    origin: Url,
    http: reqwest::Client,
    timeout: Duration,
}

impl Downstream {
    /// Proxy to `origin`; the request path and query replace those of the URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(origin: Url) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            origin,
            http,
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A router that forwards every request.
    pub fn into_router(self) -> Router {
        Router::new().fallback(forward).with_state(self)
    }

    fn upstream_url(&self, request: &Request) -> Url {
        let mut url = self.origin.clone();
        url.set_path(request.uri().path());
        url.set_query(request.uri().query());
        url
    }

    async fn send(&self, user: Option<AuthUser>, request: Request) -> Result<Response, Response> {
        let url = self.upstream_url(&request);
        let (parts, body) = request.into_parts();

        let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
            tracing::warn!(error = %e, "Request body rejected");
            (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
        })?;

        let mut headers = strip_hop_by_hop(parts.headers);
        headers.remove(axum::http::header::HOST);
        headers.remove(ACCESS_TOKEN_HEADER);
        if let Some(user) = user {
            if let Ok(token) = HeaderValue::try_from(user.access_token.as_str()) {
                headers.insert(HeaderName::from_static(ACCESS_TOKEN_HEADER), token);
            }
        }

        let upstream = self
            .http
            .request(parts.method, url)
            .timeout(self.timeout)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| bad_gateway(&e))?;

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers().clone());
        let body = upstream.bytes().await.map_err(|e| bad_gateway(&e))?;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

async fn forward(
    State(downstream): State<Downstream>,
    user: Option<AuthUser>,
    request: Request,
) -> Response {
    match downstream.send(user, request).await {
        Ok(response) | Err(response) => response,
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

fn bad_gateway(error: &reqwest::Error) -> Response {
    tracing::error!(error = %error, "Upstream request failed");
    (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
}
