use std::convert::Infallible;

use axum::Router;
use axum::extract::{Extension, Path, Query, Request, State};
use axum::http::header::{LOCATION, REFERER, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use serde::Deserialize;
use time::OffsetDateTime;
use tower::Service;

use super::config::GatewayConfig;
use super::error::AuthError;
use super::extractor::AuthUser;
use super::session::Session;
use super::state::GatewayState;
use crate::identity::LoginAction;
use crate::nonce;
use crate::opaque_id::decode_opaque_id;

/// Create the gateway router.
///
/// `/signin`, `/signup`, `/callback` and `/logout/{user_id}` are handled
/// here; every other request (including other methods on those paths) goes
/// to `downstream`. All requests pass through the session stage first, so
/// downstream handlers can extract [`AuthUser`].
pub fn gateway_router<D>(config: GatewayConfig, downstream: D) -> Router
where
    D: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
    D::Response: IntoResponse + 'static,
    D::Future: Send + 'static,
{
    let state = GatewayState::from(config);

    let auth_route = |route: MethodRouter<GatewayState>| route.fallback_service(downstream.clone());

    Router::new()
        .route("/signin", auth_route(get(signin)))
        .route("/signup", auth_route(get(signup)))
        .route("/callback", auth_route(get(callback)))
        .route("/logout/{user_id}", auth_route(get(logout)))
        .fallback_service(downstream.clone())
        .layer(middleware::from_fn_with_state(state.clone(), attach_session))
        .with_state(state)
}

// ── Session stage ──────────────────────────────────────────────────

/// Loads the session and identity before dispatch; writes the session back
/// if a handler returned a changed copy in the response extensions.
async fn attach_session(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let now = OffsetDateTime::now_utc();
    let loaded = state.sessions.load_from_headers(request.headers(), now);

    let identity = match loaded.identity() {
        Ok(identity) => identity,
        Err(e) => {
            tracing::error!(error = %e, "Session identity could not be deserialized");
            return AuthError::CorruptIdentity(e).into_response();
        }
    };

    request.extensions_mut().insert(loaded.clone());
    if let Some(identity) = identity {
        request.extensions_mut().insert(AuthUser(identity));
    }

    let mut response = next.run(request).await;

    let Some(updated) = response.extensions_mut().remove::<Session>() else {
        return response;
    };
    if updated == loaded {
        return response;
    }

    let cookie = match state.sessions.session_cookie(&updated, now) {
        Ok(cookie) => cookie,
        Err(e) => return AuthError::Session(e).into_response(),
    };
    match HeaderValue::try_from(cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Session cookie is not a valid header value");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

// ── Initiate ───────────────────────────────────────────────────────

async fn signin(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
) -> Response {
    initiate(&state, session, &headers, LoginAction::Signin)
}

async fn signup(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
) -> Response {
    initiate(&state, session, &headers, LoginAction::Signup)
}

fn initiate(
    state: &GatewayState,
    mut session: Session,
    headers: &HeaderMap,
    login_action: LoginAction,
) -> Response {
    session.redirect_to = referer(headers);
    let response = begin_login(state, &mut session, Some(login_action));
    with_session(session, response)
}

/// Issue a fresh state nonce and redirect to the authorization endpoint.
fn begin_login(
    state: &GatewayState,
    session: &mut Session,
    login_action: Option<LoginAction>,
) -> Result<Response, AuthError> {
    let auth_req = state.client.authorization_url(login_action);
    session.oauth_state = Some(auth_req.state);

    tracing::debug!(
        login_action = login_action.map(LoginAction::as_str),
        "Redirecting to identity provider"
    );
    found(&auth_req.url)
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback(
    State(state): State<GatewayState>,
    Extension(mut session): Extension<Session>,
    Query(params): Query<CallbackParams>,
) -> Response {
    // The nonce is single-use whatever the outcome.
    let expected_state = session.oauth_state.take();
    let response = complete_login(&state, &mut session, expected_state, params).await;
    with_session(session, response)
}

async fn complete_login(
    state: &GatewayState,
    session: &mut Session,
    expected_state: Option<String>,
    params: CallbackParams,
) -> Result<Response, AuthError> {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_else(|| error.clone());
        tracing::warn!(error = %error, description = %description, "OAuth2 error from identity provider");
        return Err(AuthError::Denied(description));
    }

    // Without a code the provider has not been visited yet: start over.
    let Some(code) = params.code else {
        return begin_login(state, session, None);
    };

    let expected_state = expected_state.ok_or_else(|| {
        tracing::warn!("Callback without a login in flight");
        AuthError::MissingState
    })?;
    let received_state = params.state.unwrap_or_default();
    if !nonce::verify_state(&expected_state, &received_state) {
        tracing::warn!("OAuth state mismatch");
        return Err(AuthError::StateMismatch);
    }

    let authentication = state.client.authenticate(&code).await.map_err(|e| {
        tracing::error!(error = %e, "Code exchange failed");
        AuthError::Exchange(e)
    })?;

    session.user = Some(
        authentication
            .identity
            .to_session_value()
            .map_err(AuthError::Session)?,
    );
    let target = session.redirect_to.take().unwrap_or_else(|| "/".to_string());

    tracing::info!(
        refresh_token_issued = authentication.refresh_token.is_some(),
        "OAuth2 login successful"
    );
    found(&target)
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout(
    State(state): State<GatewayState>,
    Extension(mut session): Extension<Session>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let response = end_session(&state, &mut session, &user_id, &headers).await;
    with_session(session, response)
}

async fn end_session(
    state: &GatewayState,
    session: &mut Session,
    opaque_user_id: &str,
    headers: &HeaderMap,
) -> Result<Response, AuthError> {
    let decoded = decode_opaque_id(Some(opaque_user_id));
    let user_id = decoded
        .as_ref()
        .and_then(|d| d.resolved_id())
        .ok_or_else(|| {
            tracing::warn!(user_id = %opaque_user_id, "Logout with unresolvable user id");
            AuthError::InvalidUserId
        })?;

    state.logout.logout(user_id).await.map_err(|e| {
        tracing::warn!(error = %e, "Identity provider logout failed; keeping local session");
        AuthError::Logout(e)
    })?;

    session.user = None;
    tracing::info!("Logout successful");
    found(&referer(headers).unwrap_or_else(|| "/".to_string()))
}

// ── Helpers ────────────────────────────────────────────────────────

/// Attach the (possibly changed) session to a handler's outcome.
///
/// Errors carry it too, so a consumed nonce stays consumed.
fn with_session(session: Session, outcome: Result<Response, AuthError>) -> Response {
    match outcome {
        Ok(response) => (Extension(session), response).into_response(),
        Err(error) => (Extension(session), error).into_response(),
    }
}

/// `302 Found` to `location`.
fn found(location: &str) -> Result<Response, AuthError> {
    let location = HeaderValue::try_from(location).map_err(|_| AuthError::InvalidRedirect)?;
    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}

fn referer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
