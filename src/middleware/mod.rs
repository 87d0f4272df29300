//! Plug-and-play storefront authentication gateway for Axum.
//!
//! Wraps an application service with the OAuth2 authorization-code login
//! flow and a signed, client-held session cookie.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use storefront_gateway::middleware::{GatewayConfig, gateway_router};
//!
//! // 1. Configure from environment
//! let config = GatewayConfig::from_env()?;
//!
//! // 2. Put the application behind the gateway
//! let app = gateway_router(config, storefront_app);
//!
//! // 3. In application handlers, read the identity
//! async fn account(user: AuthUser) -> impl IntoResponse { /* ... */ }
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod routes;
mod session;
mod state;

pub use config::GatewayConfig;
pub use error::AuthError;
pub use extractor::AuthUser;
pub use routes::gateway_router;
pub use session::{DEFAULT_SESSION_MAX_AGE, SESSION_COOKIE_NAME, Session, SessionKeys, SessionStore};
