#![doc = include_str!("../README.md")]

pub mod error;
pub mod identity;
pub mod logout;
pub mod middleware;
pub mod nonce;
pub mod oauth;
pub mod opaque_id;
pub mod proxy;
pub mod retry;

// Re-exports for convenient access
pub use error::Error;
pub use identity::{Identity, LoginAction};
pub use logout::RemoteLogout;
pub use middleware::{AuthError, AuthUser, GatewayConfig, gateway_router};
pub use oauth::{
    AuthClient, AuthorizationParams, AuthorizationRequest, Authentication, LoginActionParams,
    OAuthConfig, TokenResponse,
};
pub use opaque_id::{OpaqueId, decode_opaque_id, encode_opaque_id};
pub use proxy::Downstream;
pub use retry::RetryPolicy;
