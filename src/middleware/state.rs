use std::sync::Arc;

use super::config::GatewayConfig;
use super::session::SessionStore;
use crate::logout::RemoteLogout;
use crate::oauth::AuthClient;

/// Shared state for gateway route handlers. Immutable after startup.
#[derive(Clone)]
pub(super) struct GatewayState {
    pub(super) client: Arc<AuthClient>,
    pub(super) logout: Arc<RemoteLogout>,
    pub(super) sessions: Arc<SessionStore>,
}

impl From<GatewayConfig> for GatewayState {
    fn from(config: GatewayConfig) -> Self {
        Self {
            client: Arc::new(config.client),
            logout: Arc::new(config.logout),
            sessions: Arc::new(config.sessions),
        }
    }
}
