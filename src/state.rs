use std::sync::Arc;

use crate::services::relay::Relay;

/// Context shared by the relay's API routes and websocket handler.
#[derive(Clone)]
pub struct ServiceContext {
    pub relay: Arc<Relay>,
}

impl ServiceContext {
    pub fn new() -> Self {
        Self {
            relay: Arc::new(Relay::new()),
        }
    }
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self::new()
    }
}
