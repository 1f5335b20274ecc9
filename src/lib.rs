pub mod api;
pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod models;
pub mod network;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_utils;

use tracing::info;
use tracing_subscriber::EnvFilter;

pub use crate::client::CallClient;
pub use crate::config::{CallConfig, RelayConfig};
pub use crate::error::CallError;

use crate::state::ServiceContext;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Run the signaling relay until the server stops.
pub async fn run_relay(config: RelayConfig) -> Result<(), String> {
    let ctx = ServiceContext::new();
    info!("Starting relay on {}:{}", config.host, config.port);
    api::server::start_relay_server(ctx, &config).await
}
