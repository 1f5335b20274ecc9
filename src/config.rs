use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long an outgoing call rings before it is abandoned.
pub const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_RELAY_PORT: u16 = 9847;

/// Relay server settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
}

impl RelayConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("Invalid bind address {}:{}: {}", self.host, self.port, e))
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_RELAY_PORT,
        }
    }
}

/// STUN/TURN server handed to the peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// Free public STUN servers.
    pub fn default_stun() -> Vec<Self> {
        vec![Self {
            urls: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            username: None,
            credential: None,
        }]
    }
}

/// Client-side call settings.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Websocket URL of the relay, e.g. `ws://127.0.0.1:9847/ws`.
    pub relay_url: String,
    pub answer_timeout: Duration,
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            relay_url: format!("ws://127.0.0.1:{}/ws", DEFAULT_RELAY_PORT),
            answer_timeout: DEFAULT_ANSWER_TIMEOUT,
            ice_servers: IceServerConfig::default_stun(),
        }
    }
}
