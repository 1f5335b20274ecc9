//! Call-related error types.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("invalid call state: {0}")]
    InvalidState(&'static str),

    #[error("already in a call")]
    Busy,

    #[error("invalid call target: {0}")]
    InvalidTarget(String),

    #[error("media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not connected to relay")]
    NotConnected,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CallError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
