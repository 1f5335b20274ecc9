pub mod relay_client;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::CallError;
use crate::models::{ClientFrame, Signal};

/// Outbound half of the signaling channel as seen by the call state machine.
pub trait SignalSink: Send + Sync {
    fn send_signal(&self, to: &str, signal: Signal) -> Result<(), CallError>;
}

/// Queues relay frames for the websocket writer task.
#[derive(Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<ClientFrame>,
}

impl RelaySender {
    pub fn new(tx: mpsc::UnboundedSender<ClientFrame>) -> Self {
        Self { tx }
    }

    pub fn send_frame(&self, frame: ClientFrame) -> Result<(), CallError> {
        self.tx.send(frame).map_err(|_| CallError::NotConnected)
    }
}

impl SignalSink for RelaySender {
    fn send_signal(&self, to: &str, signal: Signal) -> Result<(), CallError> {
        let envelope = signal.into_envelope()?;
        debug!("Relaying {:?} to {}", envelope.kind, to);
        self.send_frame(ClientFrame::Relay {
            to: to.to_string(),
            envelope,
        })
    }
}
