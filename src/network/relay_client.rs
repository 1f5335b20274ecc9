//! Websocket connection from an endpoint to the signaling relay.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::RelaySender;
use crate::error::CallError;
use crate::models::{ClientFrame, Profile, ServerFrame};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A registered relay connection. Frames from the relay arrive on the
/// receiver returned by [`connect`]; the receiver closes when the socket does.
pub struct RelayConnection {
    sender: RelaySender,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayConnection {
    pub fn sender(&self) -> RelaySender {
        self.sender.clone()
    }

    /// Stop the reader, writer and heartbeat tasks.
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open the websocket, register `profile`, and start forwarding frames.
pub async fn connect(
    url: &str,
    profile: Profile,
) -> Result<(RelayConnection, mpsc::UnboundedReceiver<ServerFrame>), CallError> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| CallError::Transport(format!("Failed to connect to relay {}: {}", url, e)))?;
    info!("Connected to relay at {}", url);

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (send_tx, mut send_rx) = mpsc::unbounded_channel::<ClientFrame>();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel::<ServerFrame>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = send_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize client frame: {}", e);
                    continue;
                }
            };
            if ws_write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_write.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(msg) = ws_read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                    Ok(frame) => {
                        if frame_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed relay frame: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Relay socket error: {}", e);
                    break;
                }
            }
        }
        info!("Relay connection closed");
    });

    let heartbeat_tx = send_tx.clone();
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if heartbeat_tx.send(ClientFrame::Ping).is_err() {
                break;
            }
        }
    });

    let sender = RelaySender::new(send_tx);
    sender.send_frame(ClientFrame::Register { profile })?;

    Ok((
        RelayConnection {
            sender,
            tasks: vec![writer, reader, heartbeat],
        },
        frame_rx,
    ))
}
