//! Signaling relay: forwards opaque envelopes between registered users.
//!
//! Best-effort and at-most-once. An envelope for a user without a live
//! connection is dropped; the caller-side answer timeout is the only failure
//! signal for that case.

use std::collections::HashMap;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Envelope, EnvelopeKind, Profile, ServerFrame};

/// Outbound queue of a single websocket connection. One ordered queue per
/// connection keeps per-sender-per-receiver ordering intact.
pub type FrameSender = mpsc::UnboundedSender<ServerFrame>;

struct Connection {
    conn_id: Uuid,
    profile: Profile,
    tx: FrameSender,
}

/// Live mapping of user id -> current connection.
#[derive(Default)]
pub struct Relay {
    connections: Mutex<HashMap<String, Connection>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a connection with the profile's user id. The most recent
    /// connection wins; an older one stops receiving envelopes.
    pub async fn register(&self, conn_id: Uuid, profile: Profile, tx: FrameSender) {
        let user_id = profile.user_id.clone();
        let mut connections = self.connections.lock().await;

        let mut online: Vec<Profile> = connections
            .values()
            .filter(|c| c.profile.user_id != user_id)
            .map(|c| c.profile.clone())
            .collect();
        online.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        for (uid, conn) in connections.iter() {
            if uid != &user_id {
                let _ = conn.tx.send(ServerFrame::PresenceJoined {
                    profile: profile.clone(),
                });
            }
        }
        let _ = tx.send(ServerFrame::Registered {
            user_id: user_id.clone(),
            online,
        });

        let previous = connections.insert(
            user_id.clone(),
            Connection {
                conn_id,
                profile,
                tx,
            },
        );
        match previous {
            Some(prev) if prev.conn_id != conn_id => {
                info!("User {} re-registered, connection {} superseded by {}", user_id, prev.conn_id, conn_id);
            }
            _ => info!("User {} registered on connection {}", user_id, conn_id),
        }
    }

    /// Forward an envelope to `to`. Returns whether it was handed to a live
    /// connection. A delivered call-timeout-notice is confirmed back to its
    /// sender, the original caller, as a missed-call notice.
    pub async fn relay(&self, from: &str, to: &str, envelope: Envelope) -> bool {
        let connections = self.connections.lock().await;
        let Some(target) = connections.get(to) else {
            debug!("Dropping {:?} from {}: {} is not connected", envelope.kind, from, to);
            return false;
        };

        let kind = envelope.kind;
        let delivered = target
            .tx
            .send(ServerFrame::Signal {
                from: from.to_string(),
                envelope,
            })
            .is_ok();
        if !delivered {
            debug!("Connection for {} already closed, dropped {:?}", to, kind);
            return false;
        }

        if kind == EnvelopeKind::CallTimeoutNotice {
            if let Some(caller) = connections.get(from) {
                info!("Call from {} to {} timed out, sending missed-call notice", from, to);
                let _ = caller.tx.send(ServerFrame::MissedCall {
                    caller_name: caller.profile.display_name.clone(),
                });
            }
        }

        debug!("Relayed {:?} from {} to {}", kind, from, to);
        true
    }

    /// Remove the mapping for `user_id` if `conn_id` is still its current
    /// connection, and tell everyone else the user is gone.
    pub async fn deregister(&self, user_id: &str, conn_id: Uuid) -> bool {
        let mut connections = self.connections.lock().await;
        match connections.get(user_id) {
            Some(conn) if conn.conn_id == conn_id => {}
            _ => {
                debug!("Connection {} for {} was already superseded", conn_id, user_id);
                return false;
            }
        }
        connections.remove(user_id);

        for conn in connections.values() {
            let _ = conn.tx.send(ServerFrame::Disconnect {
                user_id: user_id.to_string(),
            });
        }
        info!("User {} disconnected", user_id);
        true
    }

    pub async fn online(&self) -> Vec<Profile> {
        let mut online: Vec<Profile> = self
            .connections
            .lock()
            .await
            .values()
            .map(|c| c.profile.clone())
            .collect();
        online.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        online
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.connections.lock().await.contains_key(user_id)
    }
}
