//! Applies relay frames to the local presence view and the call machine.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::machine::CallMachine;
use crate::events::{CallEvent, EventSender};
use crate::models::{Profile, ServerFrame, Signal};

/// Users the relay currently reports online, excluding ourselves.
#[derive(Clone, Default)]
pub struct PresenceSet {
    online: Arc<RwLock<HashMap<String, Profile>>>,
}

impl PresenceSet {
    /// Online profiles ordered by user id.
    pub async fn list(&self) -> Vec<Profile> {
        let mut profiles: Vec<Profile> = self.online.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        profiles
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.online.read().await.contains_key(user_id)
    }

    pub async fn get(&self, user_id: &str) -> Option<Profile> {
        self.online.read().await.get(user_id).cloned()
    }

    async fn replace(&self, profiles: Vec<Profile>) {
        let mut online = self.online.write().await;
        online.clear();
        online.extend(profiles.into_iter().map(|p| (p.user_id.clone(), p)));
    }

    async fn insert(&self, profile: Profile) {
        self.online.write().await.insert(profile.user_id.clone(), profile);
    }

    async fn remove(&self, user_id: &str) -> bool {
        self.online.write().await.remove(user_id).is_some()
    }
}

pub struct Reconciler {
    presence: PresenceSet,
    event_tx: EventSender,
}

impl Reconciler {
    pub fn new(presence: PresenceSet, event_tx: EventSender) -> Self {
        Self { presence, event_tx }
    }

    pub async fn apply(&self, machine: &mut CallMachine, frame: ServerFrame) {
        match frame {
            ServerFrame::Registered { user_id, online } => {
                info!("Registered with relay as {} ({} others online)", user_id, online.len());
                self.presence.replace(online).await;
            }
            ServerFrame::PresenceJoined { profile } => {
                let user_id = profile.user_id.clone();
                self.presence.insert(profile).await;
                self.emit(CallEvent::PresenceChanged {
                    user_id,
                    online: true,
                });
            }
            ServerFrame::Disconnect { user_id } => {
                if self.presence.remove(&user_id).await {
                    self.emit(CallEvent::PresenceChanged {
                        user_id: user_id.clone(),
                        online: false,
                    });
                }
                machine.handle_remote_disconnect(&user_id).await;
            }
            ServerFrame::Signal { from, envelope } => {
                let kind = envelope.kind;
                match Signal::try_from(envelope) {
                    Ok(signal) => machine.handle_signal(&from, signal).await,
                    Err(e) => warn!("Dropping undecodable {:?} from {}: {}", kind, from, e),
                }
            }
            ServerFrame::MissedCall { caller_name } => {
                info!("Relay confirmed the unanswered call as missed ({})", caller_name);
                self.emit(CallEvent::MissedCall { caller_name });
            }
            ServerFrame::Error { message } => warn!("Relay error: {}", message),
            ServerFrame::Pong => debug!("Relay heartbeat acknowledged"),
        }
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.event_tx.send(event);
    }
}
