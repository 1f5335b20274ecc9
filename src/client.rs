//! Endpoint side: one logged-in user with a relay connection and a call
//! engine.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::call::engine::run_call_engine;
use crate::call::machine::CallMachine;
use crate::call::reconciler::{PresenceSet, Reconciler};
use crate::call::{CallCommand, CallHandle};
use crate::config::CallConfig;
use crate::error::CallError;
use crate::events::create_event_bus;
use crate::media::peer::{PeerFactory, WebRtcPeerFactory};
use crate::media::MediaSource;
use crate::models::Profile;
use crate::network::relay_client::{self, RelayConnection};

pub struct CallClient {
    me: Profile,
    handle: CallHandle,
    presence: PresenceSet,
    relay: RelayConnection,
    engine: JoinHandle<()>,
}

impl CallClient {
    /// Log in with WebRTC transports.
    pub async fn connect(
        config: CallConfig,
        me: Profile,
        media: Arc<dyn MediaSource>,
    ) -> Result<Self, CallError> {
        let peers = Arc::new(WebRtcPeerFactory::new(config.ice_servers.clone()));
        Self::connect_with(config, me, media, peers).await
    }

    /// Log in: register with the relay and start the call engine.
    pub async fn connect_with(
        config: CallConfig,
        me: Profile,
        media: Arc<dyn MediaSource>,
        peers: Arc<dyn PeerFactory>,
    ) -> Result<Self, CallError> {
        if me.user_id.trim().is_empty() {
            return Err(CallError::InvalidTarget(me.user_id));
        }

        let (relay, frame_rx) = relay_client::connect(&config.relay_url, me.clone()).await?;
        let (event_tx, _event_rx) = create_event_bus();
        let (command_tx, command_rx) = mpsc::channel::<CallCommand>(64);

        let (machine, channels) = CallMachine::new(
            me.clone(),
            &config,
            Arc::new(relay.sender()),
            media,
            peers,
            event_tx.clone(),
        );
        let handle = CallHandle::new(command_tx, channels.state_rx.clone(), event_tx.clone());
        let presence = PresenceSet::default();
        let reconciler = Reconciler::new(presence.clone(), event_tx.clone());

        let engine = tokio::spawn(run_call_engine(
            machine, channels, command_rx, frame_rx, reconciler, event_tx,
        ));
        info!("Logged in as {} ({})", me.display_name, me.user_id);

        Ok(Self {
            me,
            handle,
            presence,
            relay,
            engine,
        })
    }

    pub fn me(&self) -> &Profile {
        &self.me
    }

    pub fn calls(&self) -> CallHandle {
        self.handle.clone()
    }

    pub fn presence(&self) -> PresenceSet {
        self.presence.clone()
    }

    /// Log out: hang up any call, then close the relay connection.
    pub async fn disconnect(mut self) {
        self.handle.shutdown().await;
        let _ = (&mut self.engine).await;
        self.relay.close();
        info!("Logged out {}", self.me.user_id);
    }
}
