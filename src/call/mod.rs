//! One-to-one call orchestration on the client side.

pub mod engine;
pub mod machine;
pub mod reconciler;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::error::CallError;
use crate::events::{EventReceiver, EventSender};
use crate::media::connection::PeerConnectionManager;
use crate::media::{LocalStream, RemoteTrack, TrackKind};
use crate::models::{IceCandidate, Profile, SessionDescription};

/// Identifies one call session. Every deferred continuation and transport
/// event carries the token it was started under and is dropped when that
/// token is no longer current.
pub type SessionToken = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Idle,
    Outgoing,
    Incoming,
    Connected,
}

/// Published after every transition.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub status: CallStatus,
    pub counterpart: Option<Profile>,
    pub is_video: bool,
    pub muted: bool,
    pub camera_off: bool,
    /// Local media is being acquired for an outgoing call.
    pub dialing: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub local_stream: Option<LocalStream>,
    #[serde(skip)]
    pub remote_tracks: Vec<RemoteTrack>,
}

/// State of the single non-Idle call. Idle is represented by its absence.
pub(crate) struct CallSession {
    pub token: SessionToken,
    pub status: CallStatus,
    pub counterpart: Profile,
    pub is_video: bool,
    /// Caller's offer, held until the user answers.
    pub pending_offer: Option<SessionDescription>,
    /// Candidates that arrived before any transport object existed.
    pub early_candidates: Vec<IceCandidate>,
    /// ICE ufrags of the counterpart's offers we ignored while both sides
    /// were calling; candidates tagged with them are stale.
    pub ignored_ufrags: Vec<String>,
    /// Media for the incoming call is being acquired.
    pub answering: bool,
    pub muted: bool,
    pub camera_off: bool,
    pub local: Option<LocalStream>,
    pub peer: Option<PeerConnectionManager>,
    pub remote_tracks: Vec<RemoteTrack>,
    pub answer_deadline: Option<Instant>,
    pub started_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn outgoing(token: SessionToken, counterpart: Profile, is_video: bool, local: LocalStream) -> Self {
        let mut session = Self::new(token, CallStatus::Outgoing, counterpart, is_video);
        session.local = Some(local);
        session
    }

    pub fn incoming(
        token: SessionToken,
        caller: Profile,
        is_video: bool,
        offer: SessionDescription,
    ) -> Self {
        let mut session = Self::new(token, CallStatus::Incoming, caller, is_video);
        session.pending_offer = Some(offer);
        session
    }

    fn new(token: SessionToken, status: CallStatus, counterpart: Profile, is_video: bool) -> Self {
        Self {
            token,
            status,
            counterpart,
            is_video,
            pending_offer: None,
            early_candidates: Vec::new(),
            ignored_ufrags: Vec::new(),
            answering: false,
            muted: false,
            camera_off: false,
            local: None,
            peer: None,
            remote_tracks: Vec::new(),
            answer_deadline: None,
            started_at: Utc::now(),
            connected_at: None,
        }
    }

    pub fn is_with(&self, user_id: &str) -> bool {
        self.counterpart.user_id == user_id
    }

    pub fn mark_connected(&mut self) {
        self.status = CallStatus::Connected;
        self.answer_deadline = None;
        self.connected_at = Some(Utc::now());
    }

    /// Push the mute/camera flags down to the local tracks.
    pub fn apply_track_flags(&self) {
        if let Some(local) = &self.local {
            local.set_kind_enabled(TrackKind::Audio, !self.muted);
            local.set_kind_enabled(TrackKind::Video, !self.camera_off);
        }
    }

    /// Close the transport and stop local media. Safe to call more than once.
    pub async fn release(&mut self) {
        self.answer_deadline = None;
        self.pending_offer = None;
        self.early_candidates.clear();
        if let Some(mut peer) = self.peer.take() {
            peer.close().await;
        }
        if let Some(local) = self.local.take() {
            local.stop();
        }
        self.remote_tracks.clear();
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            status: self.status,
            counterpart: Some(self.counterpart.clone()),
            is_video: self.is_video,
            muted: self.muted,
            camera_off: self.camera_off,
            dialing: false,
            started_at: Some(self.started_at),
            connected_at: self.connected_at,
            local_stream: self.local.clone(),
            remote_tracks: self.remote_tracks.clone(),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, CallError>>;

/// User intents, sent from a [`CallHandle`] to the call engine.
#[derive(Debug)]
pub enum CallCommand {
    CallUser {
        target: Profile,
        is_video: bool,
        reply: Reply<()>,
    },
    AnswerCall {
        reply: Reply<()>,
    },
    RejectCall {
        reply: Reply<()>,
    },
    EndCall {
        reply: Reply<()>,
    },
    /// Replies with the new muted flag.
    ToggleMute {
        reply: Reply<bool>,
    },
    /// Replies with the new camera-off flag.
    ToggleCamera {
        reply: Reply<bool>,
    },
    /// Hang up and stop the engine.
    Shutdown,
}

/// Cloneable front end of a running call engine.
#[derive(Clone)]
pub struct CallHandle {
    command_tx: mpsc::Sender<CallCommand>,
    state_rx: watch::Receiver<CallSnapshot>,
    event_tx: EventSender,
}

impl CallHandle {
    pub fn new(
        command_tx: mpsc::Sender<CallCommand>,
        state_rx: watch::Receiver<CallSnapshot>,
        event_tx: EventSender,
    ) -> Self {
        Self {
            command_tx,
            state_rx,
            event_tx,
        }
    }

    pub async fn call_user(&self, target: Profile, is_video: bool) -> Result<(), CallError> {
        self.request(|reply| CallCommand::CallUser {
            target,
            is_video,
            reply,
        })
        .await
    }

    pub async fn answer_call(&self) -> Result<(), CallError> {
        self.request(|reply| CallCommand::AnswerCall { reply }).await
    }

    pub async fn reject_call(&self) -> Result<(), CallError> {
        self.request(|reply| CallCommand::RejectCall { reply }).await
    }

    pub async fn end_call(&self) -> Result<(), CallError> {
        self.request(|reply| CallCommand::EndCall { reply }).await
    }

    pub async fn toggle_mute(&self) -> Result<bool, CallError> {
        self.request(|reply| CallCommand::ToggleMute { reply }).await
    }

    pub async fn toggle_camera(&self) -> Result<bool, CallError> {
        self.request(|reply| CallCommand::ToggleCamera { reply }).await
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(CallCommand::Shutdown).await;
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.state_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<CallSnapshot> {
        self.state_rx.clone()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> CallCommand,
    ) -> Result<T, CallError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .await
            .map_err(|_| CallError::NotConnected)?;
        rx.await.map_err(|_| CallError::NotConnected)?
    }
}
