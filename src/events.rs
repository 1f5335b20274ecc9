use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::Profile;

/// Why a call returned to Idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// Our outgoing call rang out.
    NoAnswer,
    /// The counterpart rejected our call.
    Rejected,
    /// We rejected the incoming call.
    Declined,
    /// Either side hung up.
    Ended,
    /// The caller gave up while we were ringing.
    Missed,
    CounterpartDisconnected,
    MediaUnavailable,
    Failed(String),
}

/// Transport-agnostic call notices for the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum CallEvent {
    IncomingCall { caller: Profile, is_video: bool },
    CallStarted { counterpart: Profile, is_video: bool },
    CallConnected { counterpart: Profile },
    /// Terminal notice: exactly one per session.
    CallEnded { counterpart: Profile, reason: EndReason },
    /// A dial was abandoned before any offer was sent.
    DialFailed { target: Profile, reason: EndReason },
    Reconnecting { counterpart: Profile },
    RemoteTrackAdded { track_id: String, kind: String },
    MissedCall { caller_name: String },
    PresenceChanged { user_id: String, online: bool },
    RelayDisconnected,
}

pub type EventSender = broadcast::Sender<CallEvent>;
pub type EventReceiver = broadcast::Receiver<CallEvent>;

pub fn create_event_bus() -> (EventSender, EventReceiver) {
    broadcast::channel(256)
}
