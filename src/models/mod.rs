use serde::{Deserialize, Serialize};

use crate::error::CallError;

// ============================================================
// Profiles & negotiation payloads
// ============================================================

/// Minimal profile snapshot of a user, as shown on the call screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Profile {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description in the browser's `RTCSessionDescriptionInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Answer, sdp: sdp.into() }
    }

    /// ICE username fragment announced by this description.
    pub fn ice_ufrag(&self) -> Option<&str> {
        self.sdp
            .lines()
            .find_map(|line| line.trim().strip_prefix("a=ice-ufrag:"))
            .map(str::trim)
            .filter(|ufrag| !ufrag.is_empty())
    }
}

/// ICE candidate in the browser's `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

// ============================================================
// Signaling envelopes
// ============================================================

/// Envelope type as seen by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeKind {
    CallOffer,
    CallAnswer,
    IceCandidate,
    CallReject,
    CallEnd,
    CallTimeoutNotice,
    RenegotiateOffer,
    RenegotiateAnswer,
}

/// Opaque envelope. The relay reads `kind` and never looks inside `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

/// Typed view of an envelope, used by the call state machine.
/// Serializes to exactly the `{ "type", "payload" }` shape of [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Signal {
    CallOffer {
        session_description: SessionDescription,
        is_video: bool,
        caller_profile: Profile,
    },
    CallAnswer {
        session_description: SessionDescription,
    },
    IceCandidate {
        candidate: IceCandidate,
    },
    CallReject {},
    CallEnd {},
    CallTimeoutNotice {},
    RenegotiateOffer {
        session_description: SessionDescription,
    },
    RenegotiateAnswer {
        session_description: SessionDescription,
    },
}

impl Signal {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Signal::CallOffer { .. } => EnvelopeKind::CallOffer,
            Signal::CallAnswer { .. } => EnvelopeKind::CallAnswer,
            Signal::IceCandidate { .. } => EnvelopeKind::IceCandidate,
            Signal::CallReject {} => EnvelopeKind::CallReject,
            Signal::CallEnd {} => EnvelopeKind::CallEnd,
            Signal::CallTimeoutNotice {} => EnvelopeKind::CallTimeoutNotice,
            Signal::RenegotiateOffer { .. } => EnvelopeKind::RenegotiateOffer,
            Signal::RenegotiateAnswer { .. } => EnvelopeKind::RenegotiateAnswer,
        }
    }

    pub fn into_envelope(self) -> Result<Envelope, CallError> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }
}

impl TryFrom<Envelope> for Signal {
    type Error = CallError;

    fn try_from(mut envelope: Envelope) -> Result<Self, Self::Error> {
        // Payload-less kinds may arrive with no payload at all.
        if envelope.payload.is_null() {
            envelope.payload = serde_json::Value::Object(serde_json::Map::new());
        }
        Ok(serde_json::from_value(serde_json::to_value(envelope)?)?)
    }
}

// ============================================================
// Relay wire frames
// ============================================================

/// Frames sent by an endpoint to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Register { profile: Profile },
    Relay { to: String, envelope: Envelope },
    Ping,
}

/// Frames sent by the relay to an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    Registered { user_id: String, online: Vec<Profile> },
    PresenceJoined { profile: Profile },
    Signal { from: String, envelope: Envelope },
    MissedCall { caller_name: String },
    Disconnect { user_id: String },
    Error { message: String },
    Pong,
}
