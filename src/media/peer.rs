use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as WrtcMediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use super::{LocalStream, RemoteTrack, TrackKind};
use crate::call::SessionToken;
use crate::config::IceServerConfig;
use crate::error::CallError;
use crate::models::{IceCandidate, SdpKind, SessionDescription};

/// Transport-level connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => Self::New,
            RTCPeerConnectionState::Connecting => Self::Connecting,
            RTCPeerConnectionState::Connected => Self::Connected,
            RTCPeerConnectionState::Disconnected => Self::Disconnected,
            RTCPeerConnectionState::Failed => Self::Failed,
            RTCPeerConnectionState::Closed => Self::Closed,
        }
    }
}

/// Events emitted by a peer connection back to the call engine, tagged with
/// the session that owns the connection.
#[derive(Debug)]
pub struct PeerEvent {
    pub token: SessionToken,
    pub kind: PeerEventKind,
}

#[derive(Debug)]
pub enum PeerEventKind {
    /// ICE candidate gathered; must be sent to the counterpart.
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    StateChanged(ConnectionState),
}

pub type PeerEventSender = mpsc::Sender<PeerEvent>;

/// One peer-to-peer transport object.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Create a local offer and apply it as the local description.
    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, CallError>;
    /// Create a local answer and apply it as the local description.
    async fn create_answer(&self) -> Result<SessionDescription, CallError>;
    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), CallError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), CallError>;
    /// Discard an unanswered local offer and return to the stable state.
    async fn rollback(&self) -> Result<(), CallError>;
    /// Detach all observers so no late callback reaches the engine.
    fn detach(&self);
    async fn close(&self) -> Result<(), CallError>;
}

/// Creates a transport object wired with the local tracks.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(
        &self,
        token: SessionToken,
        local: &LocalStream,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerLink>, CallError>;
}

/// Peer connections backed by the `webrtc` crate.
pub struct WebRtcPeerFactory {
    ice_servers: Vec<IceServerConfig>,
}

impl WebRtcPeerFactory {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self { ice_servers }
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        token: SessionToken,
        local: &LocalStream,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerLink>, CallError> {
        let mut media_engine = WrtcMediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| CallError::Transport(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| CallError::Transport(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(self.rtc_configuration())
                .await
                .map_err(|e| CallError::Transport(format!("Failed to create peer connection: {}", e)))?,
        );

        for track in local.tracks() {
            let Some(rtc_track) = track.rtc_track() else {
                continue;
            };
            let rtp_sender = pc
                .add_track(rtc_track)
                .await
                .map_err(|e| CallError::Transport(format!("Failed to add {} track: {}", track.kind(), e)))?;

            // Read incoming RTCP packets (needed by webrtc crate for proper operation)
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while rtp_sender.read(&mut buf).await.is_ok() {}
            });
        }

        // Connection state change
        let event_tx_state = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let tx = event_tx_state.clone();
            Box::pin(async move {
                info!("Call transport (session {}) state: {}", token, state);
                let _ = tx
                    .send(PeerEvent {
                        token,
                        kind: PeerEventKind::StateChanged(state.into()),
                    })
                    .await;
            })
        }));

        // On track (remote audio/video)
        let event_tx_track = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = event_tx_track.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return,
                };
                info!("Received remote {} track for session {}", kind, token);
                let _ = tx
                    .send(PeerEvent {
                        token,
                        kind: PeerEventKind::RemoteTrack(RemoteTrack {
                            id: track.id(),
                            kind,
                            handle: Some(track),
                        }),
                    })
                    .await;
            })
        }));

        // ICE candidate gathering
        let event_tx_ice = events;
        pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = event_tx_ice.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                let init = match candidate.to_json() {
                    Ok(init) => init,
                    Err(e) => {
                        warn!("Failed to serialize ICE candidate: {}", e);
                        return;
                    }
                };
                let _ = tx
                    .send(PeerEvent {
                        token,
                        kind: PeerEventKind::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_m_line_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }),
                    })
                    .await;
            })
        }));

        info!("Created WebRTC peer connection for session {}", token);
        Ok(Box::new(WebRtcPeerLink { pc }))
    }
}

struct WebRtcPeerLink {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerLink for WebRtcPeerLink {
    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, CallError> {
        let options = RTCOfferOptions {
            voice_activity_detection: false,
            ice_restart,
        };
        let offer = self
            .pc
            .create_offer(Some(options))
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to create offer: {}", e)))?;

        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to set local description: {}", e)))?;

        debug!("Created local offer (ice_restart={})", ice_restart);
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, CallError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to create answer: {}", e)))?;

        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to set local description: {}", e)))?;

        debug!("Created local answer");
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), CallError> {
        let desc = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(|e| CallError::Negotiation(format!("Failed to parse session description: {}", e)))?;

        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), CallError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn rollback(&self) -> Result<(), CallError> {
        let Some(pending) = self.pc.pending_local_description().await else {
            return Ok(());
        };
        // The rollback description must still parse, so it carries the offer's SDP
        let mut desc = RTCSessionDescription::default();
        desc.sdp_type = RTCSdpType::Rollback;
        desc.sdp = pending.sdp;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to roll back local offer: {}", e)))?;
        debug!("Rolled back local offer");
        Ok(())
    }

    fn detach(&self) {
        self.pc.on_ice_candidate(Box::new(|_| Box::pin(async {})));
        self.pc.on_track(Box::new(|_, _, _| Box::pin(async {})));
        self.pc
            .on_peer_connection_state_change(Box::new(|_| Box::pin(async {})));
    }

    async fn close(&self) -> Result<(), CallError> {
        self.pc
            .close()
            .await
            .map_err(|e| CallError::Transport(format!("Failed to close peer connection: {}", e)))
    }
}
