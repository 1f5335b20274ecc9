//! In-memory stand-ins for the relay, the media devices and the transport.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::call::SessionToken;
use crate::error::CallError;
use crate::media::peer::{PeerEventSender, PeerFactory, PeerLink};
use crate::media::{LocalStream, MediaConstraints, MediaSource, MediaTrack, TrackKind};
use crate::models::{IceCandidate, SessionDescription, Signal};
use crate::network::SignalSink;

pub fn candidate(value: &str) -> IceCandidate {
    IceCandidate {
        candidate: value.to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
        username_fragment: None,
    }
}

// ============================================================
// Transport
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    CreateOffer { ice_restart: bool },
    CreateAnswer,
    SetRemote(SessionDescription),
    AddCandidate(String),
    Rollback,
    Detach,
    Close,
}

#[derive(Default)]
struct LinkState {
    calls: Vec<LinkCall>,
    fail_remote: bool,
    fail_offer: bool,
}

/// Shared view of everything a [`FakeLink`] was asked to do.
#[derive(Clone, Default)]
pub struct LinkLog {
    state: Arc<Mutex<LinkState>>,
}

impl LinkLog {
    pub fn calls(&self) -> Vec<LinkCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn closes(&self) -> usize {
        self.calls().iter().filter(|c| **c == LinkCall::Close).count()
    }

    pub fn fail_remote_description(&self) {
        self.state.lock().unwrap().fail_remote = true;
    }

    pub fn fail_offer(&self) {
        self.state.lock().unwrap().fail_offer = true;
    }

    fn record(&self, call: LinkCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

pub struct FakeLink {
    log: LinkLog,
}

impl FakeLink {
    pub fn new() -> (Self, LinkLog) {
        let log = LinkLog::default();
        (Self { log: log.clone() }, log)
    }
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, CallError> {
        self.log.record(LinkCall::CreateOffer { ice_restart });
        if self.log.state.lock().unwrap().fail_offer {
            return Err(CallError::Negotiation("offer refused".to_string()));
        }
        let ufrag = if ice_restart { "restart" } else { "offer" };
        Ok(SessionDescription::offer(format!("v=0\r\na=ice-ufrag:{}\r\n", ufrag)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, CallError> {
        self.log.record(LinkCall::CreateAnswer);
        Ok(SessionDescription::answer("v=0\r\na=ice-ufrag:answer\r\n"))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), CallError> {
        self.log.record(LinkCall::SetRemote(description));
        if self.log.state.lock().unwrap().fail_remote {
            return Err(CallError::Negotiation("bad description".to_string()));
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), CallError> {
        self.log.record(LinkCall::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn rollback(&self) -> Result<(), CallError> {
        self.log.record(LinkCall::Rollback);
        Ok(())
    }

    fn detach(&self) {
        self.log.record(LinkCall::Detach);
    }

    async fn close(&self) -> Result<(), CallError> {
        self.log.record(LinkCall::Close);
        Ok(())
    }
}

/// Hands out [`FakeLink`]s and keeps their logs, newest last.
#[derive(Default)]
pub struct FakePeerFactory {
    links: Mutex<Vec<(SessionToken, LinkLog)>>,
    fail_offers: AtomicBool,
}

impl FakePeerFactory {
    pub fn created(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn last(&self) -> LinkLog {
        self.links
            .lock()
            .unwrap()
            .last()
            .map(|(_, log)| log.clone())
            .expect("no link created")
    }

    pub fn tokens(&self) -> Vec<SessionToken> {
        self.links.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// Every link created afterwards fails to produce an offer.
    pub fn fail_offers(&self) {
        self.fail_offers.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PeerFactory for FakePeerFactory {
    async fn create(
        &self,
        token: SessionToken,
        _local: &LocalStream,
        _events: PeerEventSender,
    ) -> Result<Box<dyn PeerLink>, CallError> {
        let (link, log) = FakeLink::new();
        if self.fail_offers.load(Ordering::SeqCst) {
            log.fail_offer();
        }
        self.links.lock().unwrap().push((token, log));
        Ok(Box::new(link))
    }
}

// ============================================================
// Media
// ============================================================

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stops: AtomicUsize,
}

impl FakeTrack {
    fn new(id: String, kind: TrackKind) -> Self {
        Self {
            id,
            kind,
            enabled: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stop_count() > 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
pub struct FakeMediaSource {
    requests: Mutex<Vec<MediaConstraints>>,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
    deny: AtomicBool,
    gated: AtomicBool,
    gate: Notify,
}

impl FakeMediaSource {
    /// Acquisitions fail as if permission was denied.
    pub fn denying() -> Self {
        let source = Self::default();
        source.deny.store(true, Ordering::SeqCst);
        source
    }

    /// Acquisitions block until [`FakeMediaSource::release`] is called.
    pub fn gated() -> Self {
        let source = Self::default();
        source.gated.store(true, Ordering::SeqCst);
        source
    }

    /// Let one blocked acquisition complete.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.requests.lock().unwrap().clone()
    }

    pub fn tracks(&self) -> Vec<Arc<FakeTrack>> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn all_stopped(&self) -> bool {
        self.tracks().iter().all(|t| t.is_stopped())
    }
}

#[async_trait]
impl MediaSource for FakeMediaSource {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, CallError> {
        let request = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(constraints);
            requests.len()
        };
        if self.gated.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.deny.load(Ordering::SeqCst) {
            return Err(CallError::MediaUnavailable("permission denied".to_string()));
        }

        let mut kinds = vec![TrackKind::Audio];
        if constraints.video {
            kinds.push(TrackKind::Video);
        }
        let mut tracks: Vec<Arc<dyn MediaTrack>> = Vec::new();
        for kind in kinds {
            let track = Arc::new(FakeTrack::new(format!("{}-{}", kind, request), kind));
            self.tracks.lock().unwrap().push(track.clone());
            tracks.push(track);
        }
        Ok(LocalStream::new(tracks))
    }
}

// ============================================================
// Relay
// ============================================================

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, Signal)>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<(String, Signal)> {
        self.sent.lock().unwrap().clone()
    }
}

impl SignalSink for RecordingSink {
    fn send_signal(&self, to: &str, signal: Signal) -> Result<(), CallError> {
        self.sent.lock().unwrap().push((to.to_string(), signal));
        Ok(())
    }
}
