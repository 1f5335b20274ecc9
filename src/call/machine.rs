//! The call state machine.
//!
//! All state lives in one [`CallMachine`] owned by the engine loop, so
//! transitions never interleave. Work that has to wait (media acquisition,
//! the answer timer, transport callbacks) re-enters through the loop tagged
//! with the [`SessionToken`] it was started under, and is discarded when
//! that session is gone.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{CallSession, CallSnapshot, CallStatus, SessionToken};
use crate::config::CallConfig;
use crate::error::CallError;
use crate::events::{CallEvent, EndReason, EventSender};
use crate::media::connection::PeerConnectionManager;
use crate::media::peer::{ConnectionState, PeerEvent, PeerEventKind, PeerEventSender, PeerFactory};
use crate::media::{LocalStream, MediaConstraints, MediaSource};
use crate::models::{IceCandidate, Profile, SessionDescription, Signal};
use crate::network::SignalSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquirePurpose {
    Dial,
    Answer,
}

/// Deferred work finishing and re-entering the machine.
#[derive(Debug)]
pub enum Continuation {
    MediaReady {
        token: SessionToken,
        purpose: AcquirePurpose,
        result: Result<LocalStream, CallError>,
    },
}

/// Outgoing call waiting for local media, before any offer exists.
struct PendingDial {
    token: SessionToken,
    target: Profile,
    is_video: bool,
    ignored_ufrags: Vec<String>,
}

/// Receiving ends the engine loop polls on behalf of the machine.
pub struct MachineChannels {
    pub continuations: mpsc::UnboundedReceiver<Continuation>,
    pub peer_events: mpsc::Receiver<PeerEvent>,
    pub state_rx: watch::Receiver<CallSnapshot>,
}

pub struct CallMachine {
    me: Profile,
    answer_timeout: Duration,
    signals: Arc<dyn SignalSink>,
    media: Arc<dyn MediaSource>,
    peers: Arc<dyn PeerFactory>,
    session: Option<CallSession>,
    dialing: Option<PendingDial>,
    next_token: SessionToken,
    continuation_tx: mpsc::UnboundedSender<Continuation>,
    peer_event_tx: PeerEventSender,
    event_tx: EventSender,
    state_tx: watch::Sender<CallSnapshot>,
}

impl CallMachine {
    pub fn new(
        me: Profile,
        config: &CallConfig,
        signals: Arc<dyn SignalSink>,
        media: Arc<dyn MediaSource>,
        peers: Arc<dyn PeerFactory>,
        event_tx: EventSender,
    ) -> (Self, MachineChannels) {
        let (continuation_tx, continuations) = mpsc::unbounded_channel();
        let (peer_event_tx, peer_events) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(CallSnapshot::default());

        let machine = Self {
            me,
            answer_timeout: config.answer_timeout,
            signals,
            media,
            peers,
            session: None,
            dialing: None,
            next_token: 0,
            continuation_tx,
            peer_event_tx,
            event_tx,
            state_tx,
        };
        let channels = MachineChannels {
            continuations,
            peer_events,
            state_rx,
        };
        (machine, channels)
    }

    pub fn me(&self) -> &Profile {
        &self.me
    }

    pub fn status(&self) -> CallStatus {
        self.session.as_ref().map(|s| s.status).unwrap_or_default()
    }

    /// Pending answer timer of an outgoing call, if one is armed.
    pub fn answer_deadline(&self) -> Option<(Instant, SessionToken)> {
        self.session
            .as_ref()
            .and_then(|s| s.answer_deadline.map(|deadline| (deadline, s.token)))
    }

    // ============================================================
    // User intents
    // ============================================================

    /// Start an outgoing call. Local media is acquired in the background;
    /// the offer goes out once it arrives.
    pub async fn call_user(&mut self, target: Profile, is_video: bool) -> Result<(), CallError> {
        if self.session.is_some() || self.dialing.is_some() {
            return Err(CallError::Busy);
        }
        if target.user_id.trim().is_empty() || target.user_id == self.me.user_id {
            return Err(CallError::InvalidTarget(target.user_id));
        }

        let token = self.allocate_token();
        info!(
            "Calling {} ({}), video={}",
            target.display_name, target.user_id, is_video
        );
        self.dialing = Some(PendingDial {
            token,
            target,
            is_video,
            ignored_ufrags: Vec::new(),
        });
        self.spawn_acquire(token, AcquirePurpose::Dial, MediaConstraints::for_call(is_video));
        self.publish();
        Ok(())
    }

    pub async fn answer_call(&mut self) -> Result<(), CallError> {
        let session = match self.session.as_mut() {
            Some(s) if s.status == CallStatus::Incoming => s,
            _ => return Err(CallError::InvalidState("no incoming call to answer")),
        };
        if session.answering {
            return Err(CallError::InvalidState("already answering"));
        }
        session.answering = true;
        let token = session.token;
        let constraints = MediaConstraints::for_call(session.is_video);
        info!("Answering call from {}", session.counterpart.user_id);

        self.spawn_acquire(token, AcquirePurpose::Answer, constraints);
        self.publish();
        Ok(())
    }

    pub async fn reject_call(&mut self) -> Result<(), CallError> {
        if self.status() != CallStatus::Incoming {
            return Err(CallError::InvalidState("no incoming call to reject"));
        }
        self.decline(EndReason::Declined).await;
        self.publish();
        Ok(())
    }

    /// Hang up. Cancels a dial still waiting for media; does nothing when Idle.
    pub async fn end_call(&mut self) -> Result<(), CallError> {
        if let Some(dial) = self.dialing.take() {
            info!("Cancelled call to {} before it was placed", dial.target.user_id);
            self.emit(CallEvent::DialFailed {
                target: dial.target,
                reason: EndReason::Ended,
            });
            self.publish();
            return Ok(());
        }

        match self.status() {
            CallStatus::Idle => {
                debug!("end_call while idle");
                Ok(())
            }
            CallStatus::Incoming => Err(CallError::InvalidState("reject an incoming call instead")),
            CallStatus::Outgoing | CallStatus::Connected => {
                self.teardown_and_notify(EndReason::Ended).await;
                self.publish();
                Ok(())
            }
        }
    }

    /// Returns the new muted flag.
    pub fn toggle_mute(&mut self) -> Result<bool, CallError> {
        let session = self
            .session
            .as_mut()
            .ok_or(CallError::InvalidState("no active call"))?;
        session.muted = !session.muted;
        session.apply_track_flags();
        let muted = session.muted;
        debug!("Microphone muted: {}", muted);
        self.publish();
        Ok(muted)
    }

    /// Returns the new camera-off flag.
    pub fn toggle_camera(&mut self) -> Result<bool, CallError> {
        let session = self
            .session
            .as_mut()
            .ok_or(CallError::InvalidState("no active call"))?;
        if !session.is_video {
            return Err(CallError::InvalidState("audio-only call has no camera"));
        }
        session.camera_off = !session.camera_off;
        session.apply_track_flags();
        let camera_off = session.camera_off;
        debug!("Camera off: {}", camera_off);
        self.publish();
        Ok(camera_off)
    }

    /// Drop any call without further signaling, e.g. on logout or relay loss.
    pub async fn shutdown(&mut self, reason: EndReason) {
        if let Some(dial) = self.dialing.take() {
            self.emit(CallEvent::DialFailed {
                target: dial.target,
                reason: reason.clone(),
            });
        }
        self.teardown(reason).await;
        self.publish();
    }

    // ============================================================
    // Inbound
    // ============================================================

    pub async fn handle_signal(&mut self, from: &str, signal: Signal) {
        match signal {
            Signal::CallOffer {
                session_description,
                is_video,
                caller_profile,
            } => self.on_offer(from, session_description, is_video, caller_profile).await,
            Signal::CallAnswer {
                session_description,
            } => self.on_answer(from, session_description).await,
            Signal::IceCandidate { candidate } => self.on_remote_candidate(from, candidate).await,
            Signal::CallReject {} => {
                if self.is_counterpart(from) {
                    self.teardown(EndReason::Rejected).await;
                }
            }
            Signal::CallEnd {} => {
                if self.is_counterpart(from) {
                    self.teardown(EndReason::Ended).await;
                }
            }
            Signal::CallTimeoutNotice {} => {
                if self.is_counterpart(from) && self.status() == CallStatus::Incoming {
                    self.teardown(EndReason::Missed).await;
                }
            }
            Signal::RenegotiateOffer {
                session_description,
            } => self.on_renegotiate_offer(from, session_description).await,
            Signal::RenegotiateAnswer {
                session_description,
            } => self.on_renegotiate_answer(from, session_description).await,
        }
        self.publish();
    }

    /// The relay reported `user_id` gone.
    pub async fn handle_remote_disconnect(&mut self, user_id: &str) {
        if self.dialing.as_ref().is_some_and(|d| d.target.user_id == user_id) {
            if let Some(dial) = self.dialing.take() {
                info!("{} went offline before the call was placed", user_id);
                self.emit(CallEvent::DialFailed {
                    target: dial.target,
                    reason: EndReason::CounterpartDisconnected,
                });
            }
        } else if self.is_counterpart(user_id) {
            info!("Counterpart {} disconnected", user_id);
            self.teardown(EndReason::CounterpartDisconnected).await;
        }
        self.publish();
    }

    pub async fn handle_answer_timeout(&mut self, token: SessionToken) {
        let armed = matches!(
            &self.session,
            Some(s) if s.token == token && s.status == CallStatus::Outgoing && s.answer_deadline.is_some()
        );
        if !armed {
            debug!("Ignoring stale answer timer for session {}", token);
            return;
        }
        if let Some(session) = &self.session {
            info!("Call to {} was not answered", session.counterpart.user_id);
            if let Err(e) = self
                .signals
                .send_signal(&session.counterpart.user_id, Signal::CallTimeoutNotice {})
            {
                warn!("Failed to send call timeout notice: {}", e);
            }
        }
        self.teardown(EndReason::NoAnswer).await;
        self.publish();
    }

    pub async fn handle_continuation(&mut self, continuation: Continuation) {
        match continuation {
            Continuation::MediaReady {
                token,
                purpose: AcquirePurpose::Dial,
                result,
            } => self.finish_dial(token, result).await,
            Continuation::MediaReady {
                token,
                purpose: AcquirePurpose::Answer,
                result,
            } => self.finish_answer(token, result).await,
        }
        self.publish();
    }

    pub async fn handle_peer_event(&mut self, event: PeerEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!("Ignoring transport event for finished session {}", event.token);
            return;
        };
        if session.token != event.token {
            debug!("Ignoring transport event for stale session {}", event.token);
            return;
        }

        match event.kind {
            PeerEventKind::LocalCandidate(mut candidate) => {
                if let Some(peer) = session.peer.as_ref() {
                    peer.tag_local_candidate(&mut candidate);
                }
                if let Err(e) = self.signals.send_signal(
                    &session.counterpart.user_id,
                    Signal::IceCandidate { candidate },
                ) {
                    warn!("Failed to send ICE candidate: {}", e);
                }
            }
            PeerEventKind::RemoteTrack(track) => {
                info!("Remote {} track {} added", track.kind, track.id);
                self.emit(CallEvent::RemoteTrackAdded {
                    track_id: track.id.clone(),
                    kind: track.kind.to_string(),
                });
                if let Some(session) = self.session.as_mut() {
                    session.remote_tracks.push(track);
                }
            }
            PeerEventKind::StateChanged(state) => self.on_connection_state(state).await,
        }
        self.publish();
    }

    // ============================================================
    // Signal handlers
    // ============================================================

    async fn on_offer(
        &mut self,
        from: &str,
        offer: SessionDescription,
        is_video: bool,
        caller_profile: Profile,
    ) {
        let calling_them = self.dialing.as_ref().is_some_and(|d| d.target.user_id == from)
            || self
                .session
                .as_ref()
                .is_some_and(|s| s.is_with(from) && s.status == CallStatus::Outgoing);

        if calling_them {
            // Simultaneous calls: the smaller user id keeps its own call
            if self.me.user_id.as_str() < from {
                info!("Both sides called; keeping our call to {}", from);
                self.ignore_offer_ufrag(&offer);
                return;
            }
            info!("Both sides called; yielding to the call from {}", from);
            self.abandon_outgoing().await;
        } else if self.session.is_some() || self.dialing.is_some() {
            info!("Busy, rejecting call from {}", from);
            if let Err(e) = self.signals.send_signal(from, Signal::CallReject {}) {
                warn!("Failed to reject call from {}: {}", from, e);
            }
            return;
        }

        let caller = Profile {
            user_id: from.to_string(),
            ..caller_profile
        };
        let token = self.allocate_token();
        info!(
            "Incoming {} call from {} ({})",
            if is_video { "video" } else { "audio" },
            caller.display_name,
            caller.user_id
        );
        self.session = Some(CallSession::incoming(token, caller.clone(), is_video, offer));
        self.emit(CallEvent::IncomingCall { caller, is_video });
    }

    async fn on_answer(&mut self, from: &str, answer: SessionDescription) {
        let result = match self.session.as_mut() {
            Some(s) if s.is_with(from) && s.status == CallStatus::Outgoing => {
                s.answer_deadline = None;
                match s.peer.as_mut() {
                    Some(peer) => peer.apply_answer(answer).await,
                    None => Err(CallError::InvalidState("outgoing call has no transport")),
                }
            }
            _ => {
                debug!("Ignoring call-answer from {}", from);
                return;
            }
        };

        match result {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    session.mark_connected();
                    info!("Call with {} connected", session.counterpart.user_id);
                    let counterpart = session.counterpart.clone();
                    self.emit(CallEvent::CallConnected { counterpart });
                }
            }
            Err(e) => {
                error!("Failed to apply answer from {}: {}", from, e);
                self.teardown_and_notify(EndReason::Failed(e.to_string())).await;
            }
        }
    }

    async fn on_remote_candidate(&mut self, from: &str, candidate: IceCandidate) {
        let Some(session) = self.session.as_mut().filter(|s| s.is_with(from)) else {
            debug!("Ignoring ICE candidate from {}", from);
            return;
        };
        if candidate
            .username_fragment
            .as_ref()
            .is_some_and(|ufrag| session.ignored_ufrags.contains(ufrag))
        {
            debug!("Dropping ICE candidate from {} for an abandoned transport", from);
            return;
        }
        match session.peer.as_mut() {
            Some(peer) => {
                if let Err(e) = peer.add_remote_candidate(candidate).await {
                    warn!("Failed to add ICE candidate from {}: {}", from, e);
                }
            }
            None => session.early_candidates.push(candidate),
        }
    }

    async fn on_renegotiate_offer(&mut self, from: &str, offer: SessionDescription) {
        let keep_ours = self.me.user_id.as_str() < from;
        let result = match self.session.as_mut() {
            Some(s) if s.is_with(from) && s.status == CallStatus::Connected => match s.peer.as_mut() {
                // Both sides restarted at once: the smaller user id keeps its offer
                Some(peer) if peer.has_pending_restart_offer() && keep_ours => {
                    info!("Both sides renegotiating; keeping our offer to {}", from);
                    return;
                }
                Some(peer) => peer.accept_renegotiation(offer).await,
                None => Err(CallError::InvalidState("connected call has no transport")),
            },
            _ => {
                debug!("Ignoring renegotiate-offer from {}", from);
                return;
            }
        };

        let sent = result.and_then(|answer| {
            self.signals.send_signal(
                from,
                Signal::RenegotiateAnswer {
                    session_description: answer,
                },
            )
        });
        if let Err(e) = sent {
            error!("Renegotiation with {} failed: {}", from, e);
            self.teardown_and_notify(EndReason::Failed(e.to_string())).await;
        }
    }

    async fn on_renegotiate_answer(&mut self, from: &str, answer: SessionDescription) {
        let result = match self.session.as_mut() {
            Some(s) if s.is_with(from) && s.status == CallStatus::Connected => match s.peer.as_mut() {
                Some(peer) if peer.has_pending_restart_offer() => peer.apply_answer(answer).await,
                _ => {
                    debug!("Ignoring unexpected renegotiate-answer from {}", from);
                    return;
                }
            },
            _ => {
                debug!("Ignoring renegotiate-answer from {}", from);
                return;
            }
        };

        if let Err(e) = result {
            error!("Renegotiation with {} failed: {}", from, e);
            self.teardown_and_notify(EndReason::Failed(e.to_string())).await;
        }
    }

    async fn on_connection_state(&mut self, state: ConnectionState) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match state {
            ConnectionState::Connected => {
                if let Some(peer) = session.peer.as_mut() {
                    peer.connectivity_restored();
                }
            }
            ConnectionState::Disconnected if session.status == CallStatus::Connected => {
                let counterpart = session.counterpart.clone();
                let result = match session.peer.as_mut() {
                    Some(peer) if peer.is_renegotiating() => {
                        debug!("Renegotiation already in progress");
                        return;
                    }
                    Some(peer) => peer.renegotiate().await,
                    None => Err(CallError::InvalidState("connected call has no transport")),
                };
                let sent = result.and_then(|offer| {
                    self.signals.send_signal(
                        &counterpart.user_id,
                        Signal::RenegotiateOffer {
                            session_description: offer,
                        },
                    )
                });
                match sent {
                    Ok(()) => self.emit(CallEvent::Reconnecting { counterpart }),
                    Err(e) => {
                        error!("Failed to renegotiate with {}: {}", counterpart.user_id, e);
                        self.teardown_and_notify(EndReason::Failed(e.to_string())).await;
                    }
                }
            }
            ConnectionState::Failed | ConnectionState::Closed => {
                warn!("Transport to {} entered state {:?}", session.counterpart.user_id, state);
                self.teardown_and_notify(EndReason::Failed("transport failed".to_string()))
                    .await;
            }
            _ => {}
        }
    }

    // ============================================================
    // Continuations
    // ============================================================

    async fn finish_dial(&mut self, token: SessionToken, result: Result<LocalStream, CallError>) {
        let dial = match self.dialing.take() {
            Some(dial) if dial.token == token => dial,
            other => {
                self.dialing = other;
                discard_media(token, result);
                return;
            }
        };

        let local = match result {
            Ok(local) => local,
            Err(e) => {
                warn!("Could not acquire media for call to {}: {}", dial.target.user_id, e);
                self.emit(CallEvent::DialFailed {
                    target: dial.target,
                    reason: EndReason::MediaUnavailable,
                });
                return;
            }
        };

        let mut session = CallSession::outgoing(token, dial.target, dial.is_video, local);
        session.ignored_ufrags = dial.ignored_ufrags;
        match self.place_offer(&mut session).await {
            Ok(()) => {
                session.answer_deadline = Some(Instant::now() + self.answer_timeout);
                self.emit(CallEvent::CallStarted {
                    counterpart: session.counterpart.clone(),
                    is_video: session.is_video,
                });
                self.session = Some(session);
            }
            Err(e) => {
                error!("Failed to place call to {}: {}", session.counterpart.user_id, e);
                session.release().await;
                self.emit(CallEvent::DialFailed {
                    target: session.counterpart,
                    reason: EndReason::Failed(e.to_string()),
                });
            }
        }
    }

    async fn place_offer(&self, session: &mut CallSession) -> Result<(), CallError> {
        let local = session.local.clone().unwrap_or_default();
        let link = self
            .peers
            .create(session.token, &local, self.peer_event_tx.clone())
            .await?;
        let peer = session.peer.insert(PeerConnectionManager::new(link));
        let offer = peer.create_offer().await?;

        self.signals.send_signal(
            &session.counterpart.user_id,
            Signal::CallOffer {
                session_description: offer,
                is_video: session.is_video,
                caller_profile: self.me.clone(),
            },
        )
    }

    async fn finish_answer(&mut self, token: SessionToken, result: Result<LocalStream, CallError>) {
        let current = matches!(
            &self.session,
            Some(s) if s.token == token && s.status == CallStatus::Incoming && s.answering
        );
        if !current {
            discard_media(token, result);
            return;
        }

        let local = match result {
            Ok(local) => local,
            Err(e) => {
                warn!("Could not acquire media to answer: {}", e);
                self.decline(EndReason::MediaUnavailable).await;
                return;
            }
        };

        let Some(mut session) = self.session.take() else {
            local.stop();
            return;
        };
        session.local = Some(local);
        session.apply_track_flags();

        match self.send_answer(&mut session).await {
            Ok(()) => {
                session.answering = false;
                session.mark_connected();
                info!("Call with {} connected", session.counterpart.user_id);
                self.emit(CallEvent::CallConnected {
                    counterpart: session.counterpart.clone(),
                });
                self.session = Some(session);
            }
            Err(e) => {
                error!("Failed to answer call from {}: {}", session.counterpart.user_id, e);
                self.session = Some(session);
                self.teardown_and_notify(EndReason::Failed(e.to_string())).await;
            }
        }
    }

    async fn send_answer(&self, session: &mut CallSession) -> Result<(), CallError> {
        let offer = session
            .pending_offer
            .take()
            .ok_or(CallError::InvalidState("incoming call has no offer"))?;
        let local = session.local.clone().unwrap_or_default();
        let link = self
            .peers
            .create(session.token, &local, self.peer_event_tx.clone())
            .await?;
        let peer = session.peer.insert(PeerConnectionManager::new(link));

        for candidate in session.early_candidates.drain(..) {
            peer.add_remote_candidate(candidate).await?;
        }
        let answer = peer.accept_offer(offer).await?;

        self.signals.send_signal(
            &session.counterpart.user_id,
            Signal::CallAnswer {
                session_description: answer,
            },
        )
    }

    // ============================================================
    // Teardown
    // ============================================================

    /// Tell the caller no, then return to Idle.
    async fn decline(&mut self, reason: EndReason) {
        if let Some(session) = &self.session {
            if let Err(e) = self
                .signals
                .send_signal(&session.counterpart.user_id, Signal::CallReject {})
            {
                warn!("Failed to send call rejection: {}", e);
            }
        }
        self.teardown(reason).await;
    }

    async fn teardown_and_notify(&mut self, reason: EndReason) {
        if let Some(session) = &self.session {
            if let Err(e) = self
                .signals
                .send_signal(&session.counterpart.user_id, Signal::CallEnd {})
            {
                warn!("Failed to send call end: {}", e);
            }
        }
        self.teardown(reason).await;
    }

    /// Release everything held by the current session and return to Idle.
    /// Does nothing when already Idle.
    async fn teardown(&mut self, reason: EndReason) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.release().await;
        info!(
            "Call with {} ended: {:?}",
            session.counterpart.user_id, reason
        );
        self.emit(CallEvent::CallEnded {
            counterpart: session.counterpart,
            reason,
        });
    }

    /// Drop our own outgoing call silently in favour of theirs.
    async fn abandon_outgoing(&mut self) {
        self.dialing = None;
        if let Some(mut session) = self.session.take() {
            session.release().await;
        }
    }

    // ============================================================
    // Helpers
    // ============================================================

    /// Remember the ufrag of an offer we are not going to answer.
    fn ignore_offer_ufrag(&mut self, offer: &SessionDescription) {
        let Some(ufrag) = offer.ice_ufrag().map(str::to_string) else {
            return;
        };
        if let Some(session) = self.session.as_mut() {
            session.ignored_ufrags.push(ufrag);
        } else if let Some(dial) = self.dialing.as_mut() {
            dial.ignored_ufrags.push(ufrag);
        }
    }

    fn is_counterpart(&self, user_id: &str) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_with(user_id))
    }

    fn allocate_token(&mut self) -> SessionToken {
        self.next_token += 1;
        self.next_token
    }

    fn spawn_acquire(&self, token: SessionToken, purpose: AcquirePurpose, constraints: MediaConstraints) {
        let media = self.media.clone();
        let continuation_tx = self.continuation_tx.clone();
        tokio::spawn(async move {
            let result = media.acquire(constraints).await;
            let _ = continuation_tx.send(Continuation::MediaReady {
                token,
                purpose,
                result,
            });
        });
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.event_tx.send(event);
    }

    fn publish(&self) {
        let snapshot = match (&self.session, &self.dialing) {
            (Some(session), _) => session.snapshot(),
            (None, Some(dial)) => CallSnapshot {
                counterpart: Some(dial.target.clone()),
                is_video: dial.is_video,
                dialing: true,
                ..Default::default()
            },
            (None, None) => CallSnapshot::default(),
        };
        self.state_tx.send_replace(snapshot);
    }
}

fn discard_media(token: SessionToken, result: Result<LocalStream, CallError>) {
    debug!("Discarding media acquired for stale session {}", token);
    if let Ok(local) = result {
        local.stop();
    }
}
