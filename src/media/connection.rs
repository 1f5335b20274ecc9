//! Owns the transport object of one call session.
//!
//! Remote ICE candidates can arrive before or after the remote description.
//! Early ones are buffered here and applied in arrival order as soon as a
//! remote description is in place.

use tracing::{debug, info, warn};

use super::peer::PeerLink;
use crate::error::CallError;
use crate::models::{IceCandidate, SessionDescription};

pub struct PeerConnectionManager {
    link: Box<dyn PeerLink>,
    has_remote_description: bool,
    pending_candidates: Vec<IceCandidate>,
    renegotiating: bool,
    local_ufrag: Option<String>,
    /// Our ICE-restart offer is out and unanswered.
    restart_offer_pending: bool,
    closed: bool,
}

impl PeerConnectionManager {
    pub fn new(link: Box<dyn PeerLink>) -> Self {
        Self {
            link,
            has_remote_description: false,
            pending_candidates: Vec::new(),
            renegotiating: false,
            local_ufrag: None,
            restart_offer_pending: false,
            closed: false,
        }
    }

    /// Initial offer of an outgoing call.
    pub async fn create_offer(&mut self) -> Result<SessionDescription, CallError> {
        let offer = self.link.create_offer(false).await?;
        self.note_local(&offer);
        Ok(offer)
    }

    /// Apply the caller's offer and produce our answer.
    pub async fn accept_offer(&mut self, offer: SessionDescription) -> Result<SessionDescription, CallError> {
        self.set_remote(offer).await?;
        let answer = self.link.create_answer().await?;
        self.note_local(&answer);
        Ok(answer)
    }

    /// Apply the counterpart's answer to our (initial or renegotiation) offer.
    pub async fn apply_answer(&mut self, answer: SessionDescription) -> Result<(), CallError> {
        self.set_remote(answer).await?;
        if self.restart_offer_pending {
            debug!("Renegotiation answer applied");
        }
        self.restart_offer_pending = false;
        Ok(())
    }

    pub async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), CallError> {
        if !self.has_remote_description {
            debug!("Buffering remote ICE candidate until the remote description is set");
            self.pending_candidates.push(candidate);
            return Ok(());
        }
        self.link.add_ice_candidate(candidate).await
    }

    /// Start an ICE restart on the existing connection. The returned offer
    /// goes out as a renegotiate-offer.
    pub async fn renegotiate(&mut self) -> Result<SessionDescription, CallError> {
        self.renegotiating = true;
        info!("Renegotiating call transport with ICE restart");
        let offer = self.link.create_offer(true).await?;
        self.note_local(&offer);
        self.restart_offer_pending = true;
        Ok(offer)
    }

    /// Answer a renegotiation offer on the existing connection. An
    /// unanswered restart offer of our own is rolled back first.
    pub async fn accept_renegotiation(
        &mut self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, CallError> {
        if self.restart_offer_pending {
            info!("Rolling back our restart offer in favour of the counterpart's");
            self.link.rollback().await?;
            self.restart_offer_pending = false;
        }
        self.set_remote(offer).await?;
        let answer = self.link.create_answer().await?;
        self.note_local(&answer);
        Ok(answer)
    }

    /// A reconnect attempt is in progress and has not yet recovered.
    pub fn is_renegotiating(&self) -> bool {
        self.renegotiating
    }

    pub fn has_pending_restart_offer(&self) -> bool {
        self.restart_offer_pending
    }

    /// Transport reported connected again.
    pub fn connectivity_restored(&mut self) {
        if self.renegotiating {
            info!("Call transport recovered");
        }
        self.renegotiating = false;
    }

    /// Stamp an outgoing candidate with the ufrag of our current local
    /// description, so the counterpart can tell which transport it belongs to.
    pub fn tag_local_candidate(&self, candidate: &mut IceCandidate) {
        if candidate.username_fragment.is_none() {
            candidate.username_fragment = self.local_ufrag.clone();
        }
    }

    fn note_local(&mut self, description: &SessionDescription) {
        if let Some(ufrag) = description.ice_ufrag() {
            self.local_ufrag = Some(ufrag.to_string());
        }
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Detach observers, then close the transport. Only the first call has
    /// any effect.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending_candidates.clear();
        self.link.detach();
        if let Err(e) = self.link.close().await {
            warn!("Error closing call transport: {}", e);
        }
    }

    async fn set_remote(&mut self, description: SessionDescription) -> Result<(), CallError> {
        self.link.set_remote_description(description).await?;
        self.has_remote_description = true;

        for candidate in std::mem::take(&mut self.pending_candidates) {
            if let Err(e) = self.link.add_ice_candidate(candidate).await {
                warn!("Dropping buffered ICE candidate: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{candidate, FakeLink, LinkCall};

    #[tokio::test]
    async fn candidates_before_remote_description_are_buffered_in_order() {
        let (link, log) = FakeLink::new();
        let mut pcm = PeerConnectionManager::new(Box::new(link));

        pcm.add_remote_candidate(candidate("c1")).await.unwrap();
        pcm.add_remote_candidate(candidate("c2")).await.unwrap();
        assert_eq!(pcm.pending_candidates(), 2);
        assert!(log.calls().is_empty());

        pcm.accept_offer(SessionDescription::offer("remote")).await.unwrap();
        pcm.add_remote_candidate(candidate("c3")).await.unwrap();

        assert_eq!(
            log.calls(),
            vec![
                LinkCall::SetRemote(SessionDescription::offer("remote")),
                LinkCall::AddCandidate("c1".to_string()),
                LinkCall::AddCandidate("c2".to_string()),
                LinkCall::CreateAnswer,
                LinkCall::AddCandidate("c3".to_string()),
            ]
        );
        assert_eq!(pcm.pending_candidates(), 0);
    }

    #[tokio::test]
    async fn renegotiation_requests_ice_restart() {
        let (link, log) = FakeLink::new();
        let mut pcm = PeerConnectionManager::new(Box::new(link));

        pcm.create_offer().await.unwrap();
        pcm.apply_answer(SessionDescription::answer("a")).await.unwrap();
        pcm.renegotiate().await.unwrap();
        assert!(pcm.is_renegotiating());
        assert!(pcm.has_pending_restart_offer());
        pcm.apply_answer(SessionDescription::answer("b")).await.unwrap();
        assert!(!pcm.has_pending_restart_offer());
        pcm.connectivity_restored();
        assert!(!pcm.is_renegotiating());

        let calls = log.calls();
        assert_eq!(calls[0], LinkCall::CreateOffer { ice_restart: false });
        assert_eq!(calls[2], LinkCall::CreateOffer { ice_restart: true });
    }

    #[tokio::test]
    async fn counterpart_restart_rolls_back_our_offer() {
        let (link, log) = FakeLink::new();
        let mut pcm = PeerConnectionManager::new(Box::new(link));
        pcm.accept_offer(SessionDescription::offer("initial")).await.unwrap();

        pcm.renegotiate().await.unwrap();
        assert!(pcm.has_pending_restart_offer());
        pcm.accept_renegotiation(SessionDescription::offer("theirs"))
            .await
            .unwrap();
        assert!(!pcm.has_pending_restart_offer());
        assert!(pcm.is_renegotiating());

        let calls = log.calls();
        assert_eq!(
            calls[2..],
            [
                LinkCall::CreateOffer { ice_restart: true },
                LinkCall::Rollback,
                LinkCall::SetRemote(SessionDescription::offer("theirs")),
                LinkCall::CreateAnswer,
            ]
        );
    }

    #[tokio::test]
    async fn plain_renegotiation_answer_needs_no_rollback() {
        let (link, log) = FakeLink::new();
        let mut pcm = PeerConnectionManager::new(Box::new(link));
        pcm.accept_offer(SessionDescription::offer("initial")).await.unwrap();
        pcm.accept_renegotiation(SessionDescription::offer("restart"))
            .await
            .unwrap();
        assert!(!log.calls().contains(&LinkCall::Rollback));
    }

    #[tokio::test]
    async fn local_candidates_carry_the_current_ufrag() {
        let (link, _log) = FakeLink::new();
        let mut pcm = PeerConnectionManager::new(Box::new(link));

        let mut untagged = candidate("c1");
        pcm.tag_local_candidate(&mut untagged);
        assert_eq!(untagged.username_fragment, None);

        pcm.create_offer().await.unwrap();
        let mut first = candidate("c2");
        pcm.tag_local_candidate(&mut first);
        assert_eq!(first.username_fragment.as_deref(), Some("offer"));

        pcm.apply_answer(SessionDescription::answer("a")).await.unwrap();
        pcm.renegotiate().await.unwrap();
        let mut restarted = candidate("c3");
        pcm.tag_local_candidate(&mut restarted);
        assert_eq!(restarted.username_fragment.as_deref(), Some("restart"));
    }

    #[tokio::test]
    async fn close_detaches_first_and_runs_once() {
        let (link, log) = FakeLink::new();
        let mut pcm = PeerConnectionManager::new(Box::new(link));
        pcm.close().await;
        pcm.close().await;
        assert_eq!(log.calls(), vec![LinkCall::Detach, LinkCall::Close]);
        assert_eq!(log.closes(), 1);
    }

    #[tokio::test]
    async fn failed_remote_description_keeps_candidates_buffered() {
        let (link, log) = FakeLink::new();
        log.fail_remote_description();
        let mut pcm = PeerConnectionManager::new(Box::new(link));
        pcm.add_remote_candidate(candidate("c1")).await.unwrap();

        let err = pcm.apply_answer(SessionDescription::answer("bad")).await.unwrap_err();
        assert!(matches!(err, CallError::Negotiation(_)));
        assert_eq!(pcm.pending_candidates(), 1);
    }
}
