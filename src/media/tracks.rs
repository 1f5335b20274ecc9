use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::{LocalStream, MediaConstraints, MediaSource, MediaTrack, TrackKind};
use crate::error::CallError;

const STREAM_ID: &str = "chatr-call";

/// Local track that the application feeds with encoded samples.
pub struct SampleTrack {
    id: String,
    kind: TrackKind,
    inner: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl SampleTrack {
    pub fn new(kind: TrackKind) -> Self {
        let capability = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                clock_rate: 48000,
                channels: 1,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                rtcp_feedback: vec![],
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
        };
        let id = format!("{}-{}", kind, Uuid::new_v4());
        let inner = Arc::new(TrackLocalStaticSample::new(
            capability,
            id.clone(),
            STREAM_ID.to_string(),
        ));

        Self {
            id,
            kind,
            inner,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    /// Write one encoded sample. Samples written while the track is disabled
    /// or stopped are dropped.
    pub async fn write_sample(&self, sample: &Sample) -> Result<(), CallError> {
        if !self.is_enabled() || self.is_stopped() {
            return Ok(());
        }
        self.inner
            .write_sample(sample)
            .await
            .map_err(|e| CallError::Transport(format!("Failed to write {} sample: {}", self.kind, e)))
    }
}

impl MediaTrack for SampleTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::Relaxed) {
            debug!("Stopped local {} track {}", self.kind, self.id);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    fn rtc_track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        Some(self.inner.clone() as Arc<dyn TrackLocal + Send + Sync>)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Media source producing [`SampleTrack`]s for the devices it was told exist.
pub struct SampleMediaSource {
    has_microphone: bool,
    has_camera: bool,
}

impl SampleMediaSource {
    pub fn new(has_microphone: bool, has_camera: bool) -> Self {
        Self {
            has_microphone,
            has_camera,
        }
    }
}

impl Default for SampleMediaSource {
    fn default() -> Self {
        Self::new(true, true)
    }
}

#[async_trait]
impl MediaSource for SampleMediaSource {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, CallError> {
        if constraints.audio && !self.has_microphone {
            return Err(CallError::MediaUnavailable("no microphone available".to_string()));
        }
        if constraints.video && !self.has_camera {
            return Err(CallError::MediaUnavailable("no camera available".to_string()));
        }

        let mut tracks: Vec<Arc<dyn MediaTrack>> = Vec::new();
        if constraints.audio {
            tracks.push(Arc::new(SampleTrack::new(TrackKind::Audio)));
        }
        if constraints.video {
            tracks.push(Arc::new(SampleTrack::new(TrackKind::Video)));
        }
        info!("Acquired local media (audio={}, video={})", constraints.audio, constraints.video);
        Ok(LocalStream::new(tracks))
    }
}
