pub mod connection;
pub mod peer;
pub mod tracks;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// What to ask the platform for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// Microphone always, camera only for video calls.
    pub fn for_call(is_video: bool) -> Self {
        Self { audio: true, video: is_video }
    }
}

/// A captured local track.
///
/// Disabling a track keeps it attached to the transport but stops it from
/// producing media, so mute and camera-off never require renegotiation.
/// Stopping is terminal and releases the underlying device.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
    fn stop(&self);
    fn is_stopped(&self) -> bool;

    /// Transport-facing track added to the peer connection, if any.
    fn rtc_track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// The set of tracks returned by one acquisition.
#[derive(Clone, Default)]
pub struct LocalStream {
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl LocalStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Video)
    }

    /// Enable or disable every track of one kind.
    pub fn set_kind_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.tracks.iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
        }
    }

    /// Stop every track. Safe to call more than once.
    pub fn stop(&self) {
        for track in &self.tracks {
            if !track.is_stopped() {
                track.stop();
            }
        }
    }

    /// Tracks backed by [`tracks::SampleTrack`], for feeding encoded media.
    pub fn sample_tracks(&self) -> impl Iterator<Item = &tracks::SampleTrack> {
        self.tracks
            .iter()
            .filter_map(|t| t.as_any().downcast_ref::<tracks::SampleTrack>())
    }
}

impl fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tracks.iter().map(|t| (t.id().to_string(), t.kind(), t.is_enabled())))
            .finish()
    }
}

/// Local camera/microphone capability.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Fails with [`CallError::MediaUnavailable`] on permission denial or a
    /// missing device.
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, CallError>;
}

/// A track received from the counterpart.
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    pub handle: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
