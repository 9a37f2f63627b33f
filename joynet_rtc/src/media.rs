//! Local capture and remote track handles.
//!
//! A [`LocalTrack`] is shared by reference between the media session and every peer connection it is
//! attached to. Stopping it releases the capture device for all of them at once, so [`LocalTrack::stop`] only
//! reaches the [`TrackSource`] the first time it is called.

use crate::error::RtcError;
use async_trait::async_trait;
use auto_impl::auto_impl;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strum::{AsRefStr, Display};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// The device end of a local track
#[auto_impl(Arc, Box)]
pub trait TrackSource: Send + Sync {
    /// Releases the underlying device
    fn stop(&self);
}

struct LocalTrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
    source: Arc<dyn TrackSource>,
}

#[derive(Clone)]
pub struct LocalTrack {
    inner: Arc<LocalTrackInner>,
}

impl LocalTrack {
    pub fn new<T: Into<String>>(kind: TrackKind, label: T, source: Arc<dyn TrackSource>) -> Self {
        Self {
            inner: Arc::new(LocalTrackInner {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                source,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Muting a track keeps it attached; senders emit silence or black frames instead
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Returns true if this call released the device
    pub fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }

        log::trace!(target: "joynet", "Stopping {} track {}", self.kind(), self.id());
        self.inner.source.stop();
        true
    }

    /// True if both handles refer to the same capture
    pub fn same_track(&self, other: &LocalTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The result of one capture request
#[derive(Clone, Debug, Default)]
pub struct LocalStream {
    tracks: Vec<LocalTrack>,
}

impl LocalStream {
    pub fn new(tracks: Vec<LocalTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(move |track| track.kind() == kind)
    }

    /// Returns the number of tracks this call stopped
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|track| track.stop()).count()
    }
}

/// A track received from a remote peer
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Access to local capture devices
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait MediaDevices: Send + Sync {
    /// Fails with [`RtcError::MediaAccess`] if the user or platform refuses capture
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<LocalStream, RtcError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSource(AtomicUsize);

    impl TrackSource for CountingSource {
        fn stop(&self) {
            let _ = self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn stop_reaches_the_source_once() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let track = LocalTrack::new(TrackKind::Audio, "mic", source.clone());
        let attached = track.clone();

        assert!(track.stop());
        assert!(!attached.stop());
        assert!(attached.is_stopped());
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enabled_flag_is_shared_between_handles() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let stream = LocalStream::new(vec![
            LocalTrack::new(TrackKind::Audio, "mic", source.clone()),
            LocalTrack::new(TrackKind::Video, "cam", source.clone()),
        ]);
        let attached = stream.tracks()[1].clone();
        attached.set_enabled(false);

        assert!(!stream.tracks_of(TrackKind::Video).any(LocalTrack::is_enabled));
        assert!(stream.tracks_of(TrackKind::Audio).all(LocalTrack::is_enabled));
        assert_eq!(stream.stop_all(), 2);
        assert_eq!(stream.stop_all(), 0);
    }
}
