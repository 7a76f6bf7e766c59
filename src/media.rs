use log::{debug, info};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{MeetingError, MeetingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

/// Handle to one audio or video track.
///
/// Cloning the handle shares the underlying track. Use [`MediaTrack::duplicate`]
/// to get a track with its own enable/stop lifecycle.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self::with_state(kind, label.into(), true, false)
    }

    fn with_state(kind: TrackKind, label: String, enabled: bool, stopped: bool) -> Self {
        MediaTrack {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                label,
                enabled: AtomicBool::new(enabled),
                stopped: AtomicBool::new(stopped),
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

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Releases the track. Calling it again does nothing.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            debug!("Stopped {:?} track {}", self.inner.kind, self.inner.id);
        }
    }

    pub fn ready_state(&self) -> TrackState {
        if self.inner.stopped.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.ready_state() == TrackState::Ended
    }

    /// New independent track with the same kind, label, enabled flag and ready state.
    pub fn duplicate(&self) -> MediaTrack {
        MediaTrack::with_state(
            self.inner.kind,
            self.inner.label.clone(),
            self.is_enabled(),
            self.is_stopped(),
        )
    }

    pub fn ptr_eq(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .field("state", &self.ready_state())
            .finish()
    }
}

#[derive(Debug)]
struct StreamInner {
    id: String,
    tracks: Vec<MediaTrack>,
}

/// Handle to an ordered set of tracks. Cloning the handle keeps reference identity.
#[derive(Debug, Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        MediaStream {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4().to_string(),
                tracks,
            }),
        }
    }

    pub fn empty() -> Self {
        Self::new(vec![])
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &MediaTrack> {
        self.inner
            .tracks
            .iter()
            .filter(move |track| track.kind() == kind)
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        for track in self.audio_tracks() {
            track.set_enabled(enabled);
        }
    }

    pub fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }

    /// Same stream with `track` appended. The existing tracks are shared, not duplicated.
    pub fn with_track(&self, track: MediaTrack) -> MediaStream {
        let mut tracks = self.inner.tracks.clone();
        tracks.push(track);
        MediaStream::new(tracks)
    }

    /// Same stream without the track whose id is `track_id`.
    pub fn without_track(&self, track_id: &str) -> MediaStream {
        let tracks = self
            .inner
            .tracks
            .iter()
            .filter(|track| track.id() != track_id)
            .cloned()
            .collect();
        MediaStream::new(tracks)
    }

    pub fn ptr_eq(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Builds a new stream out of independent copies of every track in `stream`.
pub fn clone_media_stream(stream: &MediaStream) -> MediaStream {
    MediaStream::new(stream.tracks().iter().map(MediaTrack::duplicate).collect())
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        CaptureConstraints {
            audio: true,
            video: true,
        }
    }
}

/// Acquires the local capture stream: one camera and/or one microphone track.
pub fn acquire_local_media(constraints: CaptureConstraints) -> MeetingResult<MediaStream> {
    if !constraints.audio && !constraints.video {
        return Err(MeetingError::MediaAcquisition(
            "at least one of audio or video must be requested".to_string(),
        ));
    }

    let mut tracks = Vec::with_capacity(2);
    if constraints.video {
        tracks.push(MediaTrack::new(TrackKind::Video, "camera"));
    }
    if constraints.audio {
        tracks.push(MediaTrack::new(TrackKind::Audio, "microphone"));
    }

    let stream = MediaStream::new(tracks);
    info!(
        "Acquired local media stream {} with {} track(s)",
        stream.id(),
        stream.tracks().len()
    );

    Ok(stream)
}
