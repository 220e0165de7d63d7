//! Local capture seams
//!
//! [`MediaDevices`] abstracts platform capture (camera, microphone, screen)
//! behind an async acquisition interface; [`MediaTrack`] is the handle for a
//! single owned capture track. Production integrations back tracks with a
//! [`SampleTrack`] feeding a webrtc-rs `TrackLocalStaticSample`; tests use
//! plain in-memory tracks.

use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Microphone / remote audio
    Audio,
    /// Camera, screen, or remote video
    Video,
}

/// A single locally owned capture track.
///
/// `set_enabled(false)` is a software mute: the capture keeps running but
/// produces silence/black, with no renegotiation. `stop` releases the
/// underlying device and is idempotent.
pub trait MediaTrack: Send + Sync {
    /// Stable track id
    fn id(&self) -> &str;

    /// Audio or video
    fn kind(&self) -> TrackKind;

    /// Whether the track currently produces media
    fn is_enabled(&self) -> bool;

    /// Software-enable/disable in place
    fn set_enabled(&self, enabled: bool);

    /// Release the underlying device. Idempotent.
    fn stop(&self);

    /// Whether `stop` has been called
    fn is_stopped(&self) -> bool;

    /// The webrtc-rs local track to bind to an RTP sender, when this
    /// track is backed by one (test tracks are not)
    fn rtc_track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        None
    }
}

/// Shared track handle
pub type TrackHandle = Arc<dyn MediaTrack>;

/// A group of tracks acquired together (one `getUserMedia`/display capture)
#[derive(Clone)]
pub struct MediaStreamHandle {
    id: String,
    tracks: Vec<TrackHandle>,
}

impl MediaStreamHandle {
    /// Create a stream handle over the given tracks
    pub fn new(tracks: Vec<TrackHandle>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// Stream id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All tracks in the stream
    pub fn tracks(&self) -> &[TrackHandle] {
        &self.tracks
    }

    /// The first audio track, if any
    pub fn audio_track(&self) -> Option<TrackHandle> {
        self.tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Audio)
            .cloned()
    }

    /// The first video track, if any
    pub fn video_track(&self) -> Option<TrackHandle> {
        self.tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Video)
            .cloned()
    }

    /// Stop every track. Idempotent; stopping an already-stopped stream
    /// is a no-op.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Fires when the OS/browser-level "stop sharing" action ends a display
/// capture out from under us
pub type ScreenShareEnded = oneshot::Receiver<()>;

/// Platform capture interface
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire microphone and/or camera capture.
    ///
    /// At least one of `audio`/`video` must be requested. Failure
    /// (permission denied, no device) is non-fatal to the session.
    async fn acquire_user_media(&self, audio: bool, video: bool) -> Result<MediaStreamHandle>;

    /// Acquire display capture plus the signal that fires if sharing is
    /// ended at the OS level rather than through the controller
    async fn acquire_display_media(&self) -> Result<(MediaStreamHandle, ScreenShareEnded)>;
}

/// A capture track backed by a webrtc-rs sample track.
///
/// The platform capture loop writes encoded samples through
/// [`SampleTrack::sample_writer`] and must honor `is_enabled` /
/// `is_stopped` when producing.
pub struct SampleTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    rtc: Arc<TrackLocalStaticSample>,
}

impl SampleTrack {
    /// Create a new sample-backed track for the given kind
    pub fn new(kind: TrackKind, stream_id: &str) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let capability = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        };

        let rtc = Arc::new(TrackLocalStaticSample::new(
            capability,
            id.clone(),
            stream_id.to_string(),
        ));

        Self {
            id,
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            rtc,
        }
    }

    /// The sample sink the capture loop writes into
    pub fn sample_writer(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.rtc)
    }
}

impl MediaTrack for SampleTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn rtc_track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        Some(Arc::clone(&self.rtc) as Arc<dyn TrackLocal + Send + Sync>)
    }
}

/// Validate an acquisition request before touching hardware
pub(crate) fn validate_user_media_request(audio: bool, video: bool) -> Result<()> {
    if !audio && !video {
        return Err(Error::DeviceError(
            "user media request must include audio or video".to_string(),
        ));
    }
    Ok(())
}
