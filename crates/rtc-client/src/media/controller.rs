//! Local media control
//!
//! [`MediaController`] owns the local capture state: the camera/microphone
//! stream, the optional screen-share stream that supersedes camera video
//! (and releases the camera's device) while active, and the mute flags. Consumers watch [`MediaEvent`]s to
//! learn when the outgoing track set changes (a real replacement, needing
//! sender rebinding) versus when only soft state changed (mute, which never
//! renegotiates).
//!
//! Acquisitions are guarded by a generation counter: each toggle that starts
//! an acquisition bumps the generation, and a completed acquisition only
//! installs its stream if the generation still matches and the controller is
//! not closed. Superseded or post-shutdown acquisitions stop their tracks
//! immediately instead of leaking live captures.

use super::devices::{MediaDevices, MediaStreamHandle, TrackHandle, TrackKind};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Point-in-time view of the local media state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaStateSnapshot {
    /// Microphone is live and unmuted
    pub audio_enabled: bool,
    /// Camera is live and unmuted
    pub video_enabled: bool,
    /// A display capture is currently the outgoing video
    pub screen_sharing: bool,
}

/// Events emitted by the media controller
pub enum MediaEvent {
    /// The set of outgoing tracks changed; peer senders must be rebound
    OutgoingTracksChanged {
        /// Current outgoing audio track, if any
        audio: Option<TrackHandle>,
        /// Current outgoing video track (camera or screen), if any
        video: Option<TrackHandle>,
    },
    /// Soft state changed (mute flags, share flag); no track replacement
    StateChanged(MediaStateSnapshot),
    /// A device acquisition failed; previous state is preserved
    DeviceError(String),
}

impl std::fmt::Debug for MediaEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutgoingTracksChanged { audio, video } => write!(
                f,
                "OutgoingTracksChanged(audio: {}, video: {})",
                audio.as_ref().map(|t| t.id()).unwrap_or("none"),
                video.as_ref().map(|t| t.id()).unwrap_or("none"),
            ),
            Self::StateChanged(snapshot) => write!(f, "StateChanged({:?})", snapshot),
            Self::DeviceError(message) => write!(f, "DeviceError({})", message),
        }
    }
}

#[derive(Default)]
struct MediaState {
    user_stream: Option<MediaStreamHandle>,
    screen_stream: Option<MediaStreamHandle>,
    audio_enabled: bool,
    video_enabled: bool,
}

impl MediaState {
    fn snapshot(&self) -> MediaStateSnapshot {
        MediaStateSnapshot {
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
            screen_sharing: self.screen_stream.is_some(),
        }
    }

    fn outgoing_audio(&self) -> Option<TrackHandle> {
        self.user_stream.as_ref().and_then(|s| s.audio_track())
    }

    /// Screen video supersedes camera video while a share is active.
    fn outgoing_video(&self) -> Option<TrackHandle> {
        if let Some(screen) = &self.screen_stream {
            return screen.video_track();
        }
        self.user_stream.as_ref().and_then(|s| s.video_track())
    }
}

/// Owns local capture and the outgoing track set
pub struct MediaController {
    devices: Arc<dyn MediaDevices>,
    state: Mutex<MediaState>,
    generation: AtomicU64,
    closed: AtomicBool,
    events_tx: mpsc::Sender<MediaEvent>,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<MediaEvent>>>,
}

impl MediaController {
    /// Create a controller over the given capture interface
    pub fn new(devices: Arc<dyn MediaDevices>, queue_depth: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(queue_depth);
        Self {
            devices,
            state: Mutex::new(MediaState::default()),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            events_tx,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
        }
    }

    /// Take the event stream. Yields `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::Receiver<MediaEvent>> {
        self.events_rx.lock().take()
    }

    /// Current state snapshot
    pub async fn snapshot(&self) -> MediaStateSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Current outgoing tracks (audio, video)
    pub async fn outgoing_tracks(&self) -> (Option<TrackHandle>, Option<TrackHandle>) {
        let state = self.state.lock().await;
        (state.outgoing_audio(), state.outgoing_video())
    }

    /// Acquire (or reshape) the user capture with the given track set.
    ///
    /// Replaces any existing user stream. Device failure is reported as a
    /// [`MediaEvent::DeviceError`] and also returned; the previous state is
    /// preserved and the session can continue receive-only.
    pub async fn start_user_media(&self, audio: bool, video: bool) -> Result<()> {
        super::devices::validate_user_media_request(audio, video)?;
        let generation = self.bump_generation();

        let acquired = self.devices.acquire_user_media(audio, video).await;
        let stream = match acquired {
            Ok(stream) => stream,
            Err(e) => {
                warn!("User media acquisition failed: {}", e);
                self.emit(MediaEvent::DeviceError(e.to_string())).await;
                return Err(e);
            }
        };

        if !self.install_guard(generation, &stream) {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        if let Some(old) = state.user_stream.take() {
            old.stop_all();
        }
        state.audio_enabled = stream.audio_track().is_some();
        state.video_enabled = stream.video_track().is_some();
        state.user_stream = Some(stream);
        let (out_audio, out_video) = (state.outgoing_audio(), state.outgoing_video());
        drop(state);

        info!("User media started (audio: {}, video: {})", audio, video);
        self.emit(MediaEvent::OutgoingTracksChanged {
            audio: out_audio,
            video: out_video,
        })
        .await;
        Ok(())
    }

    /// Toggle the microphone.
    ///
    /// With a live audio track this is a software mute: the track is
    /// disabled in place, stays attached to its senders, and keeps the
    /// negotiated topology. On first use the microphone is acquired
    /// (together with the camera only if video is already on).
    pub async fn toggle_audio(&self) -> Result<MediaStateSnapshot> {
        let want_video = {
            let mut state = self.state.lock().await;
            if let Some(track) = state.outgoing_audio() {
                state.audio_enabled = !state.audio_enabled;
                track.set_enabled(state.audio_enabled);
                let snapshot = state.snapshot();
                drop(state);

                debug!("Audio enabled: {}", snapshot.audio_enabled);
                self.emit(MediaEvent::StateChanged(snapshot)).await;
                return Ok(snapshot);
            }
            state.video_enabled
        };

        self.start_user_media(true, want_video).await?;
        Ok(self.snapshot().await)
    }

    /// Toggle the camera.
    ///
    /// A stopped camera track cannot be cheaply re-enabled, so the user
    /// capture is recreated with the new shape; the resulting track change
    /// replaces senders in place, with no renegotiation. A mute that was in
    /// effect survives the recreation.
    pub async fn toggle_video(&self) -> Result<MediaStateSnapshot> {
        let (had_audio, audio_enabled, video_now) = {
            let state = self.state.lock().await;
            (
                state.outgoing_audio().is_some(),
                state.audio_enabled,
                state.video_enabled,
            )
        };
        let want_video = !video_now;

        if !want_video && !had_audio {
            // Nothing left to capture.
            self.stop_user_media().await;
            return Ok(self.snapshot().await);
        }

        self.start_user_media(had_audio, want_video).await?;

        if had_audio && !audio_enabled {
            let mut state = self.state.lock().await;
            if let Some(track) = state.outgoing_audio() {
                track.set_enabled(false);
            }
            state.audio_enabled = false;
        }

        let snapshot = self.snapshot().await;
        debug!("Video enabled: {}", snapshot.video_enabled);
        self.emit(MediaEvent::StateChanged(snapshot)).await;
        Ok(snapshot)
    }

    /// Stop and drop the user capture stream entirely
    async fn stop_user_media(&self) {
        self.bump_generation();

        let mut state = self.state.lock().await;
        let Some(stream) = state.user_stream.take() else {
            return;
        };
        stream.stop_all();
        state.audio_enabled = false;
        state.video_enabled = false;
        let (out_audio, out_video) = (state.outgoing_audio(), state.outgoing_video());
        drop(state);

        self.emit(MediaEvent::OutgoingTracksChanged {
            audio: out_audio,
            video: out_video,
        })
        .await;
    }

    /// Start or stop screen sharing.
    ///
    /// Starting acquires a display capture, makes it the outgoing video,
    /// and releases the camera's device while the share runs. Stopping
    /// re-acquires the camera when it was on before the share. If the
    /// OS-level "stop sharing" control ends the capture, the controller
    /// reverts on its own.
    pub async fn toggle_screen_share(self: &Arc<Self>) -> Result<MediaStateSnapshot> {
        let sharing = self.state.lock().await.screen_stream.is_some();
        if sharing {
            self.stop_screen_share().await
        } else {
            self.start_screen_share().await
        }
    }

    async fn start_screen_share(self: &Arc<Self>) -> Result<MediaStateSnapshot> {
        let generation = self.bump_generation();

        let (stream, ended_rx) = match self.devices.acquire_display_media().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Display media acquisition failed: {}", e);
                self.emit(MediaEvent::DeviceError(e.to_string())).await;
                return Err(e);
            }
        };

        if !self.install_guard(generation, &stream) {
            return Err(Error::MediaTrackError(
                "screen share superseded before it started".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if let Some(old) = state.screen_stream.take() {
            old.stop_all();
        }
        // The camera's device does not stay hot behind the share. Stop it
        // and keep `video_enabled` as the marker to re-acquire on revert.
        if let Some(user) = state.user_stream.take() {
            if let Some(camera) = user.video_track() {
                camera.stop();
                let kept: Vec<TrackHandle> = user
                    .tracks()
                    .iter()
                    .filter(|t| t.kind() != TrackKind::Video)
                    .cloned()
                    .collect();
                if !kept.is_empty() {
                    state.user_stream = Some(MediaStreamHandle::new(kept));
                }
            } else {
                state.user_stream = Some(user);
            }
        }
        state.screen_stream = Some(stream);
        let snapshot = state.snapshot();
        let (out_audio, out_video) = (state.outgoing_audio(), state.outgoing_video());
        drop(state);

        // Revert to camera if the capture ends at the OS level. The
        // generation check makes a stale signal a no-op.
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if ended_rx.await.is_ok() {
                if controller.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                info!("Screen share ended by the OS, reverting to camera");
                if let Err(e) = controller.stop_screen_share().await {
                    warn!("Failed to revert after screen share ended: {}", e);
                }
            }
        });

        info!("Screen share started");
        self.emit(MediaEvent::OutgoingTracksChanged {
            audio: out_audio,
            video: out_video,
        })
        .await;
        Ok(snapshot)
    }

    /// Stop an active screen share.
    ///
    /// The camera device was released when the share started, so when video
    /// was on before the share the camera is re-acquired here and swapped
    /// back in. A no-op returning the current snapshot when no share is
    /// active.
    pub async fn stop_screen_share(&self) -> Result<MediaStateSnapshot> {
        self.bump_generation();

        let (had_audio, audio_enabled, camera_was_on) = {
            let mut state = self.state.lock().await;
            let Some(screen) = state.screen_stream.take() else {
                return Ok(state.snapshot());
            };
            screen.stop_all();
            (
                state.outgoing_audio().is_some(),
                state.audio_enabled,
                state.video_enabled,
            )
        };
        info!("Screen share stopped");

        if camera_was_on {
            if let Err(e) = self.start_user_media(had_audio, true).await {
                warn!("Camera re-acquisition after screen share failed: {}", e);
                let (out_audio, out_video) = {
                    let mut state = self.state.lock().await;
                    state.video_enabled = false;
                    (state.outgoing_audio(), state.outgoing_video())
                };
                self.emit(MediaEvent::OutgoingTracksChanged {
                    audio: out_audio,
                    video: out_video,
                })
                .await;
                return Err(e);
            }
            if had_audio && !audio_enabled {
                let mut state = self.state.lock().await;
                if let Some(track) = state.outgoing_audio() {
                    track.set_enabled(false);
                }
                state.audio_enabled = false;
            }
            return Ok(self.snapshot().await);
        }

        let (snapshot, out_audio, out_video) = {
            let state = self.state.lock().await;
            (
                state.snapshot(),
                state.outgoing_audio(),
                state.outgoing_video(),
            )
        };
        self.emit(MediaEvent::OutgoingTracksChanged {
            audio: out_audio,
            video: out_video,
        })
        .await;
        Ok(snapshot)
    }

    /// Stop all capture and reject any in-flight acquisitions.
    ///
    /// Idempotent. Acquisitions completing after shutdown stop their tracks
    /// instead of installing them.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bump_generation();

        let mut state = self.state.lock().await;
        if let Some(stream) = state.user_stream.take() {
            stream.stop_all();
        }
        if let Some(stream) = state.screen_stream.take() {
            stream.stop_all();
        }
        state.audio_enabled = false;
        state.video_enabled = false;
        info!("Media controller shut down");
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns whether a completed acquisition may be installed. A stale
    /// generation or a closed controller stops the stream on the spot.
    fn install_guard(&self, generation: u64, stream: &MediaStreamHandle) -> bool {
        if self.closed.load(Ordering::SeqCst)
            || self.generation.load(Ordering::SeqCst) != generation
        {
            debug!("Discarding superseded media acquisition");
            stream.stop_all();
            return false;
        }
        true
    }

    async fn emit(&self, event: MediaEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("Media event dropped: consumer gone");
        }
    }
}
