//! Local media: capture seams and the controller that owns outgoing tracks

pub mod controller;
pub mod devices;

pub use controller::{MediaController, MediaEvent, MediaStateSnapshot};
pub use devices::{
    MediaDevices, MediaStreamHandle, MediaTrack, SampleTrack, ScreenShareEnded, TrackHandle,
    TrackKind,
};
