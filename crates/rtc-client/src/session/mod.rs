//! Session orchestration: coordinator, roster, and session events

pub mod coordinator;
pub mod events;

pub use coordinator::SessionCoordinator;
pub use events::{Participant, SessionEvent, SessionState};
