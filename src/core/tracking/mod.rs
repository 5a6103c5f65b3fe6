// Proximity tracking: the session and the state machine that turns fixes into alerts.
//
// Architecture:
// - session.rs: TrackingSession and the externally visible TrackingState
// - controller.rs: TrackingController, the only thing that mutates a session

pub mod controller;
pub mod session;

pub use controller::{
    FixOutcome, IgnoreReason, StaleReporter, StartRequest, StatusUpdate, ToggleOutcome, TrackingController,
};
pub use session::{TrackingSession, TrackingState};
