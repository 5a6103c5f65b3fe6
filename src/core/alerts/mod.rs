// Alert system: the side effects fired when the destination comes within range.
//
// Architecture:
// - model.rs: Alert configuration and episode context
// - sink.rs: AlertSink trait plus log and fan-out sinks
// - audio.rs: rodio-backed audible alarm (feature "audio")

#[cfg(feature = "audio")]
pub mod audio;
pub mod model;
pub mod sink;

pub use model::{AlertContext, AlertSettings, AlertSound};
pub use sink::{AlertSink, FanoutSink, LogAlertSink};
