// Alert sinks: the channels the tracking controller asks to start and stop an alarm.

use log::{info, warn};

use super::model::{AlertContext, AlertSettings};
use crate::core::error::AlertSinkError;

/// Receives alert episode start/stop requests.
///
/// Failures are reported back but never end a tracking session.
pub trait AlertSink {
    /// Name used in log messages
    fn name(&self) -> &str;

    fn begin_alert(&mut self, ctx: &AlertContext) -> Result<(), AlertSinkError>;

    /// Called when a session stops, whether or not an alert was running.
    fn end_alert(&mut self) -> Result<(), AlertSinkError>;
}

/// Visual and vibration channels rendered as log lines.
pub struct LogAlertSink {
    settings: AlertSettings,
    active: bool,
}

impl LogAlertSink {
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            settings,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    fn begin_alert(&mut self, ctx: &AlertContext) -> Result<(), AlertSinkError> {
        if self.active {
            return Ok(());
        }
        self.active = true;

        if self.settings.visual {
            warn!("YOUR STOP IS ARRIVING! {}", ctx.message());
        }
        if !self.settings.vibration_pattern_ms.is_empty() {
            info!("Vibrating: {:?} ms", self.settings.vibration_pattern_ms);
        }
        Ok(())
    }

    fn end_alert(&mut self) -> Result<(), AlertSinkError> {
        if self.active {
            self.active = false;
            info!("Alarm disabled.");
        }
        Ok(())
    }
}

/// Forwards to every child sink. One failing child does not keep the others from running.
pub struct FanoutSink {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn for_each<F>(&mut self, mut call: F) -> Result<(), AlertSinkError>
    where
        F: FnMut(&mut dyn AlertSink) -> Result<(), AlertSinkError>,
    {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = call(sink.as_mut()) {
                warn!("Alert sink {} failed: {}", sink.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl AlertSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    fn begin_alert(&mut self, ctx: &AlertContext) -> Result<(), AlertSinkError> {
        self.for_each(|sink| sink.begin_alert(ctx))
    }

    fn end_alert(&mut self) -> Result<(), AlertSinkError> {
        self.for_each(|sink| sink.end_alert())
    }
}
