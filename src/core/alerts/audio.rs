// Audible alarm through the default output device.

use std::time::Duration;

use log::debug;
use rodio::source::{SineWave, Source};
use rodio::{OutputStream, OutputStreamBuilder, Sink};

use super::model::{AlertContext, AlertSound};
use super::sink::AlertSink;
use crate::core::error::AlertSinkError;

const TONE_MS: u64 = 400;
const GAP_MS: u64 = 150;
const VOLUME: f32 = 0.25;

/// Loops the configured tone pattern from `begin_alert` until `end_alert`.
///
/// The output stream is opened lazily so a machine without audio only fails when an alert fires.
pub struct AudioAlertSink {
    sound: AlertSound,
    stream: Option<OutputStream>,
    sink: Option<Sink>,
}

impl AudioAlertSink {
    pub fn new(sound: AlertSound) -> Self {
        Self {
            sound,
            stream: None,
            sink: None,
        }
    }

    fn ensure_stream(&mut self) -> Result<&OutputStream, AlertSinkError> {
        if self.stream.is_none() {
            let stream = OutputStreamBuilder::open_default_stream()
                .map_err(|e| AlertSinkError::Audio(e.to_string()))?;
            self.stream = Some(stream);
        }
        self.stream
            .as_ref()
            .ok_or_else(|| AlertSinkError::Audio("no output stream".to_string()))
    }
}

impl AlertSink for AudioAlertSink {
    fn name(&self) -> &str {
        "audio"
    }

    fn begin_alert(&mut self, _ctx: &AlertContext) -> Result<(), AlertSinkError> {
        if !self.sound.is_audible() {
            return Ok(());
        }
        // Already playing
        if self.sink.as_ref().is_some_and(|s| !s.empty()) {
            return Ok(());
        }

        let tones = self.sound.tones();
        let stream = self.ensure_stream()?;
        let sink = Sink::connect_new(stream.mixer());
        let pattern = rodio::source::from_iter(tones.iter().map(|freq| {
            SineWave::new(*freq)
                .take_duration(Duration::from_millis(TONE_MS))
                .amplify(VOLUME)
                .delay(Duration::from_millis(GAP_MS))
        }));
        sink.append(pattern.repeat_infinite());
        debug!("Playing {:?} alarm", self.sound);
        self.sink = Some(sink);
        Ok(())
    }

    fn end_alert(&mut self) -> Result<(), AlertSinkError> {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        Ok(())
    }
}
