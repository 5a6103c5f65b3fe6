// Alert model types for configuration and episode context.

use serde::{Deserialize, Serialize};

/// Sound options for the arrival alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AlertSound {
    #[default]
    Chime,
    Siren,
    None,
}

impl AlertSound {
    /// Tone frequencies in Hz, played in sequence and looped
    pub fn tones(&self) -> &'static [f32] {
        match self {
            Self::Chime => &[880.0],
            Self::Siren => &[660.0, 990.0],
            Self::None => &[],
        }
    }

    pub fn is_audible(&self) -> bool {
        !self.tones().is_empty()
    }
}

/// Which alert channels fire on arrival
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub sound: AlertSound,
    /// Alternating on/off durations in milliseconds
    pub vibration_pattern_ms: Vec<u64>,
    /// Flash the screen / show the arrival banner
    pub visual: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            sound: AlertSound::Chime,
            vibration_pattern_ms: vec![500, 200, 500, 200, 500],
            visual: true,
        }
    }
}

/// What the sinks are told when an alert episode begins
#[derive(Debug, Clone, PartialEq)]
pub struct AlertContext {
    pub destination_name: String,
    pub distance_m: f64,
    pub alert_radius_m: f64,
}

impl AlertContext {
    pub fn message(&self) -> String {
        format!(
            "Wake up! Your stop is arriving! {} is {:.0} m away",
            self.destination_name, self.distance_m
        )
    }
}
