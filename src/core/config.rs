use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use super::alerts::AlertSettings;
use super::source::feed::LiveFeedSettings;
use super::source::simulated::SimulationSettings;

/// Default alert radius in meters.
pub const DEFAULT_ALERT_RADIUS_M: u32 = 50;

/// Application settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Alert when the destination is this close
    pub alert_radius_m: u32,
    pub simulation: SimulationSettings,
    pub live_feed: LiveFeedSettings,
    pub alerts: AlertSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alert_radius_m: DEFAULT_ALERT_RADIUS_M,
            simulation: SimulationSettings::default(),
            live_feed: LiveFeedSettings::default(),
            alerts: AlertSettings::default(),
        }
    }
}

/// Loads and saves settings.json in the app config directory.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Platform config directory for this app, falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stop-watcher")
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => warn!("Ignoring invalid {}: {}", self.config_path.display(), e),
                },
                Err(e) => warn!("Could not read {}: {}", self.config_path.display(), e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
