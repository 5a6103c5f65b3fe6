//! Persistent storage for the active destination and recent stops.
//!
//! Stores both as JSON files in the app data directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::warn;
use serde::de::DeserializeOwned;

use super::model::RecentStops;
use crate::core::error::StoreError;
use crate::core::model::Destination;

const DESTINATION_FILE: &str = "destination.json";
const RECENT_FILE: &str = "recent_stops.json";

/// Narrow get/set interface over wherever destinations are kept.
pub trait DestinationStore {
    fn destination(&self) -> Option<&Destination>;

    /// Make `destination` the active one and remember it in the recent list.
    fn set_destination(&mut self, destination: Destination) -> Result<(), StoreError>;

    fn recent_stops(&self) -> &RecentStops;

    /// Make a recent stop the active destination. Returns `None` for an unknown index.
    fn select_recent(&mut self, index: usize) -> Result<Option<Destination>, StoreError> {
        let Some(stop) = self.recent_stops().get(index) else {
            return Ok(None);
        };
        let destination = stop.destination.clone();
        self.set_destination(destination.clone())?;
        Ok(Some(destination))
    }
}

/// Keeps everything in memory. Used when nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemoryDestinationStore {
    destination: Option<Destination>,
    recent: RecentStops,
}

impl MemoryDestinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DestinationStore for MemoryDestinationStore {
    fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    fn set_destination(&mut self, destination: Destination) -> Result<(), StoreError> {
        self.recent.record(destination.clone(), Utc::now());
        self.destination = Some(destination);
        Ok(())
    }

    fn recent_stops(&self) -> &RecentStops {
        &self.recent
    }
}

/// JSON files under a data directory, written on every change.
pub struct JsonDestinationStore {
    /// Directory holding destination.json and recent_stops.json
    data_dir: PathBuf,
    destination: Option<Destination>,
    recent: RecentStops,
}

impl JsonDestinationStore {
    /// Open the store, loading whatever is on disk.
    ///
    /// Missing or corrupt files load as empty; only real I/O failures are errors.
    pub fn open(data_dir: PathBuf) -> Result<Self, StoreError> {
        let destination = read_json::<Destination>(&data_dir.join(DESTINATION_FILE))?;
        let mut recent = read_json::<RecentStops>(&data_dir.join(RECENT_FILE))?.unwrap_or_default();
        recent.normalize();

        Ok(Self {
            data_dir,
            destination,
            recent,
        })
    }

    fn save(&self) -> Result<(), StoreError> {
        // Ensure directory exists
        fs::create_dir_all(&self.data_dir)?;

        if let Some(destination) = &self.destination {
            let content = serde_json::to_string_pretty(destination)?;
            fs::write(self.data_dir.join(DESTINATION_FILE), content)?;
        }
        let content = serde_json::to_string_pretty(&self.recent)?;
        fs::write(self.data_dir.join(RECENT_FILE), content)?;
        Ok(())
    }
}

impl DestinationStore for JsonDestinationStore {
    fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    fn set_destination(&mut self, destination: Destination) -> Result<(), StoreError> {
        self.recent.record(destination.clone(), Utc::now());
        self.destination = Some(destination);
        self.save()
    }

    fn recent_stops(&self) -> &RecentStops {
        &self.recent
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            Ok(None)
        }
    }
}
