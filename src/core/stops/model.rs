//! Data model for recently used stops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::model::Destination;

/// How many stops the recent list keeps.
pub const MAX_RECENT_STOPS: usize = 5;

/// A destination the user picked before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentStop {
    pub destination: Destination,
    /// When it was first picked
    pub saved_at: DateTime<Utc>,
}

/// Bounded, most-recent-first list of past destinations, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentStops {
    stops: Vec<RecentStop>,
}

impl RecentStops {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a destination. A name already in the list keeps its place and is not added again.
    ///
    /// Returns true if the list changed.
    pub fn record(&mut self, destination: Destination, saved_at: DateTime<Utc>) -> bool {
        if self.contains(&destination.name) {
            return false;
        }
        self.stops.insert(
            0,
            RecentStop {
                destination,
                saved_at,
            },
        );
        self.stops.truncate(MAX_RECENT_STOPS);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stops.iter().any(|s| s.destination.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&RecentStop> {
        self.stops.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecentStop> {
        self.stops.iter()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Restore the list invariants after loading data written by someone else.
    pub(crate) fn normalize(&mut self) {
        let mut seen = Vec::new();
        self.stops.retain(|s| {
            if seen.contains(&s.destination.name) {
                false
            } else {
                seen.push(s.destination.name.clone());
                true
            }
        });
        self.stops.truncate(MAX_RECENT_STOPS);
    }
}
