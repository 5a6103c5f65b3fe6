//! Fire-and-forget display of the tracked position.

use log::info;

use super::model::{Coordinate, Destination};

/// Receives position updates for display. Nothing is ever read back.
pub trait MapView {
    /// A new destination became active.
    fn show_destination(&mut self, _destination: &Destination) {}

    /// Current position and, when a destination is set, the distance to it.
    fn show_position(&mut self, coordinate: Coordinate, distance_m: Option<f64>);
}

/// Renders updates as log lines.
#[derive(Debug, Default)]
pub struct LogMapView;

impl MapView for LogMapView {
    fn show_destination(&mut self, destination: &Destination) {
        info!("Destination: {} ({})", destination.name, destination.coordinate);
    }

    fn show_position(&mut self, coordinate: Coordinate, distance_m: Option<f64>) {
        match distance_m {
            Some(d) => info!("{}  {}", coordinate, format_distance(d)),
            None => info!("{}", coordinate),
        }
    }
}

/// Whole meters, as shown next to the current coordinate.
pub fn format_distance(distance_m: f64) -> String {
    format!("{} m", distance_m.round() as i64)
}
