//! Synthetic journey that converges on the destination, for exercising alerts without moving.

use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{FixSubscriber, PositionSource, Subscription};
use crate::core::geo::distance;
use crate::core::model::{Coordinate, Destination, GeoFix};

/// Simulation tuning - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Period between synthetic fixes
    pub tick_millis: u64,
    /// The journey goes quiet once closer than this
    pub stop_epsilon_m: f64,
    /// Starting offset from the destination, applied to both latitude and longitude
    pub start_offset_deg: f64,
    /// Fraction of the remaining gap closed on each tick
    pub convergence: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_millis: 1000,
            stop_epsilon_m: 5.0,
            start_offset_deg: 0.005,
            convergence: 0.1,
        }
    }
}

/// Deterministic position model: each step closes a fixed fraction of the gap to the destination.
#[derive(Debug, Clone)]
pub struct SimulatedJourney {
    destination: Coordinate,
    current: Coordinate,
    convergence: f64,
    stop_epsilon_m: f64,
    ticks: u32,
    finished: bool,
}

impl SimulatedJourney {
    pub fn new(destination: Coordinate, settings: &SimulationSettings) -> Self {
        Self {
            destination,
            current: destination.offset(settings.start_offset_deg, settings.start_offset_deg),
            convergence: settings.convergence,
            stop_epsilon_m: settings.stop_epsilon_m,
            ticks: 0,
            finished: false,
        }
    }

    pub fn position(&self) -> Coordinate {
        self.current
    }

    pub fn distance_remaining(&self) -> f64 {
        distance(self.current, self.destination)
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advance one tick and return the new position, or `None` once the journey has ended.
    ///
    /// The step that lands inside the stop epsilon is still returned; the journey ends after it.
    pub fn step(&mut self) -> Option<Coordinate> {
        if self.finished {
            return None;
        }

        self.current.latitude -= (self.current.latitude - self.destination.latitude) * self.convergence;
        self.current.longitude -= (self.current.longitude - self.destination.longitude) * self.convergence;
        self.ticks += 1;

        if self.distance_remaining() < self.stop_epsilon_m {
            self.finished = true;
        }
        Some(self.current)
    }
}

impl Iterator for SimulatedJourney {
    type Item = Coordinate;

    fn next(&mut self) -> Option<Coordinate> {
        self.step()
    }
}

/// Timer-driven source emitting one [`SimulatedJourney`] step per tick.
pub struct SimulatedSource {
    journey: SimulatedJourney,
    tick: Duration,
}

impl SimulatedSource {
    pub fn new(destination: &Destination, settings: &SimulationSettings) -> Self {
        Self {
            journey: SimulatedJourney::new(destination.coordinate, settings),
            tick: Duration::from_millis(settings.tick_millis.max(1)),
        }
    }
}

impl PositionSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulation"
    }

    fn subscribe(self: Box<Self>, subscriber: FixSubscriber) -> Subscription {
        let task = tokio::spawn(drive(self.journey, self.tick, subscriber.clone()));
        subscriber.subscription(Some(task))
    }
}

async fn drive(mut journey: SimulatedJourney, tick: Duration, subscriber: FixSubscriber) {
    // First fix one period after start, like a plain interval timer
    let mut interval = time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Simulated journey for session {} starting {:.0} m from destination",
        subscriber.session(),
        journey.distance_remaining()
    );

    loop {
        interval.tick().await;

        let Some(coordinate) = journey.step() else {
            break;
        };
        if !subscriber.fix(GeoFix::now(coordinate)) {
            debug!("Simulated journey for session {} cancelled", subscriber.session());
            return;
        }
        if journey.is_finished() {
            info!(
                "Simulated journey arrived within {:.1} m after {} ticks",
                journey.distance_remaining(),
                journey.ticks()
            );
            break;
        }
    }
}
