use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::model::{Destination, GeoFix};
use crate::core::source::{SessionId, Subscription};

/// Externally visible tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingState {
    /// No active session
    Idle,
    /// Comparing distance to the destination, not yet within the alert radius
    Armed,
    /// Within the alert radius; the alert episode runs until stopped
    Alerting,
}

/// Phase of a live session. A session is never idle; idle means no session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Armed,
    Alerting,
}

/// The single active tracking session, owned by the controller.
#[derive(Debug)]
pub struct TrackingSession {
    pub(crate) id: SessionId,
    pub(crate) phase: Phase,
    pub(crate) destination: Destination,
    pub(crate) alert_radius_m: f64,
    pub(crate) source_name: String,
    pub(crate) subscription: Subscription,
    pub(crate) last_fix: Option<GeoFix>,
    pub(crate) last_distance_m: Option<f64>,
    pub(crate) alert_acknowledged: bool,
    pub(crate) started_at: Instant,
}

impl TrackingSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> TrackingState {
        match self.phase {
            Phase::Armed => TrackingState::Armed,
            Phase::Alerting => TrackingState::Alerting,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn alert_radius_m(&self) -> f64 {
        self.alert_radius_m
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn last_fix(&self) -> Option<&GeoFix> {
        self.last_fix.as_ref()
    }

    pub fn last_distance_m(&self) -> Option<f64> {
        self.last_distance_m
    }

    pub fn alert_acknowledged(&self) -> bool {
        self.alert_acknowledged
    }

    /// Time since the last fix, `None` before the first one.
    pub fn fix_age(&self, now: Instant) -> Option<Duration> {
        self.last_fix
            .map(|fix| now.saturating_duration_since(fix.timestamp))
    }

    /// True when no fix arrived for `max_age`, counting from session start before the first fix.
    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        let age = self
            .fix_age(now)
            .unwrap_or_else(|| now.saturating_duration_since(self.started_at));
        age > max_age
    }
}
