// Tracking controller - owns the session and drives the Idle / Armed / Alerting state machine.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::session::{Phase, TrackingSession, TrackingState};
use crate::core::alerts::{AlertContext, AlertSink};
use crate::core::error::{SourceError, TrackingError};
use crate::core::geo::distance;
use crate::core::map_view::MapView;
use crate::core::model::{Destination, GeoFix};
use crate::core::source::{
    FixSubscriber, PositionSource, SessionId, SourceEvent, SourceMessage, SourceReceiver, SourceSender,
};

/// Everything needed to arm a new session.
pub struct StartRequest {
    pub destination: Option<Destination>,
    pub alert_radius_m: f64,
    pub source: Box<dyn PositionSource>,
}

/// Why a fix or source error was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No session is active
    Idle,
    /// Produced for a session that has since been stopped
    StaleSession,
}

/// Result of feeding one fix to the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixOutcome {
    Ignored(IgnoreReason),
    /// Still outside the radius
    Armed { distance_m: f64 },
    /// This fix entered the radius and started the alert episode
    AlertTriggered { distance_m: f64 },
    /// Episode already running; the fix only updates the display
    Alerting { distance_m: f64 },
}

/// Status reported back to the caller for each source message.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Fix(FixOutcome),
    /// The source failed to produce a fix. The session keeps its state.
    SourceError {
        error: SourceError,
        last_fix_age: Option<Duration>,
    },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started(SessionId),
    Stopped,
}

/// Owns the single tracking session.
///
/// Not re-entrant: fixes are handled one at a time on the caller's thread, in arrival order.
/// Starting while a session is active fails with [`TrackingError::SessionAlreadyActive`];
/// use [`TrackingController::toggle`] or stop first.
pub struct TrackingController {
    alert_sink: Box<dyn AlertSink>,
    map_view: Box<dyn MapView>,
    tx: SourceSender,
    session: Option<TrackingSession>,
    next_session: u64,
}

impl TrackingController {
    /// Create a controller and the receiving end of the channel its sources report on.
    pub fn new(alert_sink: Box<dyn AlertSink>, map_view: Box<dyn MapView>) -> (Self, SourceReceiver) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let controller = Self {
            alert_sink,
            map_view,
            tx,
            session: None,
            next_session: 1,
        };
        (controller, rx)
    }

    pub fn state(&self) -> TrackingState {
        self.session
            .as_ref()
            .map_or(TrackingState::Idle, TrackingSession::state)
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    /// Idle -> Armed. Subscribes to the request's source.
    pub fn start(&mut self, request: StartRequest) -> Result<SessionId, TrackingError> {
        if self.session.is_some() {
            return Err(TrackingError::SessionAlreadyActive);
        }
        let destination = request
            .destination
            .ok_or_else(|| TrackingError::InvalidConfiguration("no destination selected".to_string()))?;
        if !destination.coordinate.is_valid() {
            return Err(TrackingError::InvalidConfiguration(format!(
                "destination {} is out of range",
                destination.coordinate
            )));
        }
        validate_radius(request.alert_radius_m)?;

        let id = SessionId(self.next_session);
        self.next_session += 1;

        let mut source = request.source;
        let source_name = source.name().to_string();
        let initial_fix = source.initial_fix();
        let subscription = source.subscribe(FixSubscriber::new(id, self.tx.clone()));

        info!(
            "Tracking session {} armed: {} within {:.0} m via {}",
            id, destination.name, request.alert_radius_m, source_name
        );
        self.map_view.show_destination(&destination);
        self.session = Some(TrackingSession {
            id,
            phase: Phase::Armed,
            destination,
            alert_radius_m: request.alert_radius_m,
            source_name,
            subscription,
            last_fix: None,
            last_distance_m: None,
            alert_acknowledged: false,
            started_at: Instant::now(),
        });

        if let Some(fix) = initial_fix {
            self.on_fix(id, fix);
        }
        Ok(id)
    }

    /// Armed/Alerting -> Idle. Cancels the source and ends any alert. Returns false when already idle.
    pub fn stop(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };

        session.subscription.cancel();
        if let Err(e) = self.alert_sink.end_alert() {
            warn!("Alert sink {} failed to end alert: {}", self.alert_sink.name(), e);
        }
        info!("Tracking session {} stopped ({:?})", session.id, session.state());
        true
    }

    /// Start when idle, stop otherwise. `make_request` is only called when starting.
    pub fn toggle<F>(&mut self, make_request: F) -> Result<ToggleOutcome, TrackingError>
    where
        F: FnOnce() -> StartRequest,
    {
        if self.session.is_some() {
            self.stop();
            Ok(ToggleOutcome::Stopped)
        } else {
            self.start(make_request()).map(ToggleOutcome::Started)
        }
    }

    /// Route one message from a source.
    pub fn handle(&mut self, message: SourceMessage) -> StatusUpdate {
        match message.event {
            SourceEvent::Fix(fix) => StatusUpdate::Fix(self.on_fix(message.session, fix)),
            SourceEvent::Error(error) => self.on_source_error(message.session, error),
        }
    }

    pub fn on_fix(&mut self, session_id: SessionId, fix: GeoFix) -> FixOutcome {
        let session = match active_session(&mut self.session, session_id) {
            Ok(session) => session,
            Err(reason) => return FixOutcome::Ignored(reason),
        };

        let d = distance(fix.coordinate, session.destination.coordinate);
        session.last_fix = Some(fix);
        session.last_distance_m = Some(d);
        debug!("Session {}: {:.1} m to {}", session.id, d, session.destination.name);

        let outcome = match session.phase {
            Phase::Alerting => FixOutcome::Alerting { distance_m: d },
            Phase::Armed if d <= session.alert_radius_m => {
                session.phase = Phase::Alerting;
                session.alert_acknowledged = false;
                info!(
                    "Session {}: {} within {:.0} m ({:.0} m away), alerting",
                    session.id, session.destination.name, session.alert_radius_m, d
                );
                let ctx = AlertContext {
                    destination_name: session.destination.name.clone(),
                    distance_m: d,
                    alert_radius_m: session.alert_radius_m,
                };
                if let Err(e) = self.alert_sink.begin_alert(&ctx) {
                    warn!("Alert sink {} failed to begin alert: {}", self.alert_sink.name(), e);
                }
                FixOutcome::AlertTriggered { distance_m: d }
            }
            Phase::Armed => FixOutcome::Armed { distance_m: d },
        };

        self.map_view.show_position(fix.coordinate, Some(d));
        outcome
    }

    /// Surface a source failure. Never changes the session state.
    pub fn on_source_error(&mut self, session_id: SessionId, error: SourceError) -> StatusUpdate {
        let session = match active_session(&mut self.session, session_id) {
            Ok(session) => session,
            Err(reason) => return StatusUpdate::Ignored(reason),
        };

        let last_fix_age = session.fix_age(Instant::now());
        warn!("Session {}: position source {} failed: {}", session.id, session.source_name, error);
        StatusUpdate::SourceError { error, last_fix_age }
    }

    /// Change the radius of the active session; applies from the next fix on.
    pub fn set_alert_radius(&mut self, radius_m: f64) -> Result<(), TrackingError> {
        validate_radius(radius_m)?;
        if let Some(session) = self.session.as_mut() {
            info!("Session {}: alert radius {:.0} m -> {:.0} m", session.id, session.alert_radius_m, radius_m);
            session.alert_radius_m = radius_m;
        }
        Ok(())
    }

    /// Mark the running alert as seen. Returns false when there is no alert to acknowledge.
    pub fn acknowledge_alert(&mut self) -> bool {
        match self.session.as_mut() {
            Some(session) if session.phase == Phase::Alerting => {
                session.alert_acknowledged = true;
                true
            }
            _ => false,
        }
    }

    pub fn fix_age(&self, now: Instant) -> Option<Duration> {
        self.session.as_ref().and_then(|s| s.fix_age(now))
    }

    /// True when a session is active and has gone `max_age` without a fix.
    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.is_stale(now, max_age))
    }
}

/// Turns the per-tick staleness check into one report per stale period.
#[derive(Debug, Default)]
pub struct StaleReporter {
    reported: bool,
}

impl StaleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current staleness. Returns true only on the first stale observation of a period;
    /// a fresh observation ends the period.
    pub fn observe(&mut self, stale: bool) -> bool {
        let report = stale && !self.reported;
        self.reported = stale;
        report
    }
}

fn active_session(
    slot: &mut Option<TrackingSession>,
    session_id: SessionId,
) -> Result<&mut TrackingSession, IgnoreReason> {
    match slot.as_mut() {
        None => {
            debug!("Ignoring message for session {} while idle", session_id);
            Err(IgnoreReason::Idle)
        }
        Some(session) if session.id != session_id => {
            debug!("Ignoring late message from session {} (active {})", session_id, session.id);
            Err(IgnoreReason::StaleSession)
        }
        Some(session) => Ok(session),
    }
}

fn validate_radius(radius_m: f64) -> Result<(), TrackingError> {
    if radius_m.is_finite() && radius_m > 0.0 {
        Ok(())
    } else {
        Err(TrackingError::InvalidConfiguration(format!(
            "alert radius must be positive, got {radius_m}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::core::alerts::sink::testing::{RecordingSink, SinkLog};
    use crate::core::map_view::testing::RecordingMapView;
    use crate::core::model::Coordinate;
    use crate::core::source::testing::ManualSource;

    const DEST: Coordinate = Coordinate {
        latitude: 0.0,
        longitude: 0.0,
    };

    fn destination() -> Destination {
        Destination::new("Terminus, Line 4", DEST)
    }

    /// A fix roughly `meters` north of the destination.
    fn fix_at(meters: f64) -> GeoFix {
        let deg = meters / 111_194.93;
        GeoFix::now(Coordinate::new(deg, 0.0))
    }

    fn controller() -> (TrackingController, Arc<Mutex<SinkLog>>) {
        let (sink, log) = RecordingSink::new();
        let (controller, _rx) = TrackingController::new(Box::new(sink), Box::new(RecordingMapView::new().0));
        (controller, log)
    }

    fn request(radius: f64) -> StartRequest {
        StartRequest {
            destination: Some(destination()),
            alert_radius_m: radius,
            source: Box::new(ManualSource::new().0),
        }
    }

    #[test]
    fn test_start_arms_session() {
        let (mut ctl, _) = controller();
        assert_eq!(ctl.state(), TrackingState::Idle);

        let id = ctl.start(request(50.0)).unwrap();
        let session = ctl.session().unwrap();
        assert_eq!(ctl.state(), TrackingState::Armed);
        assert_eq!(session.id(), id);
        assert_eq!(session.source_name(), "manual");
        assert_eq!(session.last_fix(), None);
        assert!(!session.alert_acknowledged());
    }

    #[test]
    fn test_start_rejects_missing_destination() {
        let (mut ctl, _) = controller();
        let mut req = request(50.0);
        req.destination = None;
        assert!(matches!(ctl.start(req), Err(TrackingError::InvalidConfiguration(_))));
        assert_eq!(ctl.state(), TrackingState::Idle);
    }

    #[test]
    fn test_start_rejects_non_positive_radius() {
        let (mut ctl, _) = controller();
        assert!(matches!(ctl.start(request(0.0)), Err(TrackingError::InvalidConfiguration(_))));
        assert!(matches!(ctl.start(request(-5.0)), Err(TrackingError::InvalidConfiguration(_))));
        assert!(matches!(ctl.start(request(f64::NAN)), Err(TrackingError::InvalidConfiguration(_))));
        assert_eq!(ctl.state(), TrackingState::Idle);
    }

    #[test]
    fn test_start_while_active_fails() {
        let (mut ctl, _) = controller();
        ctl.start(request(50.0)).unwrap();
        assert_eq!(ctl.start(request(50.0)), Err(TrackingError::SessionAlreadyActive));
        assert_eq!(ctl.state(), TrackingState::Armed);
    }

    #[test]
    fn test_alert_fires_once_per_episode() {
        let (mut ctl, log) = controller();
        let id = ctl.start(request(50.0)).unwrap();

        let outcome = ctl.on_fix(id, fix_at(60.0));
        assert!(matches!(outcome, FixOutcome::Armed { distance_m } if (distance_m - 60.0).abs() < 0.5));
        assert_eq!(ctl.state(), TrackingState::Armed);
        assert!(log.lock().unwrap().begins.is_empty());

        let outcome = ctl.on_fix(id, fix_at(40.0));
        assert!(matches!(outcome, FixOutcome::AlertTriggered { .. }));
        assert_eq!(ctl.state(), TrackingState::Alerting);
        assert_eq!(log.lock().unwrap().begins.len(), 1);
        assert_eq!(log.lock().unwrap().begins[0].destination_name, "Terminus, Line 4");

        let outcome = ctl.on_fix(id, fix_at(10.0));
        assert!(matches!(outcome, FixOutcome::Alerting { .. }));
        assert_eq!(log.lock().unwrap().begins.len(), 1);
        assert!((ctl.session().unwrap().last_distance_m().unwrap() - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_radius_boundary_is_inclusive() {
        let (mut ctl, _) = controller();
        let id = ctl.start(request(50.0)).unwrap();
        let exact = GeoFix::now(DEST);
        let d = distance(fix_at(50.0).coordinate, DEST);
        ctl.set_alert_radius(d).unwrap();
        assert!(matches!(ctl.on_fix(id, fix_at(50.0)), FixOutcome::AlertTriggered { .. }));
        assert!(matches!(ctl.on_fix(id, exact), FixOutcome::Alerting { distance_m } if distance_m == 0.0));
    }

    #[test]
    fn test_no_rearm_after_leaving_radius() {
        let (mut ctl, log) = controller();
        let id = ctl.start(request(50.0)).unwrap();
        ctl.on_fix(id, fix_at(20.0));
        let outcome = ctl.on_fix(id, fix_at(300.0));
        assert!(matches!(outcome, FixOutcome::Alerting { .. }));
        ctl.on_fix(id, fix_at(20.0));
        assert_eq!(ctl.state(), TrackingState::Alerting);
        assert_eq!(log.lock().unwrap().begins.len(), 1);
    }

    #[test]
    fn test_stop_ends_alert_and_ignores_late_fix() {
        let (mut ctl, log) = controller();
        let id = ctl.start(request(50.0)).unwrap();
        ctl.on_fix(id, fix_at(40.0));

        assert!(ctl.stop());
        assert_eq!(ctl.state(), TrackingState::Idle);
        assert_eq!(log.lock().unwrap().ends, 1);

        // Late fix from the cancelled source
        assert_eq!(ctl.on_fix(id, fix_at(10.0)), FixOutcome::Ignored(IgnoreReason::Idle));
        assert_eq!(log.lock().unwrap().begins.len(), 1);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (mut ctl, log) = controller();
        assert!(!ctl.stop());
        assert_eq!(log.lock().unwrap().ends, 0);
    }

    #[test]
    fn test_fix_from_previous_session_is_ignored() {
        let (mut ctl, log) = controller();
        let old = ctl.start(request(50.0)).unwrap();
        ctl.stop();
        let new = ctl.start(request(50.0)).unwrap();
        assert_ne!(old, new);

        assert_eq!(ctl.on_fix(old, fix_at(10.0)), FixOutcome::Ignored(IgnoreReason::StaleSession));
        assert_eq!(ctl.state(), TrackingState::Armed);
        assert!(log.lock().unwrap().begins.is_empty());
    }

    #[test]
    fn test_stop_cancels_source_subscription() {
        let (sink, _log) = RecordingSink::new();
        let (mut ctl, mut rx) = TrackingController::new(Box::new(sink), Box::new(RecordingMapView::new().0));
        let (source, slot) = ManualSource::new();
        let id = ctl
            .start(StartRequest {
                destination: Some(destination()),
                alert_radius_m: 50.0,
                source: Box::new(source),
            })
            .unwrap();

        let subscriber = slot.lock().unwrap().clone().unwrap();
        assert_eq!(subscriber.session(), id);
        assert!(subscriber.fix(fix_at(100.0)));
        let status = ctl.handle(rx.try_recv().unwrap());
        assert!(matches!(status, StatusUpdate::Fix(FixOutcome::Armed { .. })));

        ctl.stop();
        assert!(subscriber.is_cancelled());
        assert!(!subscriber.fix(fix_at(10.0)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_source_error_keeps_state() {
        let (mut ctl, _) = controller();
        let id = ctl.start(request(50.0)).unwrap();
        ctl.on_fix(id, fix_at(30.0));

        let status = ctl.on_source_error(id, SourceError::PermissionDenied);
        match status {
            StatusUpdate::SourceError { error, last_fix_age } => {
                assert_eq!(error, SourceError::PermissionDenied);
                assert!(last_fix_age.is_some());
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(ctl.state(), TrackingState::Alerting);
    }

    #[test]
    fn test_source_error_while_idle_is_ignored() {
        let (mut ctl, _) = controller();
        let status = ctl.on_source_error(SessionId(9), SourceError::Timeout(Duration::from_secs(5)));
        assert_eq!(status, StatusUpdate::Ignored(IgnoreReason::Idle));
    }

    #[test]
    fn test_sink_failure_is_not_fatal() {
        let (sink, log) = RecordingSink::failing();
        let (mut ctl, _rx) = TrackingController::new(Box::new(sink), Box::new(RecordingMapView::new().0));
        let id = ctl.start(request(50.0)).unwrap();

        assert!(matches!(ctl.on_fix(id, fix_at(5.0)), FixOutcome::AlertTriggered { .. }));
        assert_eq!(ctl.state(), TrackingState::Alerting);
        assert!(ctl.stop());
        assert_eq!(log.lock().unwrap().ends, 1);
    }

    #[test]
    fn test_radius_change_applies_on_next_fix() {
        let (mut ctl, log) = controller();
        let id = ctl.start(request(50.0)).unwrap();
        ctl.on_fix(id, fix_at(80.0));
        assert_eq!(ctl.state(), TrackingState::Armed);

        ctl.set_alert_radius(100.0).unwrap();
        // Not retroactive
        assert_eq!(ctl.state(), TrackingState::Armed);
        assert!(log.lock().unwrap().begins.is_empty());

        assert!(matches!(ctl.on_fix(id, fix_at(80.0)), FixOutcome::AlertTriggered { .. }));
        assert!(ctl.set_alert_radius(0.0).is_err());
        assert_eq!(ctl.session().unwrap().alert_radius_m(), 100.0);
    }

    #[test]
    fn test_acknowledge_only_while_alerting() {
        let (mut ctl, _) = controller();
        assert!(!ctl.acknowledge_alert());
        let id = ctl.start(request(50.0)).unwrap();
        assert!(!ctl.acknowledge_alert());

        ctl.on_fix(id, fix_at(10.0));
        assert!(ctl.acknowledge_alert());
        assert!(ctl.session().unwrap().alert_acknowledged());
    }

    #[test]
    fn test_initial_fix_is_evaluated_on_start() {
        let (mut ctl, log) = controller();
        let (mut source, _slot) = ManualSource::new();
        source.initial = Some(fix_at(10.0));

        ctl.start(StartRequest {
            destination: Some(destination()),
            alert_radius_m: 50.0,
            source: Box::new(source),
        })
        .unwrap();

        assert_eq!(ctl.state(), TrackingState::Alerting);
        assert_eq!(log.lock().unwrap().begins.len(), 1);
    }

    #[test]
    fn test_toggle_starts_then_stops() {
        let (mut ctl, log) = controller();
        let outcome = ctl.toggle(|| request(50.0)).unwrap();
        assert!(matches!(outcome, ToggleOutcome::Started(_)));
        assert_eq!(ctl.state(), TrackingState::Armed);

        let outcome = ctl.toggle(|| panic!("must not build a request when stopping")).unwrap();
        assert_eq!(outcome, ToggleOutcome::Stopped);
        assert_eq!(ctl.state(), TrackingState::Idle);
        assert_eq!(log.lock().unwrap().ends, 1);
    }

    #[test]
    fn test_map_view_sees_every_processed_fix() {
        let (sink, _log) = RecordingSink::new();
        let (view, positions) = RecordingMapView::new();
        let (mut ctl, _rx) = TrackingController::new(Box::new(sink), Box::new(view));
        let id = ctl.start(request(50.0)).unwrap();

        ctl.on_fix(id, fix_at(200.0));
        ctl.on_fix(id, fix_at(20.0));
        ctl.on_fix(id, fix_at(10.0));
        ctl.stop();
        ctl.on_fix(id, fix_at(5.0));

        let positions = positions.lock().unwrap();
        assert_eq!(positions.len(), 3);
        assert!(positions.iter().all(|(_, d)| d.is_some()));
    }

    #[test]
    fn test_stale_reporter_warns_once_per_period() {
        let (mut ctl, _) = controller();
        let mut reporter = StaleReporter::new();
        let max_age = Duration::from_secs(15);
        let id = ctl.start(request(50.0)).unwrap();

        let base = Instant::now();
        assert!(!reporter.observe(ctl.is_stale(base, max_age)));

        // No fix yet: first stale tick reports, the following ones stay quiet
        assert!(reporter.observe(ctl.is_stale(base + Duration::from_secs(20), max_age)));
        assert!(!reporter.observe(ctl.is_stale(base + Duration::from_secs(21), max_age)));
        assert!(!reporter.observe(ctl.is_stale(base + Duration::from_secs(22), max_age)));

        // A fresh fix ends the period
        ctl.on_fix(id, fix_at(500.0));
        let fixed = Instant::now();
        assert!(!reporter.observe(ctl.is_stale(fixed + Duration::from_secs(1), max_age)));

        // Going quiet again reports again, once
        assert!(reporter.observe(ctl.is_stale(fixed + Duration::from_secs(30), max_age)));
        assert!(!reporter.observe(ctl.is_stale(fixed + Duration::from_secs(31), max_age)));
    }

    #[test]
    fn test_staleness_before_and_after_fix() {
        let (mut ctl, _) = controller();
        let now = Instant::now();
        assert!(!ctl.is_stale(now, Duration::from_secs(1)));

        let id = ctl.start(request(50.0)).unwrap();
        let later = Instant::now() + Duration::from_secs(30);
        assert!(ctl.is_stale(later, Duration::from_secs(15)));
        assert_eq!(ctl.fix_age(later), None);

        ctl.on_fix(id, fix_at(500.0));
        let soon = Instant::now() + Duration::from_secs(2);
        assert!(!ctl.is_stale(soon, Duration::from_secs(15)));
        assert!(ctl.fix_age(soon).unwrap() >= Duration::from_secs(2));
    }
}
