// Position sources feed fixes into the tracking controller.
//
// Architecture:
// - mod.rs: subscription plumbing shared by every source
// - simulated.rs: synthetic journey converging on the destination
// - feed.rs: live fixes read line by line from a text stream

pub mod feed;
pub mod simulated;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::SourceError;
use super::model::GeoFix;

/// Identifies one tracking session. Messages tagged with an older id are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a source reports: a position or a failure to get one.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Fix(GeoFix),
    Error(SourceError),
}

/// A source event tagged with the session it was produced for.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMessage {
    pub session: SessionId,
    pub event: SourceEvent,
}

pub type SourceSender = mpsc::UnboundedSender<SourceMessage>;
pub type SourceReceiver = mpsc::UnboundedReceiver<SourceMessage>;

/// Delivery end handed to a source when it is subscribed.
#[derive(Debug, Clone)]
pub struct FixSubscriber {
    session: SessionId,
    tx: SourceSender,
    cancelled: Arc<AtomicBool>,
}

impl FixSubscriber {
    pub(crate) fn new(session: SessionId, tx: SourceSender) -> Self {
        Self {
            session,
            tx,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// True once the subscription was cancelled or the controller went away.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Deliver a fix. Returns false when nobody is listening anymore and the source should stop.
    pub fn fix(&self, fix: GeoFix) -> bool {
        self.send(SourceEvent::Fix(fix))
    }

    /// Report a failure to produce a fix. Same return contract as [`FixSubscriber::fix`].
    pub fn error(&self, error: SourceError) -> bool {
        self.send(SourceEvent::Error(error))
    }

    fn send(&self, event: SourceEvent) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.tx
            .send(SourceMessage {
                session: self.session,
                event,
            })
            .is_ok()
    }

    /// Build the cancellation handle for this subscriber, optionally owning the task that drives it.
    pub fn subscription(&self, task: Option<JoinHandle<()>>) -> Subscription {
        Subscription {
            cancelled: Arc::clone(&self.cancelled),
            task,
        }
    }
}

/// Cancellation handle of an active subscription. Dropping it cancels as well.
#[derive(Debug)]
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivery. After this returns the subscriber refuses to send anything.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Where fixes come from. The controller does not care which variant it is given.
pub trait PositionSource {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Best-effort single fix available right away. Sources without one return `None`.
    fn initial_fix(&mut self) -> Option<GeoFix> {
        None
    }

    /// Start delivering fixes to `subscriber` until the returned handle is cancelled.
    ///
    /// Sources that drive themselves with a task spawn it on the current tokio runtime.
    fn subscribe(self: Box<Self>, subscriber: FixSubscriber) -> Subscription;
}
