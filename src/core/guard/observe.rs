/*!
 * Completion Observers
 *
 * Diagnostic hooks for completions the guard refuses to deliver
 */

use super::{Firing, GuardOrigin};
use parking_lot::Mutex;
use std::fmt;
use std::panic::Location;
use std::time::Duration;
use tracing::{debug, warn};

/// A guarded handler was invoked after it had already fired
#[derive(Debug, Clone, Copy)]
pub struct DuplicateCompletion {
    /// Creation context of the guard
    pub origin: GuardOrigin,
    /// The firing that already consumed the handler
    pub first: Firing,
    /// 1-based count of invocations on the guard, including this one
    pub attempt: u64,
    /// Call site of the rejected invocation
    pub location: &'static Location<'static>,
}

impl fmt::Display for DuplicateCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completion #{} at {} rejected: {} already {}",
            self.attempt, self.location, self.origin, self.first
        )
    }
}

/// A guard's deadline elapsed before the operation completed
#[derive(Debug, Clone, Copy)]
pub struct TimeoutFired {
    pub origin: GuardOrigin,
    pub timeout: Duration,
}

/// The last handle to a pending guard was dropped
#[derive(Debug, Clone, Copy)]
pub struct AbandonedGuard {
    pub origin: GuardOrigin,
}

/// Observer for completion anomalies
///
/// Anomalies never escape as panics or errors into the asynchronous flow.
/// They are reported here so misbehaving operations stay visible.
pub trait CompletionObserver: Send + Sync {
    /// Handler invoked again after a normal completion
    fn on_duplicate(&self, report: &DuplicateCompletion);

    /// Operation completed after the guard had already timed out
    fn on_late_completion(&self, report: &DuplicateCompletion) {
        self.on_duplicate(report);
    }

    /// Deadline elapsed; the handler is about to receive a timeout failure
    fn on_timeout(&self, _report: &TimeoutFired) {}

    /// Guard dropped without ever firing
    fn on_abandoned(&self, _report: &AbandonedGuard) {}
}

impl<F> CompletionObserver for F
where
    F: Fn(&DuplicateCompletion) + Send + Sync,
{
    fn on_duplicate(&self, report: &DuplicateCompletion) {
        self(report)
    }
}

/// Default observer: reports anomalies as tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CompletionObserver for TracingObserver {
    fn on_duplicate(&self, report: &DuplicateCompletion) {
        warn!(
            guard_id = %report.origin.id(),
            origin = %report.origin.location(),
            attempt = report.attempt,
            location = %report.location,
            "duplicate completion ignored"
        );
    }

    fn on_late_completion(&self, report: &DuplicateCompletion) {
        warn!(
            guard_id = %report.origin.id(),
            origin = %report.origin.location(),
            attempt = report.attempt,
            location = %report.location,
            late_by_ms = report.first.at().elapsed().as_millis() as u64,
            "completion arrived after timeout"
        );
    }

    fn on_timeout(&self, report: &TimeoutFired) {
        debug!(
            guard_id = %report.origin.id(),
            origin = %report.origin.location(),
            timeout_ms = report.timeout.as_millis() as u64,
            "completion deadline elapsed"
        );
    }

    fn on_abandoned(&self, report: &AbandonedGuard) {
        warn!(
            guard_id = %report.origin.id(),
            origin = %report.origin.location(),
            age_ms = report.origin.age().as_millis() as u64,
            "guard dropped without completing"
        );
    }
}

/// Any anomaly a guard can report
#[derive(Debug, Clone, Copy)]
pub enum GuardReport {
    Duplicate(DuplicateCompletion),
    LateCompletion(DuplicateCompletion),
    TimedOut(TimeoutFired),
    Abandoned(AbandonedGuard),
}

/// Observer that keeps every report in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    reports: Mutex<Vec<GuardReport>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all reports so far
    pub fn reports(&self) -> Vec<GuardReport> {
        self.reports.lock().clone()
    }

    pub fn duplicates(&self) -> usize {
        self.count(|r| matches!(r, GuardReport::Duplicate(_)))
    }

    pub fn late_completions(&self) -> usize {
        self.count(|r| matches!(r, GuardReport::LateCompletion(_)))
    }

    pub fn timeouts(&self) -> usize {
        self.count(|r| matches!(r, GuardReport::TimedOut(_)))
    }

    pub fn abandoned(&self) -> usize {
        self.count(|r| matches!(r, GuardReport::Abandoned(_)))
    }

    fn count(&self, pred: impl Fn(&GuardReport) -> bool) -> usize {
        self.reports.lock().iter().filter(|r| pred(r)).count()
    }
}

impl CompletionObserver for RecordingObserver {
    fn on_duplicate(&self, report: &DuplicateCompletion) {
        self.reports.lock().push(GuardReport::Duplicate(*report));
    }

    fn on_late_completion(&self, report: &DuplicateCompletion) {
        self.reports.lock().push(GuardReport::LateCompletion(*report));
    }

    fn on_timeout(&self, report: &TimeoutFired) {
        self.reports.lock().push(GuardReport::TimedOut(*report));
    }

    fn on_abandoned(&self, report: &AbandonedGuard) {
        self.reports.lock().push(GuardReport::Abandoned(*report));
    }
}
