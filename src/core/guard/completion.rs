/*!
 * Completion Guard
 *
 * Wraps a completion handler so it observably fires exactly once
 */

use super::observe::{AbandonedGuard, CompletionObserver, DuplicateCompletion, TimeoutFired};
use super::timeout::{Deadline, GuardConfig, TimeoutError};
use super::traits::TimeoutOutcome;
use super::{FireSource, Firing, GuardOrigin, GuardResult};
use parking_lot::Mutex;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

type Handler<A, R> = Box<dyn FnOnce(A) -> R + Send>;

enum State<A, R> {
    Pending(Handler<A, R>),
    Fired(Firing),
}

impl<A, R> State<A, R> {
    /// Pending -> Fired, handing out the handler to the winner only
    fn fire(&mut self, firing: Firing) -> Result<Handler<A, R>, Firing> {
        match std::mem::replace(self, State::Fired(firing)) {
            State::Pending(handler) => Ok(handler),
            State::Fired(first) => {
                *self = State::Fired(first);
                Err(first)
            }
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, State::Pending(_))
    }
}

struct Slot<A, R> {
    state: State<A, R>,
    timer: Option<AbortHandle>,
    /// Bumped on every arm/disarm so a superseded timer cannot fire
    generation: u64,
    deadline: Option<Duration>,
}

impl<A, R> Slot<A, R> {
    fn cancel_timer(&mut self) {
        self.generation += 1;
        self.deadline = None;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Shared<A, R> {
    origin: GuardOrigin,
    observer: Arc<dyn CompletionObserver>,
    slot: Mutex<Slot<A, R>>,
    attempts: AtomicU64,
}

impl<A, R> Shared<A, R>
where
    A: TimeoutOutcome,
{
    fn expire(&self, generation: u64, timeout: Duration) {
        let handler = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                trace!(guard_id = %self.origin.id(), "superseded timer ignored");
                return;
            }
            // The running timer is this task; nothing to abort
            slot.timer = None;
            slot.deadline = None;
            match slot.state.fire(Firing::timeout()) {
                Ok(handler) => handler,
                Err(_) => return,
            }
        };

        self.observer.on_timeout(&TimeoutFired {
            origin: self.origin,
            timeout,
        });
        let _ = handler(A::timed_out(TimeoutError::new(self.origin, timeout)));
    }
}

impl<A, R> Drop for Shared<A, R> {
    fn drop(&mut self) {
        if self.slot.get_mut().state.is_pending() {
            self.observer.on_abandoned(&AbandonedGuard { origin: self.origin });
        }
    }
}

/// Guarded completion handler
///
/// Cloning yields another handle on the same guard; the wrapped handler
/// still runs at most once across all clones and re-wraps.
///
/// # Example
///
/// ```ignore
/// let callback = CompletionGuard::new(
///     |result: io::Result<Metadata>| println!("{result:?}"),
///     Deadline::Default,
///     &config,
/// )?;
///
/// callback.call(Ok(meta));  // runs the handler
/// callback.call(Ok(meta));  // reported to the observer, handler untouched
/// ```
pub struct CompletionGuard<A, R = ()> {
    shared: Arc<Shared<A, R>>,
}

impl<A, R> Clone for CompletionGuard<A, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A, R> CompletionGuard<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Guard a handler, arming a timer per `deadline`
    ///
    /// # Errors
    ///
    /// `GuardError::RuntimeUnavailable` when a timer is needed but no tokio
    /// runtime is reachable. No timer is created in that case.
    #[track_caller]
    pub fn new<F>(handler: F, deadline: Deadline, config: &GuardConfig) -> GuardResult<Self>
    where
        A: TimeoutOutcome,
        F: FnOnce(A) -> R + Send + 'static,
    {
        let origin = GuardOrigin::capture();
        let timeout = config.resolve(deadline);
        let runtime = timeout.map(|_| config.runtime()).transpose()?;

        let guard = Self::build(origin, Box::new(handler), config);
        if let (Some(timeout), Some(runtime)) = (timeout, runtime) {
            guard.arm(&runtime, timeout);
        }
        Ok(guard)
    }

    /// Guard a handler without any deadline
    ///
    /// Works for any argument type, including ones that cannot express a
    /// timeout, and needs no runtime.
    #[track_caller]
    pub fn untimed<F>(handler: F, config: &GuardConfig) -> Self
    where
        F: FnOnce(A) -> R + Send + 'static,
    {
        Self::build(GuardOrigin::capture(), Box::new(handler), config)
    }

    fn build(origin: GuardOrigin, handler: Handler<A, R>, config: &GuardConfig) -> Self {
        debug!(guard_id = %origin.id(), origin = %origin.location(), "completion guard created");
        Self {
            shared: Arc::new(Shared {
                origin,
                observer: Arc::clone(config.observer()),
                slot: Mutex::new(Slot {
                    state: State::Pending(handler),
                    timer: None,
                    generation: 0,
                    deadline: None,
                }),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    fn arm(&self, runtime: &Handle, timeout: Duration)
    where
        A: TimeoutOutcome,
    {
        let mut slot = self.shared.slot.lock();
        if !slot.state.is_pending() {
            return;
        }
        slot.cancel_timer();
        slot.deadline = Some(timeout);

        let generation = slot.generation;
        let shared = Arc::clone(&self.shared);
        let task = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            shared.expire(generation, timeout);
        });
        slot.timer = Some(task.abort_handle());
        debug!(
            guard_id = %self.shared.origin.id(),
            timeout_ms = timeout.as_millis() as u64,
            "completion timer armed"
        );
    }

    fn disarm(&self) {
        self.shared.slot.lock().cancel_timer();
    }

    /// Re-wrap this guard with a new deadline
    ///
    /// The returned handle guards the same original handler: the current
    /// timer is cancelled and a new one armed, and the handler still fires
    /// at most once across both handles. Re-wrapping a fired guard arms
    /// nothing.
    pub fn rewrap(&self, deadline: Deadline, config: &GuardConfig) -> GuardResult<Self>
    where
        A: TimeoutOutcome,
    {
        let timeout = config.resolve(deadline);
        let runtime = timeout.map(|_| config.runtime()).transpose()?;

        let guard = self.clone();
        match (timeout, runtime) {
            (Some(timeout), Some(runtime)) => guard.arm(&runtime, timeout),
            _ => guard.disarm(),
        }
        Ok(guard)
    }

    /// Deliver a completion
    ///
    /// Returns the handler's return value on the first call. Every later
    /// call returns `None` and is reported to the observer instead.
    #[track_caller]
    pub fn call(&self, args: A) -> Option<R> {
        let location = Location::caller();
        let attempt = self.shared.attempts.fetch_add(1, Ordering::AcqRel) + 1;

        let fired = {
            let mut slot = self.shared.slot.lock();
            let fired = slot.state.fire(Firing::completion(location));
            if fired.is_ok() {
                slot.cancel_timer();
            }
            fired
        };

        match fired {
            Ok(handler) => {
                debug!(guard_id = %self.shared.origin.id(), attempt, "completion delivered");
                Some(handler(args))
            }
            Err(first) => {
                let report = DuplicateCompletion {
                    origin: self.shared.origin,
                    first,
                    attempt,
                    location,
                };
                match first.source() {
                    FireSource::Timeout => self.shared.observer.on_late_completion(&report),
                    FireSource::Completion => self.shared.observer.on_duplicate(&report),
                }
                None
            }
        }
    }

    /// Convert into a plain closure for APIs that take `Fn(A)`
    pub fn into_fn(self) -> impl Fn(A) + Clone + Send + Sync + 'static {
        move |args| {
            let _ = self.call(args);
        }
    }

    /// Check whether the handler has already run (or been claimed by the timer)
    pub fn is_fired(&self) -> bool {
        !self.shared.slot.lock().state.is_pending()
    }

    /// How the guard fired, if it has
    pub fn firing(&self) -> Option<Firing> {
        match self.shared.slot.lock().state {
            State::Fired(firing) => Some(firing),
            State::Pending(_) => None,
        }
    }

    /// Number of `call` invocations so far, across all handles
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::Acquire)
    }

    /// Currently armed deadline, if any
    pub fn deadline(&self) -> Option<Duration> {
        self.shared.slot.lock().deadline
    }

    /// Creation context of the original handler
    pub fn origin(&self) -> &GuardOrigin {
        &self.shared.origin
    }
}

/// Guard a handler with the default configuration and deadline
#[track_caller]
pub fn guard<A, R, F>(handler: F) -> GuardResult<CompletionGuard<A, R>>
where
    A: TimeoutOutcome + Send + 'static,
    R: Send + 'static,
    F: FnOnce(A) -> R + Send + 'static,
{
    CompletionGuard::new(handler, Deadline::Default, &GuardConfig::default())
}
