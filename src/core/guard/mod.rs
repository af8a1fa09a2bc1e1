/*!
 * Completion Guards
 *
 * Exactly-once delivery for completion callbacks handed to untrusted
 * asynchronous operations.
 *
 * ## Design Principles
 *
 * 1. **Exactly Once**: A guarded handler body runs once, no matter how often
 *    (or how late) the operation calls back
 * 2. **Bounded Wait**: An optional deadline synthesizes a timeout failure
 * 3. **Observable**: Duplicate and late completions reach a diagnostic observer
 * 4. **Composable**: Aggregator sub-handlers are plain callables that can be
 *    guarded in turn
 *
 * ## Guard Types
 *
 * - **CompletionGuard**: Wraps one completion handler
 * - **KeyedAggregator**: Fan-in of N keyed sub-operations into one completion
 *
 * ## Example
 *
 * ```ignore
 * let config = GuardConfig::new();
 *
 * // Fires exactly once: with the stat result, or with a timeout after 1s
 * let callback = config.guard(|result: io::Result<u64>| println!("{result:?}"), Deadline::Default)?;
 * flaky_operation(move |result| { callback.call(result); });
 *
 * // Fan-in over keyed sub-operations
 * let on_item = aggregate(|outcome| println!("{outcome:?}"), names.len());
 * for name in names {
 *     let sub = on_item.handler_for(name.clone())?.guarded(Deadline::Default, &config)?;
 *     stat(name, move |result| { sub.call(result); });
 * }
 * ```
 */

mod aggregate;
mod completion;
mod observe;
mod timeout;
mod traits;

pub use aggregate::{aggregate, AggregateError, Collected, KeyedAggregator, SubHandler};
pub use completion::{guard, CompletionGuard};
pub use observe::{
    AbandonedGuard, CompletionObserver, DuplicateCompletion, GuardReport, RecordingObserver,
    TimeoutFired, TracingObserver,
};
pub use timeout::{Deadline, GuardConfig, GuardSettings, TimeoutError, DEFAULT_TIMEOUT, TIMEOUT_ENV_VAR};
pub use traits::TimeoutOutcome;

use serde::Serialize;
use std::fmt;
use std::panic::Location;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Result type for guard operations
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors that can occur during guard construction and delivery
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum GuardError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(guard::invalid_argument),
        help("Deadlines must be non-negative millisecond values.")
    )]
    InvalidArgument(String),

    #[error("No tokio runtime available to arm the completion timer")]
    #[diagnostic(
        code(guard::runtime_unavailable),
        help("Create the guard inside a tokio runtime, pass a handle with GuardConfig::with_runtime, or use Deadline::Disabled.")
    )]
    RuntimeUnavailable,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Timeout(#[from] TimeoutError),
}

/// Creation context of a guard, kept for diagnostics
#[derive(Debug, Clone, Copy)]
pub struct GuardOrigin {
    id: Uuid,
    location: &'static Location<'static>,
    created_at: Instant,
}

impl GuardOrigin {
    /// Capture the caller's location as the guard origin
    #[inline]
    #[track_caller]
    pub fn capture() -> Self {
        Self {
            id: Uuid::new_v4(),
            location: Location::caller(),
            created_at: Instant::now(),
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Source location that created the guard
    #[inline]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the guard was created
    #[inline]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl fmt::Display for GuardOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guard {} created at {}", self.id, self.location)
    }
}

/// What caused a guard to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FireSource {
    /// The operation called back
    Completion,
    /// The deadline elapsed first
    Timeout,
}

/// Record of the first (and only) firing of a guard
#[derive(Debug, Clone, Copy)]
pub struct Firing {
    source: FireSource,
    location: Option<&'static Location<'static>>,
    at: Instant,
}

impl Firing {
    pub(crate) fn completion(location: &'static Location<'static>) -> Self {
        Self {
            source: FireSource::Completion,
            location: Some(location),
            at: Instant::now(),
        }
    }

    pub(crate) fn timeout() -> Self {
        Self {
            source: FireSource::Timeout,
            location: None,
            at: Instant::now(),
        }
    }

    #[inline]
    pub fn source(&self) -> FireSource {
        self.source
    }

    /// Call site of the first completion, `None` when the timer fired
    #[inline]
    pub fn location(&self) -> Option<&'static Location<'static>> {
        self.location
    }

    #[inline]
    pub fn at(&self) -> Instant {
        self.at
    }
}

impl fmt::Display for Firing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.source, self.location) {
            (FireSource::Completion, Some(location)) => write!(f, "completed at {}", location),
            (FireSource::Completion, None) => write!(f, "completed"),
            (FireSource::Timeout, _) => write!(f, "timed out"),
        }
    }
}
