/*!
 * Completion Deadlines
 *
 * Per-guard deadlines and the configuration they resolve against.
 *
 * ## Resolution
 *
 * - `Deadline::Default`: the configured default timeout (1000ms unless overridden)
 * - `Deadline::Disabled` or a zero duration: no timer is armed
 * - `Deadline::After(d)`: explicit per-guard timeout
 *
 * ## Example
 *
 * ```ignore
 * let config = GuardConfig::new()
 *     .with_default_timeout(Duration::from_millis(250))
 *     .with_observer(Arc::new(RecordingObserver::new()));
 *
 * let callback = config.guard(handler, Deadline::Default)?;          // 250ms
 * let callback = config.guard(handler, Deadline::after_millis(50))?; // 50ms
 * let callback = config.guard(handler, Deadline::Disabled)?;         // never times out
 * ```
 */

use super::completion::CompletionGuard;
use super::observe::{CompletionObserver, TracingObserver};
use super::traits::TimeoutOutcome;
use super::{GuardError, GuardOrigin, GuardResult};
use serde::{Deserialize, Serialize};
use std::env::VarError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Default completion timeout: one second
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Environment variable overriding the default timeout, in milliseconds
pub const TIMEOUT_ENV_VAR: &str = "SAFE_RETURN_TIMEOUT_MS";

/// Deadline requested for a single guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    /// Use the configured default timeout
    #[default]
    Default,

    /// Never synthesize a timeout
    Disabled,

    /// Time out after the given duration (zero disables)
    After(Duration),
}

impl Deadline {
    pub const fn after_millis(millis: u64) -> Self {
        Self::After(Duration::from_millis(millis))
    }

    /// Build a deadline from a signed millisecond count
    ///
    /// Zero disables the deadline, negative values are rejected.
    pub fn from_millis(millis: i64) -> GuardResult<Self> {
        match u64::try_from(millis) {
            Ok(0) => Ok(Self::Disabled),
            Ok(millis) => Ok(Self::after_millis(millis)),
            Err(_) => Err(GuardError::InvalidArgument(format!(
                "deadline must be non-negative, got {}ms",
                millis
            ))),
        }
    }
}

impl FromStr for Deadline {
    type Err = GuardError;

    /// Parses `default`, `off`/`none`/`disabled`, or a millisecond count
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "default" => Ok(Self::Default),
            "off" | "none" | "disabled" => Ok(Self::Disabled),
            raw => raw
                .parse::<i64>()
                .map_err(|_| GuardError::InvalidArgument(format!("deadline is not numeric: {:?}", raw)))
                .and_then(Self::from_millis),
        }
    }
}

/// Guard configuration shared by every guard built from it
#[derive(Clone)]
pub struct GuardConfig {
    default_timeout: Duration,
    enabled: bool,
    observer: Arc<dyn CompletionObserver>,
    runtime: Option<Handle>,
}

impl GuardConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            enabled: true,
            observer: Arc::new(TracingObserver),
            runtime: None,
        }
    }

    /// Create config where no deadline ever arms a timer (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Load the default timeout from `SAFE_RETURN_TIMEOUT_MS`
    ///
    /// A missing variable keeps the built-in default; `0` disables it.
    pub fn from_env() -> GuardResult<Self> {
        match std::env::var(TIMEOUT_ENV_VAR) {
            Ok(raw) => {
                let millis: u64 = raw.trim().parse().map_err(|_| {
                    GuardError::InvalidArgument(format!(
                        "{} must be a millisecond count, got {:?}",
                        TIMEOUT_ENV_VAR, raw
                    ))
                })?;
                Ok(Self::new().with_default_timeout(Duration::from_millis(millis)))
            }
            Err(VarError::NotPresent) => Ok(Self::new()),
            Err(VarError::NotUnicode(_)) => Err(GuardError::InvalidArgument(format!(
                "{} is not valid unicode",
                TIMEOUT_ENV_VAR
            ))),
        }
    }

    /// Set the timeout used by `Deadline::Default`
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the observer notified of duplicate, late and abandoned completions
    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Arm timers on this runtime instead of the ambient one
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn observer(&self) -> &Arc<dyn CompletionObserver> {
        &self.observer
    }

    /// Resolve a deadline to the timer duration it arms, if any
    pub fn resolve(&self, deadline: Deadline) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let timeout = match deadline {
            Deadline::Default => self.default_timeout,
            Deadline::Disabled => return None,
            Deadline::After(timeout) => timeout,
        };
        (!timeout.is_zero()).then_some(timeout)
    }

    /// Runtime used to arm timers
    pub fn runtime(&self) -> GuardResult<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| GuardError::RuntimeUnavailable),
        }
    }

    /// Guard a handler with this configuration
    #[track_caller]
    pub fn guard<A, R, F>(&self, handler: F, deadline: Deadline) -> GuardResult<CompletionGuard<A, R>>
    where
        A: TimeoutOutcome + Send + 'static,
        R: Send + 'static,
        F: FnOnce(A) -> R + Send + 'static,
    {
        CompletionGuard::new(handler, deadline, self)
    }

    /// Re-arm an existing guard with a new deadline
    pub fn rewrap<A, R>(&self, guard: &CompletionGuard<A, R>, deadline: Deadline) -> GuardResult<CompletionGuard<A, R>>
    where
        A: TimeoutOutcome + Send + 'static,
        R: Send + 'static,
    {
        guard.rewrap(deadline, self)
    }

    /// Serializable form of this configuration
    pub fn settings(&self) -> GuardSettings {
        GuardSettings {
            default_timeout_ms: if self.enabled {
                self.default_timeout.as_millis() as u64
            } else {
                0
            },
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GuardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardConfig")
            .field("default_timeout", &self.default_timeout)
            .field("enabled", &self.enabled)
            .field("runtime", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}

/// Plain, serializable guard settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardSettings {
    /// Default timeout in milliseconds, `0` disables it
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl From<GuardSettings> for GuardConfig {
    fn from(settings: GuardSettings) -> Self {
        GuardConfig::new().with_default_timeout(Duration::from_millis(settings.default_timeout_ms))
    }
}

/// Failure synthesized when a guard's deadline elapses
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
#[error("Callback timeout exceeded after {}ms ({})", .timeout.as_millis(), .origin)]
#[diagnostic(
    code(guard::timeout),
    help("The guarded operation did not complete before its deadline. A late completion will be reported as a duplicate.")
)]
pub struct TimeoutError {
    origin: GuardOrigin,
    timeout: Duration,
    elapsed: Duration,
}

impl TimeoutError {
    /// Error kind carried by every synthesized timeout
    pub const KIND: &'static str = "ETIMEOUT";

    pub(crate) fn new(origin: GuardOrigin, timeout: Duration) -> Self {
        Self {
            origin,
            timeout,
            elapsed: origin.age(),
        }
    }

    pub fn kind(&self) -> &'static str {
        Self::KIND
    }

    /// Creation context of the guard that timed out
    pub fn origin(&self) -> &GuardOrigin {
        &self.origin
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time between guard creation and the timeout firing
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Extension to GuardError for timeouts
impl GuardError {
    /// Check if this is a synthesized timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, GuardError::Timeout(_))
    }
}
