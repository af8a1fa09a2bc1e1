/*!
 * Guard Traits
 *
 * How a completion argument is synthesized when a deadline elapses
 */

use super::timeout::TimeoutError;
use super::GuardError;
use std::io;

/// Completion arguments that can express a timeout failure
///
/// The guard itself never inspects its arguments. Failure-first callbacks
/// are modelled as `Result<T, E>`, so the timeout lands in the error slot.
pub trait TimeoutOutcome: Sized {
    /// Build the argument delivered when the deadline elapses
    fn timed_out(error: TimeoutError) -> Self;
}

impl<T, E> TimeoutOutcome for Result<T, E>
where
    E: From<TimeoutError>,
{
    fn timed_out(error: TimeoutError) -> Self {
        Err(E::from(error))
    }
}

impl<T> TimeoutOutcome for Option<T> {
    fn timed_out(_error: TimeoutError) -> Self {
        None
    }
}

impl From<TimeoutError> for io::Error {
    fn from(error: TimeoutError) -> Self {
        io::Error::new(io::ErrorKind::TimedOut, error)
    }
}

impl From<TimeoutError> for String {
    fn from(error: TimeoutError) -> Self {
        error.to_string()
    }
}
