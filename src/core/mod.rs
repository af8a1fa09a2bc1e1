/*!
 * Core Module
 * Completion guards and fan-in aggregation
 */

pub mod guard;

// Re-export for convenience
pub use guard::{
    aggregate, guard, AggregateError, CompletionGuard, CompletionObserver, Deadline, GuardConfig, GuardError,
    GuardResult, KeyedAggregator, SubHandler, TimeoutError, TimeoutOutcome,
};
