/*!
 * Safe Return
 * Exactly-once completion callbacks and keyed fan-in for asynchronous operations
 */

pub mod core;
pub mod fs;
pub mod monitoring;

// Re-exports
pub use crate::core::guard::{
    aggregate, guard, AbandonedGuard, AggregateError, Collected, CompletionGuard, CompletionObserver, Deadline,
    DuplicateCompletion, FireSource, Firing, GuardConfig, GuardError, GuardOrigin, GuardReport, GuardResult,
    GuardSettings, KeyedAggregator, RecordingObserver, SubHandler, TimeoutError, TimeoutFired, TimeoutOutcome,
    TracingObserver, DEFAULT_TIMEOUT, TIMEOUT_ENV_VAR,
};
pub use crate::fs::{folder_info, read_dir_stats, stat_file, DirStats, FileStat, FolderInfo, Misbehavior};
pub use crate::monitoring::init_tracing;
