/*!
 * Guarded Stat
 */

use crate::core::guard::{Deadline, GuardConfig, GuardResult};
use crate::monitoring::span_operation;
use serde::Serialize;
use std::fs::Metadata;
use std::io;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;
use tracing::{debug, Instrument};

/// Subset of file metadata reported by the callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub len: u64,
    pub is_dir: bool,
    pub is_file: bool,
    pub readonly: bool,
    /// Modification time, seconds since the unix epoch
    pub modified_secs: Option<u64>,
}

impl From<Metadata> for FileStat {
    fn from(meta: Metadata) -> Self {
        Self {
            len: meta.len(),
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            readonly: meta.permissions().readonly(),
            modified_secs: meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
        }
    }
}

/// Injected defects for exercising guards against a misbehaving operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Misbehavior {
    #[default]
    WellBehaved,
    /// Drops its callback without ever calling it
    NeverCompletes,
    /// Calls its callback twice
    CompletesTwice,
}

/// Stat `path` and report through `callback`
///
/// The callback is guarded with the default deadline, so it fires exactly
/// once even when `behavior` makes the underlying operation misbehave.
#[track_caller]
pub fn stat_file<F>(path: PathBuf, behavior: Misbehavior, config: &GuardConfig, callback: F) -> GuardResult<()>
where
    F: FnOnce(io::Result<FileStat>) + Send + 'static,
{
    let callback = config.guard(callback, Deadline::Default)?;
    if behavior == Misbehavior::NeverCompletes {
        debug!(path = %path.display(), "stat dropped its callback");
        return Ok(());
    }

    let runtime = config.runtime()?;
    let span = span_operation("stat", &path.display().to_string());
    runtime.spawn(
        async move {
            let result = tokio::fs::metadata(&path).await.map(FileStat::from);
            if behavior == Misbehavior::CompletesTwice {
                let again = tokio::fs::metadata(&path).await.map(FileStat::from);
                callback.call(result);
                callback.call(again);
            } else {
                callback.call(result);
            }
        }
        .instrument(span),
    );
    Ok(())
}
