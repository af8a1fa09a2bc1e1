/*!
 * Directory Fan-Out
 *
 * Directory listing followed by one stat per entry, joined with a keyed
 * aggregator
 */

use super::stat::{stat_file, FileStat, Misbehavior};
use crate::core::guard::{AggregateError, Collected, Deadline, GuardConfig, GuardResult, KeyedAggregator};
use crate::monitoring::span_operation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, Instrument};

/// Per-entry stat results of one directory, keyed by entry name
pub type DirStats = Collected<String, io::Result<FileStat>>;

/// Directory report splitting failed entries from successful ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderInfo {
    pub errors: BTreeMap<String, String>,
    pub entries: BTreeMap<String, FileStat>,
}

impl FolderInfo {
    pub fn from_stats(stats: DirStats) -> Self {
        let mut info = Self::default();
        for (name, result) in stats {
            match result {
                Ok(stat) => {
                    info.entries.insert(name, stat);
                }
                Err(err) => {
                    info.errors.insert(name, err.to_string());
                }
            }
        }
        info
    }
}

async fn list_dir(path: &Path) -> io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Stat every entry of `path`
///
/// Each stat goes through [`stat_file`] with `behavior` applied, so entries
/// whose operation never completes show up as timed-out errors. The outer
/// callback has no deadline: the per-entry guards already bound the wait.
pub fn read_dir_stats<F>(path: PathBuf, behavior: Misbehavior, config: &GuardConfig, callback: F) -> GuardResult<()>
where
    F: FnOnce(io::Result<DirStats>) + Send + 'static,
{
    let callback = config.guard(callback, Deadline::Disabled)?;
    let runtime = config.runtime()?;
    let config = config.clone();
    let span = span_operation("read_dir_stats", &path.display().to_string());

    runtime.spawn(
        async move {
            let names = match list_dir(&path).await {
                Ok(names) => names,
                Err(err) => {
                    callback.call(Err(err));
                    return;
                }
            };
            debug!(entries = names.len(), "directory listed");

            let done = callback.clone();
            let on_item = KeyedAggregator::new(
                move |outcome: Result<DirStats, AggregateError<String>>| {
                    done.call(outcome.map_err(io::Error::other));
                },
                names.len(),
            );

            for name in names {
                let entry = path.join(&name);
                // A rejected key has already been delivered through the final handler
                let Ok(sub) = on_item.handler_for(name) else {
                    return;
                };
                if let Err(err) = stat_file(entry, behavior, &config, sub.into_fn()) {
                    callback.call(Err(io::Error::other(err)));
                    return;
                }
            }
        }
        .instrument(span),
    );
    Ok(())
}

/// Build a [`FolderInfo`] for `path`
///
/// The whole report is bounded by the default deadline, and every per-entry
/// sub-handler is guarded on its own so one stuck stat cannot stall the rest.
pub fn folder_info<F>(path: PathBuf, config: &GuardConfig, callback: F) -> GuardResult<()>
where
    F: FnOnce(io::Result<FolderInfo>) + Send + 'static,
{
    let callback = config.guard(callback, Deadline::Default)?;
    let runtime = config.runtime()?;
    let config = config.clone();
    let span = span_operation("folder_info", &path.display().to_string());

    runtime.spawn(
        async move {
            let names = match list_dir(&path).await {
                Ok(names) => names,
                Err(err) => {
                    callback.call(Err(err));
                    return;
                }
            };

            let done = callback.clone();
            let on_item = KeyedAggregator::new(
                move |outcome: Result<DirStats, AggregateError<String>>| {
                    done.call(outcome.map(FolderInfo::from_stats).map_err(io::Error::other));
                },
                names.len(),
            );

            for name in names {
                let entry = path.join(&name);
                let sub = on_item
                    .handler_for(name)
                    .map_err(io::Error::other)
                    .and_then(|sub| sub.guarded(Deadline::Default, &config).map_err(io::Error::other));
                let sub = match sub {
                    Ok(sub) => sub,
                    Err(err) => {
                        callback.call(Err(err));
                        return;
                    }
                };
                tokio::spawn(async move {
                    sub.call(tokio::fs::metadata(&entry).await.map(FileStat::from));
                });
            }
        }
        .instrument(span),
    );
    Ok(())
}
