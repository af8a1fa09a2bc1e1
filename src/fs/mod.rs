/*!
 * Filesystem Callers
 * Callback-style filesystem operations built on completion guards
 */

mod folder;
mod stat;

pub use folder::{folder_info, read_dir_stats, DirStats, FolderInfo};
pub use stat::{stat_file, FileStat, Misbehavior};
