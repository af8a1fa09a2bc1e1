/*!
 * Safe Return - Demo Entry Point
 *
 * Prints a folder report built from guarded, fanned-in stat callbacks:
 *
 *     safe-return [PATH]
 */

use anyhow::Context;
use safe_return::{folder_info, init_tracing, GuardConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = GuardConfig::from_env()?;
    info!(path = %path.display(), default_timeout_ms = config.default_timeout().as_millis() as u64, "building folder info");

    let (tx, rx) = tokio::sync::oneshot::channel();
    folder_info(path.clone(), &config, move |result| {
        let _ = tx.send(result);
    })?;

    let info = rx
        .await
        .context("folder info callback dropped")?
        .with_context(|| format!("failed to read {}", path.display()))?;
    info!(entries = info.entries.len(), errors = info.errors.len(), "folder info ready");

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
