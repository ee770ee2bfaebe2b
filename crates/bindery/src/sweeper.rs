//! Retention sweep over the upload directory.
//!
//! Generated PDFs are only kept for the retention window. The sweep is
//! non-recursive, looks at regular files only, and never lets one bad entry
//! stop it.

use quire_common::{QuireError, SweepReport};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;

/// Delete regular files directly under `directory` older than `retention`.
///
/// A file whose mtime lies in the future is treated as fresh. Each deletion
/// re-checks the file first, so an entry replaced or removed mid-sweep is
/// left alone.
pub fn sweep(directory: &Path, retention: Duration) -> SweepReport {
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = ?directory, error = %e, "Cannot list upload directory");
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::debug!(path = ?path, error = %e, "Skipping entry without metadata");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        report.scanned += 1;

        if !is_stale(&metadata, retention) {
            continue;
        }

        match remove_if_stale(&path, retention) {
            Ok(true) => {
                report.removed += 1;
                tracing::debug!(path = ?path, "Removed stale upload");
            }
            Ok(false) => {}
            Err(e) => {
                report.failed += 1;
                let failure = QuireError::SweepEntryFailure {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(error = %failure, "Retention sweep entry failed");
            }
        }
    }

    if report.removed > 0 || report.failed > 0 {
        tracing::info!(
            dir = ?directory,
            scanned = report.scanned,
            removed = report.removed,
            failed = report.failed,
            "Retention sweep finished"
        );
    }

    report
}

/// Sweep only if the directory exists; `None` means it was skipped
pub fn sweep_if_present(directory: &Path, retention: Duration) -> Option<SweepReport> {
    if !directory.is_dir() {
        tracing::debug!(dir = ?directory, "Upload directory missing, skipping sweep");
        return None;
    }
    Some(sweep(directory, retention))
}

/// Run a sweep on the blocking pool. Never fails the caller.
pub async fn run_sweep(directory: PathBuf, retention: Duration) -> Option<SweepReport> {
    match tokio::task::spawn_blocking(move || sweep_if_present(&directory, retention)).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Retention sweep task failed");
            None
        }
    }
}

/// Background worker that sweeps on a fixed period until shutdown
pub async fn sweeper_worker(
    directory: PathBuf,
    retention: Duration,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(
        dir = ?directory,
        interval_secs = interval.as_secs(),
        "🧹 Retention sweeper started"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                run_sweep(directory.clone(), retention).await;
            }
            _ = shutdown.recv() => {
                tracing::info!("🧹 Retention sweeper shutting down...");
                break;
            }
        }
    }
}

fn age(metadata: &fs::Metadata) -> Option<Duration> {
    let modified = metadata.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn is_stale(metadata: &fs::Metadata, retention: Duration) -> bool {
    age(metadata).is_some_and(|age| age > retention)
}

/// Re-stat and unlink. `Ok(false)` when the file vanished or is no longer stale.
fn remove_if_stale(path: &Path, retention: Duration) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if !metadata.is_file() || !is_stale(&metadata, retention) {
        return Ok(false);
    }

    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
