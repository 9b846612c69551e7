// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store snapshots: load/save to JSON file with atomic writes, plus the
//! background flusher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::model::{Agent, Assignment};
use crate::store::MemoryStore;

/// Persisted store contents.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

/// Load a snapshot from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<Snapshot> {
    let contents = std::fs::read_to_string(path)?;
    let snapshot: Snapshot = serde_json::from_str(&contents)?;
    Ok(snapshot)
}

/// Load a snapshot if the file exists, otherwise start empty.
pub fn load_or_default(path: &Path) -> anyhow::Result<Snapshot> {
    if path.exists() {
        load(path)
    } else {
        Ok(Snapshot::default())
    }
}

/// Save a snapshot to a JSON file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
pub fn save(path: &Path, snapshot: &Snapshot) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(snapshot)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Write the store to `path` if it changed since the last flush.
///
/// Returns whether a file was written. A failed write leaves the store
/// marked dirty so the next flush retries.
pub fn flush(store: &MemoryStore, path: &Path) -> anyhow::Result<bool> {
    if !store.take_dirty() {
        return Ok(false);
    }
    if let Err(e) = save(path, &store.snapshot()) {
        store.mark_dirty();
        return Err(e);
    }
    Ok(true)
}

/// Spawn a task that flushes the store every `interval` and once more when
/// `shutdown` fires.
pub fn spawn_flusher(
    store: Arc<MemoryStore>,
    path: PathBuf,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match flush(&store, &path) {
                        Ok(true) => tracing::debug!(path = %path.display(), "snapshot written"),
                        Ok(false) => {}
                        Err(e) => tracing::warn!(path = %path.display(), err = %e, "snapshot write failed"),
                    }
                }
            }
        }

        match flush(&store, &path) {
            Ok(_) => tracing::info!(path = %path.display(), "final snapshot written"),
            Err(e) => tracing::error!(path = %path.display(), err = %e, "final snapshot failed"),
        }
    })
}
