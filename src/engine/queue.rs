use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TelemetryError;
use crate::models::location::{LocationSample, QueuedSample, SyncState};
use crate::observability::metrics::Metrics;

/// Durable buffer of samples awaiting remote acknowledgment.
///
/// Every mutation is written through to a JSON file (temp file, then rename)
/// before it returns, and `open` reloads that file, so pending samples survive
/// a process restart. Rows leave the queue only via `purge_synced`, after they
/// were acknowledged and marked synced.
pub struct TelemetryQueue {
    path: PathBuf,
    entries: Mutex<HashMap<Uuid, QueuedSample>>,
    metrics: Metrics,
}

impl TelemetryQueue {
    pub async fn open(path: impl AsRef<Path>, metrics: Metrics) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();

        let rows: Vec<QueuedSample> = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                TelemetryError::Storage(format!("corrupt queue file {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(TelemetryError::Storage(format!(
                    "failed to read {}: {err}",
                    path.display()
                )));
            }
        };

        let entries: HashMap<Uuid, QueuedSample> =
            rows.into_iter().map(|row| (row.sample.id, row)).collect();

        info!(path = %path.display(), rows = entries.len(), "telemetry queue loaded");
        metrics.queue_depth.set(entries.len() as i64);

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            metrics,
        })
    }

    /// Queues a sample as pending. Returns false if the id was already queued.
    pub async fn enqueue(&self, sample: LocationSample) -> Result<bool, TelemetryError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&sample.id) {
            return Ok(false);
        }

        let id = sample.id;
        let row = QueuedSample {
            sample: LocationSample {
                sync_state: SyncState::Pending,
                ..sample
            },
            queued_at_epoch_ms: Utc::now().timestamp_millis(),
        };
        entries.insert(id, row);

        if let Err(err) = self.persist(&entries).await {
            entries.remove(&id);
            return Err(err);
        }

        debug!(sample_id = %id, depth = entries.len(), "sample queued");
        self.metrics.queue_depth.set(entries.len() as i64);
        Ok(true)
    }

    /// Records remote acknowledgment. Returns false for ids not in the queue.
    pub async fn mark_synced(&self, id: Uuid) -> Result<bool, TelemetryError> {
        let mut entries = self.entries.lock().await;
        let previous = match entries.get_mut(&id) {
            Some(row) => std::mem::replace(&mut row.sample.sync_state, SyncState::Synced),
            None => return Ok(false),
        };

        if let Err(err) = self.persist(&entries).await {
            if let Some(row) = entries.get_mut(&id) {
                row.sample.sync_state = previous;
            }
            return Err(err);
        }

        Ok(true)
    }

    /// Drops every synced row. Returns how many were removed.
    pub async fn purge_synced(&self) -> Result<usize, TelemetryError> {
        let mut entries = self.entries.lock().await;
        let synced: Vec<Uuid> = entries
            .values()
            .filter(|row| row.sample.sync_state == SyncState::Synced)
            .map(|row| row.sample.id)
            .collect();
        if synced.is_empty() {
            return Ok(0);
        }

        let mut retained = entries.clone();
        for id in &synced {
            retained.remove(id);
        }
        self.persist(&retained).await?;
        *entries = retained;

        self.metrics.queue_depth.set(entries.len() as i64);
        Ok(synced.len())
    }

    /// Pending samples for every owner, oldest capture first.
    pub async fn list_pending(&self) -> Vec<LocationSample> {
        self.pending_where(|_| true).await
    }

    pub async fn list_pending_for(&self, owner_id: Uuid) -> Vec<LocationSample> {
        self.pending_where(|row| row.sample.owner_id == owner_id)
            .await
    }

    pub async fn owners_with_pending(&self) -> Vec<Uuid> {
        let mut owners: Vec<Uuid> = self
            .list_pending()
            .await
            .into_iter()
            .map(|sample| sample.owner_id)
            .collect();
        owners.sort();
        owners.dedup();
        owners
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.entries.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn pending_where<F>(&self, keep: F) -> Vec<LocationSample>
    where
        F: Fn(&QueuedSample) -> bool,
    {
        let entries = self.entries.lock().await;
        let mut rows: Vec<&QueuedSample> = entries
            .values()
            .filter(|row| row.sample.sync_state == SyncState::Pending && keep(row))
            .collect();
        rows.sort_by_key(|row| (row.sample.captured_at_epoch_ms, row.queued_at_epoch_ms));
        rows.into_iter().map(|row| row.sample.clone()).collect()
    }

    async fn persist(&self, entries: &HashMap<Uuid, QueuedSample>) -> Result<(), TelemetryError> {
        let mut rows: Vec<&QueuedSample> = entries.values().collect();
        rows.sort_by_key(|row| (row.sample.captured_at_epoch_ms, row.queued_at_epoch_ms));

        let bytes = serde_json::to_vec(&rows)
            .map_err(|err| TelemetryError::Storage(format!("failed to encode queue: {err}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                TelemetryError::Storage(format!("failed to create {}: {err}", parent.display()))
            })?;
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &bytes).await.map_err(|err| {
            TelemetryError::Storage(format!("failed to write {}: {err}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|err| {
            TelemetryError::Storage(format!("failed to replace {}: {err}", self.path.display()))
        })?;

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
