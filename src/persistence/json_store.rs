//! Flat-file trade store
//!
//! The whole collection lives in one JSON array. Every mutation reads the
//! file, changes one record and rewrites it atomically: temp file in the same
//! directory, fsync, rename. Readers therefore see either the old or the new
//! collection, never a torn write. File work runs on the blocking pool.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::entities::trade::{TradeField, TradeRecord};
use crate::domain::repositories::trade_store::{StoreError, TradeStore};

pub struct JsonFileTradeStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles between tasks of this process
    write_lock: Mutex<()>,
}

/// What a field update did to the stored collection
enum UpdateOutcome {
    Updated,
    UnknownId,
    Refused,
}

impl JsonFileTradeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run blocking file work on the blocking pool
    async fn with_file<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || op(&path))
            .await
            .map_err(|e| io_error(&self.path, std::io::Error::other(e)))?
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Current collection; a missing file is an empty collection
fn read_records(path: &Path) -> Result<Vec<TradeRecord>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path, e)),
    };
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&text)?)
}

/// Collection to mutate. A corrupt file is moved aside so the rewrite
/// does not destroy what was in it.
fn records_for_update(path: &Path) -> Result<Vec<TradeRecord>, StoreError> {
    match read_records(path) {
        Ok(records) => Ok(records),
        Err(StoreError::Serialization(e)) => {
            let quarantine = path.with_extension(format!(
                "corrupt-{}.json",
                chrono::Utc::now().timestamp()
            ));
            warn!(
                "Trade store {} is corrupt ({}), moving it to {}",
                path.display(),
                e,
                quarantine.display()
            );
            fs::rename(path, &quarantine).map_err(|e| io_error(path, e))?;
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

fn write_records(path: &Path, records: &[TradeRecord]) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(records)?;
    write_atomic(path, &bytes).map_err(|e| io_error(path, e))
}

/// Write `bytes` to `path` via a synced temp file in the same directory and a rename
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("json.tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)
}

#[async_trait]
impl TradeStore for JsonFileTradeStore {
    async fn list(&self) -> Vec<TradeRecord> {
        match self.with_file(read_records).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not read trade store {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    async fn add(&self, record: &TradeRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let new_record = record.clone();
        self.with_file(move |path| {
            let mut records = records_for_update(path)?;
            if records.iter().any(|r| r.id == new_record.id) {
                return Err(StoreError::DuplicateId(new_record.id));
            }
            records.push(new_record);
            write_records(path, &records)
        })
        .await?;
        info!("Trade {} saved to {}", record.id, self.path.display());
        Ok(())
    }

    async fn update_field(&self, id: &str, field: TradeField) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let key = field.key();
        let target = id.to_string();
        let outcome = self
            .with_file(move |path| {
                let mut records = records_for_update(path)?;
                let Some(record) = records.iter_mut().find(|r| r.id == target) else {
                    return Ok(UpdateOutcome::UnknownId);
                };
                if !record.apply(&field) {
                    return Ok(UpdateOutcome::Refused);
                }
                write_records(path, &records)?;
                Ok(UpdateOutcome::Updated)
            })
            .await?;

        match outcome {
            UpdateOutcome::Updated => debug!("Trade {} field {} updated", id, key),
            UpdateOutcome::UnknownId => debug!("Update of unknown trade {} ignored", id),
            UpdateOutcome::Refused => warn!("Refusing to reset sl_moved on trade {}", id),
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let target = id.to_string();
        let removed = self
            .with_file(move |path| {
                let mut records = records_for_update(path)?;
                let before = records.len();
                records.retain(|r| r.id != target);
                if records.len() == before {
                    return Ok(false);
                }
                write_records(path, &records)?;
                Ok(true)
            })
            .await?;

        if removed {
            info!("Trade {} removed from {}", id, self.path.display());
        } else {
            debug!("Removal of unknown trade {} ignored", id);
        }
        Ok(())
    }
}
