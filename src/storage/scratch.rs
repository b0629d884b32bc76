//! Restart-surviving snapshots of in-flight timers. Kept apart from the record store: a snapshot
//! is overwritten on every timer transition and never holds finished records.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::fs::operations::{read_optional, write_atomically};

use super::entities::{duration_ser, ProjectId, RecordId, SessionType, TaskCategory};

/// Lookup key for a timer target. Only identifiers go here, never the target itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKey {
    Project {
        project_id: ProjectId,
    },
    Focus {
        session_type: SessionType,
        category: TaskCategory,
        #[serde(with = "duration_ser")]
        planned_duration: Duration,
        #[serde(default)]
        task_title: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScratchSnapshot {
    Idle,
    Active(ActiveSnapshot),
}

/// Everything needed to resume a timer after the process died.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSnapshot {
    pub target: TargetKey,
    pub record_id: RecordId,
    pub started_at: DateTime<Utc>,
    pub notes: String,
    pub is_paused: bool,
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(with = "duration_ser")]
    pub accumulated_pause: Duration,
    #[serde(default)]
    pub interruptions: u32,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("snapshot pause flag ({is_paused}) disagrees with pause time presence ({has_paused_at})")]
    PauseMismatch { is_paused: bool, has_paused_at: bool },
    #[error("snapshot has negative accumulated pause {0}")]
    NegativePause(Duration),
    #[error("snapshot target {found:?} can't be tracked by the {expected} timer")]
    WrongTarget {
        expected: &'static str,
        found: TargetKey,
    },
}

impl ActiveSnapshot {
    /// Checks the invariants serde can't express.
    pub fn validate(self) -> Result<Self, SnapshotError> {
        if self.is_paused != self.paused_at.is_some() {
            return Err(SnapshotError::PauseMismatch {
                is_paused: self.is_paused,
                has_paused_at: self.paused_at.is_some(),
            });
        }
        if self.accumulated_pause < Duration::zero() {
            return Err(SnapshotError::NegativePause(self.accumulated_pause));
        }
        Ok(self)
    }
}

impl ScratchSnapshot {
    pub fn parse(value: Value) -> Result<Self, SnapshotError> {
        match serde_json::from_value::<ScratchSnapshot>(value)? {
            ScratchSnapshot::Idle => Ok(ScratchSnapshot::Idle),
            ScratchSnapshot::Active(active) => Ok(ScratchSnapshot::Active(active.validate()?)),
        }
    }
}

/// Small key-value persistence surviving process restarts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScratchStore: Send + Sync {
    /// Overwrites the value stored under `key`.
    async fn write(&self, key: &str, snapshot: &ScratchSnapshot) -> Result<()>;

    /// Missing keys are `Ok(None)`. Unreadable or invalid values are errors.
    async fn read(&self, key: &str) -> Result<Option<ScratchSnapshot>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<T: ScratchStore + ?Sized> ScratchStore for Arc<T> {
    async fn write(&self, key: &str, snapshot: &ScratchSnapshot) -> Result<()> {
        (**self).write(key, snapshot).await
    }

    async fn read(&self, key: &str) -> Result<Option<ScratchSnapshot>> {
        (**self).read(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}

/// [ScratchStore] keeping all keys in one JSON object on disk.
pub struct FileScratchStore {
    path: PathBuf,
    // Serializes read-modify-write cycles of the document within the process.
    guard: Mutex<()>,
}

impl FileScratchStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, Value>> {
        match read_optional(&self.path).await? {
            Some(contents) if !contents.trim().is_empty() => serde_json::from_str(&contents)
                .with_context(|| format!("Scratch file {:?} is corrupted", self.path)),
            _ => Ok(BTreeMap::new()),
        }
    }

    /// Like `load`, but a corrupted document is dropped so new writes can proceed.
    async fn load_for_update(&self) -> Result<BTreeMap<String, Value>> {
        match self.load().await {
            Ok(entries) => Ok(entries),
            Err(e) if e.downcast_ref::<std::io::Error>().is_some() => Err(e),
            Err(e) => {
                warn!("Discarding unreadable scratch state: {e:?}");
                Ok(BTreeMap::new())
            }
        }
    }

    async fn store(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(entries)?;
        write_atomically(&self.path, &serialized)
            .await
            .with_context(|| format!("Failed to write scratch file {:?}", self.path))
    }
}

#[async_trait]
impl ScratchStore for FileScratchStore {
    async fn write(&self, key: &str, snapshot: &ScratchSnapshot) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut entries = self.load_for_update().await?;
        entries.insert(key.to_string(), serde_json::to_value(snapshot)?);
        self.store(&entries).await?;
        debug!("Wrote scratch snapshot {key}");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<ScratchSnapshot>> {
        let _guard = self.guard.lock().await;
        let mut entries = self.load().await?;
        let Some(value) = entries.remove(key) else {
            return Ok(None);
        };
        Ok(Some(ScratchSnapshot::parse(value)?))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut entries = self.load_for_update().await?;
        if entries.remove(key).is_some() {
            self.store(&entries).await?;
            debug!("Deleted scratch snapshot {key}");
        }
        Ok(())
    }
}
