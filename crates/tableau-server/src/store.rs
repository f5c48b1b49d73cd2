//! Durable room metadata: identity, type, and timestamps. Live state
//! (members, canvas, chat) never lands here.
//!
//! Records are cached in memory and, when a directory is configured, written
//! as `<CODE>.json`. Room codes are validated `[A-Z0-9]{6}`, so a code is
//! always a safe file name. A code reused after its room was deleted gets a
//! fresh record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tableau_shared::types::{ConnectionId, RoomCode, RoomType};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ServerError;

/// Activity bumps within this many seconds of the last written value only
/// update memory.
pub const ACTIVITY_PERSIST_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub room_id: RoomCode,
    pub room_type: RoomType,
    pub creator_id: ConnectionId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl RoomRecord {
    pub fn new(room_id: RoomCode, room_type: RoomType, creator_id: ConnectionId, at: DateTime<Utc>) -> Self {
        Self {
            room_id,
            room_type,
            creator_id,
            created_at: at,
            last_activity: at,
        }
    }
}

#[derive(Debug)]
struct Cached {
    record: RoomRecord,
    /// `last_activity` as last written to disk.
    persisted_activity: DateTime<Utc>,
}

impl Cached {
    fn new(record: RoomRecord) -> Self {
        Self {
            persisted_activity: record.last_activity,
            record,
        }
    }
}

#[derive(Debug)]
pub struct RoomStore {
    records: RwLock<HashMap<RoomCode, Cached>>,
    dir: Option<PathBuf>,
}

impl RoomStore {
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            dir: None,
        }
    }

    /// Open a directory-backed store, loading any records already there.
    pub async fn open(dir: PathBuf) -> Result<Self, ServerError> {
        fs::create_dir_all(&dir).await.map_err(|e| {
            ServerError::Store(format!(
                "Failed to create room store directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let records = load_records(&dir).await?;
        info!(path = %dir.display(), rooms = records.len(), "Room store initialized");

        Ok(Self {
            records: RwLock::new(records),
            dir: Some(dir),
        })
    }

    /// Store the record of a newly created room, replacing whatever an
    /// earlier room with the same code left behind.
    pub async fn replace(&self, record: RoomRecord) -> Result<(), ServerError> {
        let mut records = self.records.write().await;
        self.write(&record).await?;
        if let Some(old) = records.insert(record.room_id.clone(), Cached::new(record)) {
            debug!(room = %old.record.room_id, "Replaced record of a deleted room");
        }
        Ok(())
    }

    pub async fn get(&self, code: &RoomCode) -> Option<RoomRecord> {
        self.records.read().await.get(code).map(|c| c.record.clone())
    }

    /// Bump `last_activity`. Unknown rooms are ignored.
    ///
    /// The file is rewritten only once the value on disk is
    /// [`ACTIVITY_PERSIST_SECS`] behind, and never under the map lock.
    pub async fn touch(&self, code: &RoomCode, at: DateTime<Utc>) -> Result<(), ServerError> {
        let to_persist = {
            let mut records = self.records.write().await;
            let Some(cached) = records.get_mut(code) else {
                return Ok(());
            };
            cached.record.last_activity = at;

            let behind = at - cached.persisted_activity;
            if self.dir.is_some() && behind >= chrono::Duration::seconds(ACTIVITY_PERSIST_SECS) {
                cached.persisted_activity = at;
                Some(cached.record.clone())
            } else {
                None
            }
        };

        match to_persist {
            Some(record) => self.write(&record).await,
            None => Ok(()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    async fn write(&self, record: &RoomRecord) -> Result<(), ServerError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| ServerError::Store(format!("Failed to encode record: {e}")))?;
        let path = record_path(dir, &record.room_id);
        fs::write(&path, body).await.map_err(|e| {
            ServerError::Store(format!("Failed to write '{}': {}", path.display(), e))
        })
    }
}

fn record_path(dir: &Path, code: &RoomCode) -> PathBuf {
    dir.join(format!("{code}.json"))
}

async fn load_records(dir: &Path) -> Result<HashMap<RoomCode, Cached>, ServerError> {
    let mut records = HashMap::new();
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| ServerError::Store(format!("Failed to read '{}': {}", dir.display(), e)))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ServerError::Store(format!("Failed to list '{}': {}", dir.display(), e)))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let parsed = fs::read(&path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice::<RoomRecord>(&bytes).map_err(|e| e.to_string()));
        match parsed {
            Ok(record) => {
                records.insert(record.room_id.clone(), Cached::new(record));
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable room record"),
        }
    }

    Ok(records)
}
