//! Durable queue, dead-letter, and conflict storage over redb.
//!
//! Three tables, one per namespace, all keyed by record id with JSON
//! values. Every write commits before the call returns, so a process
//! restart never loses a queued mutation. The store is single-writer
//! (only the sync manager mutates it); reads for status displays are
//! safe to run concurrently.

use std::path::PathBuf;
use std::sync::Arc;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use mnemo_core::{ConflictRecord, DeadLetterItem, SyncQueueItem};

use crate::error::StoreError;

// Key: queue item id, Value: serialized SyncQueueItem
const SYNC_QUEUE: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_queue");

// Key: queue item id, Value: serialized DeadLetterItem
const DEAD_LETTER: TableDefinition<&str, &[u8]> = TableDefinition::new("dead_letter");

// Key: conflict record id, Value: serialized ConflictRecord
const CONFLICTS: TableDefinition<&str, &[u8]> = TableDefinition::new("conflicts");

/// Configuration for the durable store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the database file.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/mnemo-sync.redb"),
        }
    }
}

/// Durable store for pending mutations, dead letters, and conflicts.
pub struct SyncStore {
    db: Arc<Database>,
}

impl SyncStore {
    /// Open or create the database and ensure all tables exist.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let db = Database::create(&config.db_path).map_err(|e| StoreError::Io(e.to_string()))?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;

        info!(path = %config.db_path.display(), "opened sync store");
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Io(e.to_string()))?;

        write_txn
            .open_table(SYNC_QUEUE)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        write_txn
            .open_table(DEAD_LETTER)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        write_txn
            .open_table(CONFLICTS)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        write_txn
            .commit()
            .map_err(|e| StoreError::Io(e.to_string()))?;

        debug!("initialized sync store tables");
        Ok(())
    }

    // --- active queue ---

    /// Persist a queue item. Durable once this returns. Also used to
    /// persist updated retry bookkeeping (insert overwrites).
    pub fn enqueue(&self, item: &SyncQueueItem) -> Result<(), StoreError> {
        self.put(SYNC_QUEUE, &item.id, item)
    }

    pub fn get_item(&self, id: &str) -> Result<Option<SyncQueueItem>, StoreError> {
        self.get(SYNC_QUEUE, id)
    }

    /// All pending items, ordered by `enqueued_at` ascending (FIFO).
    /// The enqueue sequence breaks same-millisecond ties so enqueue
    /// order is preserved exactly.
    pub fn list_pending(&self) -> Result<Vec<SyncQueueItem>, StoreError> {
        let mut items: Vec<SyncQueueItem> = self.scan(SYNC_QUEUE)?;
        items.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.seq.cmp(&b.seq))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(items)
    }

    /// Remove a queue item. Idempotent: removing a missing id is not an
    /// error.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        self.delete(SYNC_QUEUE, id)
    }

    pub fn pending_count(&self) -> Result<u64, StoreError> {
        self.count(SYNC_QUEUE)
    }

    /// Remove every pending item in one transaction. Returns how many
    /// were dropped.
    pub fn clear_pending(&self) -> Result<u64, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let cleared = {
            let mut table = write_txn
                .open_table(SYNC_QUEUE)
                .map_err(|e| StoreError::Io(e.to_string()))?;
            let ids: Vec<String> = {
                let mut ids = Vec::new();
                for entry in table.iter().map_err(|e| StoreError::Io(e.to_string()))? {
                    let (key, _) = entry.map_err(|e| StoreError::Io(e.to_string()))?;
                    ids.push(key.value().to_string());
                }
                ids
            };
            for id in &ids {
                table
                    .remove(id.as_str())
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            }
            ids.len() as u64
        };
        write_txn
            .commit()
            .map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(cleared)
    }

    // --- dead letters ---

    /// Atomically remove an item from the active queue and record it in
    /// the dead-letter namespace with a `moved_at` timestamp. One write
    /// transaction spans both tables, so a crash cannot leave the item
    /// in both places or neither.
    pub fn move_to_dead_letter(&self, item: &SyncQueueItem) -> Result<(), StoreError> {
        let dead = DeadLetterItem::new(item.clone());
        let encoded = serde_json::to_vec(&dead).map_err(|e| StoreError::Corrupt {
            id: item.id.clone(),
            message: e.to_string(),
        })?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut queue = write_txn
                .open_table(SYNC_QUEUE)
                .map_err(|e| StoreError::Io(e.to_string()))?;
            queue
                .remove(item.id.as_str())
                .map_err(|e| StoreError::Io(e.to_string()))?;

            let mut dead_letter = write_txn
                .open_table(DEAD_LETTER)
                .map_err(|e| StoreError::Io(e.to_string()))?;
            dead_letter
                .insert(item.id.as_str(), encoded.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Io(e.to_string()))?;

        debug!(item = %item.id, "moved item to dead letter");
        Ok(())
    }

    /// All dead-lettered items, oldest first.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetterItem>, StoreError> {
        let mut items: Vec<DeadLetterItem> = self.scan(DEAD_LETTER)?;
        items.sort_by(|a, b| {
            a.moved_at
                .cmp(&b.moved_at)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        Ok(items)
    }

    pub fn get_dead_letter(&self, id: &str) -> Result<Option<DeadLetterItem>, StoreError> {
        self.get(DEAD_LETTER, id)
    }

    pub fn remove_dead_letter(&self, id: &str) -> Result<bool, StoreError> {
        self.delete(DEAD_LETTER, id)
    }

    pub fn dead_letter_count(&self) -> Result<u64, StoreError> {
        self.count(DEAD_LETTER)
    }

    // --- conflicts ---

    pub fn put_conflict(&self, record: &ConflictRecord) -> Result<(), StoreError> {
        self.put(CONFLICTS, &record.id, record)
    }

    pub fn get_conflict(&self, id: &str) -> Result<Option<ConflictRecord>, StoreError> {
        self.get(CONFLICTS, id)
    }

    /// All unresolved conflicts, oldest first.
    pub fn list_conflicts(&self) -> Result<Vec<ConflictRecord>, StoreError> {
        let mut records: Vec<ConflictRecord> = self.scan(CONFLICTS)?;
        records.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    pub fn remove_conflict(&self, id: &str) -> Result<bool, StoreError> {
        self.delete(CONFLICTS, id)
    }

    pub fn conflict_count(&self) -> Result<u64, StoreError> {
        self.count(CONFLICTS)
    }

    // --- generic table plumbing ---

    fn put<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(record).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            message: e.to_string(),
        })?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(table)
                .map_err(|e| StoreError::Io(e.to_string()))?;
            table
                .insert(id, encoded.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let table = read_txn
            .open_table(table)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        match table.get(id).map_err(|e| StoreError::Io(e.to_string()))? {
            Some(guard) => {
                let record =
                    serde_json::from_slice(guard.value()).map_err(|e| StoreError::Corrupt {
                        id: id.to_string(),
                        message: e.to_string(),
                    })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, table: TableDefinition<&str, &[u8]>, id: &str) -> Result<bool, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let removed = {
            let mut table = write_txn
                .open_table(table)
                .map_err(|e| StoreError::Io(e.to_string()))?;
            table
                .remove(id)
                .map_err(|e| StoreError::Io(e.to_string()))?
                .is_some()
        };
        write_txn
            .commit()
            .map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(removed)
    }

    fn scan<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<T>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let table = read_txn
            .open_table(table)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let mut records = Vec::new();
        for entry in table.iter().map_err(|e| StoreError::Io(e.to_string()))? {
            let (key, value) = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let record =
                serde_json::from_slice(value.value()).map_err(|e| StoreError::Corrupt {
                    id: key.value().to_string(),
                    message: e.to_string(),
                })?;
            records.push(record);
        }
        Ok(records)
    }

    fn count(&self, table: TableDefinition<&str, &[u8]>) -> Result<u64, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let table = read_txn
            .open_table(table)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        table.len().map_err(|e| StoreError::Io(e.to_string()))
    }
}
