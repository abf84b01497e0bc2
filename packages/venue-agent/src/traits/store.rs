//! Result store contract.

use async_trait::async_trait;
use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::error::StoreResult;
use crate::types::outcome::MergeKey;
use crate::types::PersistedRecord;

/// Accumulates one worker's rows and persists them.
///
/// Each worker owns its own store instance, partitioned by backend name, so
/// no cross-worker locking is required.
#[async_trait]
pub trait ResultStore: Send {
    /// Rows already persisted for `backend`.
    ///
    /// Also seeds the store with them, so a later `flush` keeps them.
    async fn read_existing(&mut self, backend: &str) -> StoreResult<Vec<PersistedRecord>>;

    /// Add a row, merging with an existing row of the same
    /// [`merge_key`](PersistedRecord::merge_key).
    ///
    /// On conflict the new row replaces the old one, except that a non-zero
    /// token count survives a new zero.
    fn add_record(&mut self, record: PersistedRecord);

    /// Persist every accumulated row for `backend`.
    async fn flush(&mut self, backend: &str) -> StoreResult<()>;
}

/// Creates one store per worker.
pub trait StoreFactory: Send + Sync {
    fn open(&self, backend: &str) -> Box<dyn ResultStore>;
}

/// Rows in insertion order, keyed for merging.
pub type RowSet = IndexMap<MergeKey, PersistedRecord>;

/// Merge `record` into `rows` using the store's conflict rule.
pub fn merge_record(rows: &mut RowSet, mut record: PersistedRecord) {
    match rows.entry(record.merge_key()) {
        Entry::Occupied(mut slot) => {
            if record.token_count == 0 {
                record.token_count = slot.get().token_count;
            }
            slot.insert(record);
        }
        Entry::Vacant(slot) => {
            slot.insert(record);
        }
    }
}
