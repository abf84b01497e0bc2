//! In-memory result store for testing and development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::traits::store::{merge_record, ResultStore, RowSet, StoreFactory};
use crate::types::PersistedRecord;

type Flushed = Arc<RwLock<HashMap<String, Vec<PersistedRecord>>>>;

/// Hands out [`MemoryStore`]s that persist into one shared map.
///
/// Data is lost when the factory is dropped.
#[derive(Clone, Default)]
pub struct MemoryStoreFactory {
    flushed: Flushed,
}

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `rows` were persisted for `backend` by an earlier run.
    pub fn with_existing(self, backend: &str, rows: Vec<PersistedRecord>) -> Self {
        write(&self.flushed).insert(backend.to_string(), rows);
        self
    }

    /// Rows last flushed for `backend`.
    pub fn flushed(&self, backend: &str) -> Vec<PersistedRecord> {
        read(&self.flushed).get(backend).cloned().unwrap_or_default()
    }

    /// Whether `backend` was flushed at all.
    pub fn was_flushed(&self, backend: &str) -> bool {
        read(&self.flushed).contains_key(backend)
    }
}

impl StoreFactory for MemoryStoreFactory {
    fn open(&self, _backend: &str) -> Box<dyn ResultStore> {
        Box::new(MemoryStore {
            flushed: Arc::clone(&self.flushed),
            rows: RowSet::new(),
        })
    }
}

/// One worker's view of a [`MemoryStoreFactory`].
pub struct MemoryStore {
    flushed: Flushed,
    rows: RowSet,
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn read_existing(&mut self, backend: &str) -> StoreResult<Vec<PersistedRecord>> {
        let existing = read(&self.flushed).get(backend).cloned().unwrap_or_default();
        for row in &existing {
            merge_record(&mut self.rows, row.clone());
        }
        Ok(existing)
    }

    fn add_record(&mut self, record: PersistedRecord) {
        merge_record(&mut self.rows, record);
    }

    async fn flush(&mut self, backend: &str) -> StoreResult<()> {
        let rows = self.rows.values().cloned().collect();
        write(&self.flushed).insert(backend.to_string(), rows);
        Ok(())
    }
}

// a panicking writer leaves the map intact, so poisoning is ignored
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(task_index: usize, name: &str) -> PersistedRecord {
        PersistedRecord {
            task_index,
            backend: "gpt".into(),
            record_name: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_flush_keeps_existing_rows() {
        let factory = MemoryStoreFactory::new().with_existing("gpt", vec![row(0, "Room A")]);

        let mut store = factory.open("gpt");
        let existing = store.read_existing("gpt").await.unwrap();
        assert_eq!(existing.len(), 1);

        store.add_record(row(1, "Room B"));
        store.flush("gpt").await.unwrap();

        let flushed = factory.flushed("gpt");
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].record_name, "Room A");
        assert_eq!(flushed[1].record_name, "Room B");
    }

    #[tokio::test]
    async fn test_backends_are_partitioned() {
        let factory = MemoryStoreFactory::new();

        let mut gpt = factory.open("gpt");
        gpt.add_record(row(0, "Room A"));
        gpt.flush("gpt").await.unwrap();

        let mut claude = factory.open("claude");
        assert!(claude.read_existing("claude").await.unwrap().is_empty());
        assert!(!factory.was_flushed("claude"));
        assert_eq!(factory.flushed("gpt").len(), 1);
    }
}
