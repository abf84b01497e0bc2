//! CSV result store: one `{backend}output.csv` file per backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{merge_record, ResultStore, RowSet, StoreFactory};
use crate::types::PersistedRecord;

/// Opens [`CsvStore`]s in one output directory.
#[derive(Debug, Clone)]
pub struct CsvStoreFactory {
    dir: PathBuf,
}

impl CsvStoreFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl StoreFactory for CsvStoreFactory {
    fn open(&self, _backend: &str) -> Box<dyn ResultStore> {
        Box::new(CsvStore::new(&self.dir))
    }
}

/// Accumulates rows in memory and rewrites the backend's file on flush.
pub struct CsvStore {
    dir: PathBuf,
    rows: RowSet,
}

impl CsvStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            rows: RowSet::new(),
        }
    }

    /// File holding `backend`'s rows.
    pub fn path_for(&self, backend: &str) -> PathBuf {
        self.dir.join(format!("{}output.csv", file_stem(backend)))
    }
}

#[async_trait]
impl ResultStore for CsvStore {
    async fn read_existing(&mut self, backend: &str) -> StoreResult<Vec<PersistedRecord>> {
        let path = self.path_for(backend);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no existing results");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let existing = ::csv::Reader::from_reader(bytes.as_slice())
            .deserialize()
            .collect::<Result<Vec<PersistedRecord>, _>>()?;

        for row in &existing {
            merge_record(&mut self.rows, row.clone());
        }
        debug!(path = %path.display(), rows = existing.len(), "loaded existing results");
        Ok(existing)
    }

    fn add_record(&mut self, record: PersistedRecord) {
        merge_record(&mut self.rows, record);
    }

    async fn flush(&mut self, backend: &str) -> StoreResult<()> {
        let mut writer = ::csv::Writer::from_writer(Vec::new());
        for row in self.rows.values() {
            writer.serialize(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(backend);
        tokio::fs::write(&path, bytes).await?;

        info!(path = %path.display(), rows = self.rows.len(), "results written");
        Ok(())
    }
}

/// Replace characters that would escape the output directory or break
/// common filesystems.
fn file_stem(backend: &str) -> String {
    backend
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
