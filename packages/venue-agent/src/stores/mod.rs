//! Result store implementations.
//!
//! Available backends:
//! - `CsvStore` - one CSV file per backend (what the CLI uses)
//! - `MemoryStore` - in-memory rows shared through a factory, for tests

pub mod csv;
pub mod memory;

pub use self::csv::{CsvStore, CsvStoreFactory};
pub use memory::{MemoryStore, MemoryStoreFactory};
