//! Trait seams between the driver and its collaborators.

pub mod backend;
pub mod browser;
pub mod store;

pub use backend::{Backend, ToolMode};
pub use browser::{BrowserLauncher, BrowserSession};
pub use store::{merge_record, ResultStore, RowSet, StoreFactory};
