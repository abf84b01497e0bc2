//! The extraction pipeline: per-task agent loop, fallback extraction and
//! the multi-backend runner.

pub mod driver;
pub mod fallback;
pub mod prompts;
pub mod runner;
pub mod session;

pub use driver::AgentDriver;
pub use fallback::{FallbackExtractor, FallbackOutput};
pub use runner::TaskRunner;
pub use session::ExtractionSession;
