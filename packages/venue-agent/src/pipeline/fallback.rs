//! Page-by-page extraction for tasks whose conversation produced nothing.
//!
//! When the main loop ends without records, the accumulated conversation is
//! usually too long to retry. Instead every fetched page is sent on its own
//! in a fresh conversation, with the backend already restricted to
//! extraction.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::traits::Backend;
use crate::types::{Record, Turn};

/// What the fallback pass produced.
#[derive(Debug, Default)]
pub struct FallbackOutput {
    pub records: Vec<Record>,
    pub backend_time: Duration,
    /// Pages sent to the backend, including a failed one
    pub attempted: usize,
    /// The execution error that stopped the pass early, if any
    pub error: Option<BackendError>,
}

/// Runs one extraction-only conversation per page block.
pub struct FallbackExtractor<'a> {
    cancel: &'a CancellationToken,
}

impl<'a> FallbackExtractor<'a> {
    pub fn new(cancel: &'a CancellationToken) -> Self {
        Self { cancel }
    }

    /// Extract from every page block after the first.
    ///
    /// The first block is the seed page, which the main conversation already
    /// saw in full. The caller is expected to have forced the backend into
    /// extraction-only mode; resets keep that mode. Stops at the first
    /// failed execution.
    pub async fn extract(&self, backend: &mut dyn Backend, pages: &[String]) -> FallbackOutput {
        let mut output = FallbackOutput::default();

        for (index, block) in pages.iter().enumerate().skip(1) {
            backend.reset_conversation();
            backend.add_turn(Turn::user(block.as_str()));
            output.attempted += 1;

            match backend.execute(self.cancel).await {
                Ok(execution) => {
                    output.backend_time += execution.duration;
                    let before = output.records.len();
                    for action in &execution.actions {
                        output.records.extend_from_slice(action.records());
                    }
                    debug!(
                        backend = backend.name(),
                        page = index,
                        records = output.records.len() - before,
                        "fallback page extracted"
                    );
                }
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        page = index,
                        error = %e,
                        "fallback extraction failed, stopping"
                    );
                    output.error = Some(e);
                    break;
                }
            }
        }

        backend.reset_conversation();
        output
    }
}
