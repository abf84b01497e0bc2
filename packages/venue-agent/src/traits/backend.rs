//! The contract every model backend satisfies.
//!
//! A backend owns one conversation. The driver only appends turns, asks for
//! the next actions and flips the tool-selection mode; how the conversation
//! is represented on the wire (function calling, tool-use blocks, replayed
//! chat history) stays private to each implementation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BackendResult;
use crate::types::{Execution, Turn};

/// A stateful model backend.
///
/// Instances are driven by exactly one worker at a time, so every mutating
/// method takes `&mut self` and no internal locking is needed.
#[async_trait]
pub trait Backend: Send {
    /// Identity used in logs, store rows and result file names.
    fn name(&self) -> &str;

    /// Whether image parts in turns are forwarded to the model.
    fn supports_images(&self) -> bool;

    /// Append a turn.
    ///
    /// A turn without `reply_to` is a fresh user turn. A turn with
    /// `reply_to` answers that outstanding call; implementations must accept
    /// answers in any order and interleaved with acknowledgements.
    fn add_turn(&mut self, turn: Turn);

    /// Send the conversation and return the actions the model chose.
    ///
    /// The call races `cancel`; a cancelled call returns
    /// [`BackendError::Cancelled`](crate::error::BackendError::Cancelled).
    async fn execute(&mut self, cancel: &CancellationToken) -> BackendResult<Execution>;

    /// Drop all accumulated turns. Safe before the first turn.
    ///
    /// The tool-selection mode is kept, so a backend forced into
    /// extraction-only mode stays there across resets.
    fn reset_conversation(&mut self);

    /// Start a task's tool-selection mode.
    ///
    /// `true` biases the next execute toward requesting more content;
    /// `false` lets the model pick. Either way this leaves extraction-only
    /// mode.
    fn set_guided(&mut self, guided: bool);

    /// Only allow extraction actions until the next `set_guided`.
    fn force_extraction_only(&mut self);
}

/// Tool-selection mode shared by the concrete backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolMode {
    /// The model must call some tool
    #[default]
    Any,

    /// The model must request more content
    Navigate,

    /// The model must report records
    ExtractOnly,
}
