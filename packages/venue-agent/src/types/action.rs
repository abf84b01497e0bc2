//! Actions proposed by a backend and the turns sent back to it.

use std::time::Duration;

use super::record::Record;

/// Identifies the pending tool call a follow-up turn answers.
///
/// Both fields are opaque to the driver. An empty `id` means "no
/// outstanding call", e.g. the synthetic seed action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRef {
    pub id: String,
    pub tool_name: String,
}

impl CallRef {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

/// What a backend asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Fetch these pages and report their content back.
    NavigationRequest { urls: Vec<String> },

    /// Final (or partial) records; no more content needed for this call.
    Extraction { records: Vec<Record> },

    /// Nothing to do, the call still needs an acknowledgement.
    Empty,
}

/// One action from a backend execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAction {
    pub call: CallRef,
    pub kind: ActionKind,
}

impl ModelAction {
    pub fn navigate(call: CallRef, urls: Vec<String>) -> Self {
        Self {
            call,
            kind: ActionKind::NavigationRequest { urls },
        }
    }

    pub fn extraction(call: CallRef, records: Vec<Record>) -> Self {
        Self {
            call,
            kind: ActionKind::Extraction { records },
        }
    }

    pub fn empty(call: CallRef) -> Self {
        Self {
            call,
            kind: ActionKind::Empty,
        }
    }

    /// The synthetic first action of every task: visit the seed page.
    pub fn seed(url: impl Into<String>) -> Self {
        Self::navigate(CallRef::default(), vec![url.into()])
    }

    /// URLs to fetch; empty for anything but a navigation request.
    pub fn urls(&self) -> &[String] {
        match &self.kind {
            ActionKind::NavigationRequest { urls } => urls,
            _ => &[],
        }
    }

    /// Records carried by this action; empty unless it is an extraction.
    pub fn records(&self) -> &[Record] {
        match &self.kind {
            ActionKind::Extraction { records } => records,
            _ => &[],
        }
    }
}

/// The result of one successful `execute`.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub actions: Vec<ModelAction>,
    pub duration: Duration,
    /// Token usage the backend reported for this call (0 if unknown).
    pub token_count: u64,
}

/// A turn appended to a backend conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub image: Option<Vec<u8>>,
    pub text: String,
    /// `None` for a fresh user turn, otherwise the call being answered.
    pub reply_to: Option<CallRef>,
}

impl Turn {
    /// A fresh user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            image: None,
            text: text.into(),
            reply_to: None,
        }
    }

    /// A turn answering `call`, or a fresh user turn when `call` is empty.
    pub fn answer(call: &CallRef, text: impl Into<String>) -> Self {
        Self {
            image: None,
            text: text.into(),
            reply_to: (!call.is_empty()).then(|| call.clone()),
        }
    }

    /// Attach a screenshot or other image.
    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }
}
