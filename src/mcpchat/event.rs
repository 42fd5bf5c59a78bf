//! Chat pipeline event system.
//!
//! Implement [`EventHandler`] to observe a chat request as it moves through discovery,
//! planning, execution and summarization. Every [`ChatEvent`] carries the `request_id`
//! assigned by the orchestrator so handlers can correlate events of concurrent requests.
//!
//! Handlers are purely observational: they are awaited inline, but nothing they do can change
//! the outcome of a request.
//!
//! # Event Flow
//!
//! ```text
//! RequestStarted
//!   └─ ToolsDiscovered
//!   └─ PlanReady | PlanUnparseable
//!   └─ (for each step)
//!       ├─ StepStarted
//!       └─ StepCompleted | StepFailed
//!   └─ SummaryProduced
//! RequestFinished
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use mcpchat::event::{ChatEvent, EventHandler};
//!
//! struct StepPrinter;
//!
//! #[async_trait]
//! impl EventHandler for StepPrinter {
//!     async fn on_chat_event(&self, event: &ChatEvent) {
//!         if let ChatEvent::StepCompleted { request_id, index, label, .. } = event {
//!             println!("[{}] step {} ({}) done", request_id, index, label);
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;

/// Events emitted while a single chat request is processed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A chat request entered the orchestrator.
    RequestStarted {
        request_id: String,
        /// First ~120 characters of the question.
        message_preview: String,
    },

    /// The gateway returned its tool list.
    ToolsDiscovered {
        request_id: String,
        tool_names: Vec<String>,
    },

    /// The planning output decoded into a plan.
    PlanReady {
        request_id: String,
        step_count: usize,
        has_direct_answer: bool,
    },

    /// The planning output could not be decoded; the raw text becomes the answer.
    PlanUnparseable { request_id: String, error: String },

    /// A plan step is about to run. `index` is 0-based.
    StepStarted {
        request_id: String,
        index: usize,
        label: String,
    },

    /// A plan step produced a result.
    StepCompleted {
        request_id: String,
        index: usize,
        label: String,
        output_length: usize,
    },

    /// A plan step failed; no later step runs.
    StepFailed {
        request_id: String,
        index: usize,
        label: String,
        error: String,
    },

    /// The summarizer finished. `error` is set when it degraded.
    SummaryProduced {
        request_id: String,
        content_length: usize,
        error: Option<String>,
    },

    /// Terminal event of every request, successful or not.
    RequestFinished {
        request_id: String,
        /// Short error tag when the request failed.
        error: Option<String>,
        elapsed_ms: u128,
    },
}

impl ChatEvent {
    pub fn request_id(&self) -> &str {
        match self {
            ChatEvent::RequestStarted { request_id, .. }
            | ChatEvent::ToolsDiscovered { request_id, .. }
            | ChatEvent::PlanReady { request_id, .. }
            | ChatEvent::PlanUnparseable { request_id, .. }
            | ChatEvent::StepStarted { request_id, .. }
            | ChatEvent::StepCompleted { request_id, .. }
            | ChatEvent::StepFailed { request_id, .. }
            | ChatEvent::SummaryProduced { request_id, .. }
            | ChatEvent::RequestFinished { request_id, .. } => request_id,
        }
    }
}

/// Receiver for [`ChatEvent`]s.
///
/// The `Send + Sync` bound lets one handler be shared across concurrent requests via
/// `Arc<dyn EventHandler>`; keep internal state behind atomics or mutexes.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called for every event. The default implementation is a no-op.
    async fn on_chat_event(&self, _event: &ChatEvent) {}
}

/// Single-line, length-bounded preview of user text for logs and events.
pub fn preview_message(text: &str) -> String {
    const MAX_PREVIEW_CHARS: usize = 120;

    let normalized = text.replace('\n', " ").replace('\r', "");
    let mut chars = normalized.chars();
    let preview: String = chars.by_ref().take(MAX_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_single_line_and_char_bounded() {
        assert_eq!(preview_message("北京\n今天\r\n天气"), "北京 今天 天气");
        let long = "天".repeat(200);
        let preview = preview_message(&long);
        assert_eq!(preview.chars().count(), 123);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn every_event_exposes_its_request_id() {
        let event = ChatEvent::StepFailed {
            request_id: "r-1".into(),
            index: 0,
            label: "tool:weather".into(),
            error: "boom".into(),
        };
        assert_eq!(event.request_id(), "r-1");
    }
}
