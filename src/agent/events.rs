//! Progress events emitted by the agent loop
//!
//! Events are the only user-visible surface of a run. The wire shape matches
//! what the front end sends to observers:
//!
//! ```text
//! {"type": "status", "content": "Thinking..."}
//! {"type": "video",  "url": "http://localhost:8000/videos/out.mp4"}
//! ```

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A single progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Status { content: String },
    Log { content: String },
    Error { content: String },
    Video { url: String },
}

impl ProgressEvent {
    pub fn status(content: impl Into<String>) -> Self {
        ProgressEvent::Status {
            content: content.into(),
        }
    }

    pub fn log(content: impl Into<String>) -> Self {
        ProgressEvent::Log {
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        ProgressEvent::Error {
            content: content.into(),
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        ProgressEvent::Video { url: url.into() }
    }

    /// Short kind label, used for metrics and console prefixes
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Status { .. } => "status",
            ProgressEvent::Log { .. } => "log",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::Video { .. } => "video",
        }
    }

    /// The string payload regardless of kind
    pub fn payload(&self) -> &str {
        match self {
            ProgressEvent::Status { content }
            | ProgressEvent::Log { content }
            | ProgressEvent::Error { content } => content,
            ProgressEvent::Video { url } => url,
        }
    }
}

/// Receiver of progress events.
///
/// `emit` is synchronous on purpose: the loop calls it from the middle of a
/// turn and must never wait on the consumer.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> EventSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Prints events to stdout, used when no transport is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: ProgressEvent) {
        println!("[{}] {}", event.kind().to_uppercase(), event.payload());
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_shape() {
        let json = serde_json::to_value(ProgressEvent::status("Thinking...")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "status", "content": "Thinking..."}));
    }

    #[test]
    fn test_video_wire_shape() {
        let json = serde_json::to_value(ProgressEvent::video("http://h/videos/a.mp4")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "video", "url": "http://h/videos/a.mp4"}));
    }

    #[test]
    fn test_kind_and_payload() {
        let event = ProgressEvent::error("boom");
        assert_eq!(event.kind(), "error");
        assert_eq!(event.payload(), "boom");
    }

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: ProgressEvent| seen.lock().unwrap().push(event);
        sink.emit(ProgressEvent::log("one"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(ProgressEvent::status("a"));
        sink.emit(ProgressEvent::log("b"));
        let kinds: Vec<_> = sink.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["status", "log"]);
    }
}
