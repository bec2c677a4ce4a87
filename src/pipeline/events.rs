//! Typed streaming events.
//!
//! A streaming request writes these events to an `mpsc` sink; the
//! transport adapter turns them into `text/event-stream` records. Exactly
//! one of `complete` or `error` terminates a well-formed sequence, and
//! `completion` values are non-decreasing across `progress` and `chunk`
//! events.

use serde::Serialize;
use uuid::Uuid;

use crate::model::ScoredAnswer;

/// Pipeline phase reported by progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    AnalyzingIntent,
    DirectResponse,
    Retrieving,
    Analyzing,
    Generating,
}

impl ProgressStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::AnalyzingIntent => "analyzing_intent",
            ProgressStatus::DirectResponse => "direct_response",
            ProgressStatus::Retrieving => "retrieving",
            ProgressStatus::Analyzing => "analyzing",
            ProgressStatus::Generating => "generating",
        }
    }
}

/// One event of a streamed response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Emitted first, once.
    Start {
        id: Uuid,
        query: String,
        timestamp: f64,
    },
    /// Phase-boundary progress.
    Progress {
        status: ProgressStatus,
        completion: f32,
    },
    /// One LLM token slice.
    Chunk { text: String, completion: f32 },
    /// Terminal success; exactly once, never after cancellation.
    Complete(Box<ScoredAnswer>),
    /// Terminal failure; exactly once, no `complete` follows.
    Error { message: String },
}

impl StreamEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Progress { .. } => "progress",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Complete(_) => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// JSON body for the SSE `data:` field.
    pub fn data(&self) -> serde_json::Value {
        match self {
            StreamEvent::Start {
                id,
                query,
                timestamp,
            } => serde_json::json!({
                "id": id,
                "query": query,
                "timestamp": timestamp,
            }),
            StreamEvent::Progress { status, completion } => serde_json::json!({
                "status": status.as_str(),
                "completion": completion,
            }),
            StreamEvent::Chunk { text, completion } => serde_json::json!({
                "text": text,
                "completion": completion,
            }),
            StreamEvent::Complete(answer) => {
                serde_json::to_value(answer).unwrap_or(serde_json::Value::Null)
            }
            StreamEvent::Error { message } => serde_json::json!({
                "error": message,
            }),
        }
    }

    /// The completion value carried by this event, if any.
    pub fn completion(&self) -> Option<f32> {
        match self {
            StreamEvent::Progress { completion, .. } | StreamEvent::Chunk { completion, .. } => {
                Some(*completion)
            }
            _ => None,
        }
    }
}

/// Sink for streamed events.
pub type EventSink = tokio::sync::mpsc::Sender<StreamEvent>;
