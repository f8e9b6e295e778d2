use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// One event on the incremental delivery stream.
///
/// Events are emitted strictly in the order the state machine produces
/// them; a stream ends with exactly one `Complete` or `Error`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A handler invocation is starting.
    Thinking { author: String },
    /// A handler finished and contributed this segment.
    Response { author: String, content: String },
    /// Terminal: the merged reply.
    Complete { content: String, metadata: Value },
    /// Terminal: the turn failed.
    Error { kind: String, content: String },
}

pub type EventSink = mpsc::Sender<ChatEvent>;

/// Final result of one blocking chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response_text: String,
    pub metadata: Value,
}

/// Emit on the sink when one is attached. A dropped receiver stops further
/// emission; the turn itself keeps running.
pub(crate) async fn emit(sink: Option<&EventSink>, event: ChatEvent) {
    if let Some(tx) = sink {
        let _ = tx.send(event).await;
    }
}
