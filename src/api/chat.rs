use std::convert::Infallible;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::models::PostMessageRequest;
use crate::session::MessageSink;
use crate::state::AppState;

const EVENT_BUFFER: usize = 64;

/// POST /api/sessions/:id/messages - Handle one message, replies as SSE
///
/// Events: `message` (a complete message), `typing`, `stream_start`,
/// `delta`, `stream_end`, `error` (the handler itself failed) and a final
/// `done`.
pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> std::result::Result<
    Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>,
    (StatusCode, String),
> {
    let session = state
        .session(&id)
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;

    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message content is required".to_string()));
    }

    let (tx, rx) = mpsc::channel::<Event>(EVENT_BUFFER);
    let done_tx = tx.clone();

    tokio::spawn(async move {
        let handler = tokio::spawn(async move {
            // One message at a time per session.
            let mut session = session.lock().await;
            let mut sink = SseSink { tx };
            if let Err(e) = session.handle_message(&content, &mut sink).await {
                tracing::warn!("Session {id}: {e}");
            }
        });

        if let Err(e) = handler.await {
            tracing::error!("Session {id}: message handler failed: {e}");
            let failure = json!({ "message": "Internal error while handling the message" });
            let _ = done_tx.send(event("error", failure)).await;
        }
        let _ = done_tx.send(event("done", json!({}))).await;
    });

    let events = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|ev| (Ok(ev), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn event(name: &str, data: serde_json::Value) -> Event {
    Event::default().event(name).data(data.to_string())
}

/// Forwards session output to the SSE response.
struct SseSink {
    tx: mpsc::Sender<Event>,
}

impl SseSink {
    async fn emit(&mut self, name: &str, data: serde_json::Value) -> Result<()> {
        self.tx
            .send(event(name, data))
            .await
            .map_err(|_| ChatError::Sink("client disconnected".to_string()))
    }
}

#[async_trait]
impl MessageSink for SseSink {
    async fn send(&mut self, text: &str) -> Result<()> {
        self.emit("message", json!({ "content": text })).await
    }

    async fn send_typing(&mut self) -> Result<()> {
        self.emit("typing", json!({})).await
    }

    async fn start_stream(&mut self) -> Result<()> {
        self.emit("stream_start", json!({})).await
    }

    async fn append(&mut self, fragment: &str) -> Result<()> {
        self.emit("delta", json!({ "content": fragment })).await
    }

    async fn end_stream(&mut self) -> Result<()> {
        self.emit("stream_end", json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = SseSink { tx };
        let err = sink.send("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Sink(_)));
    }

    #[tokio::test]
    async fn test_sink_forwards_each_call() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = SseSink { tx };
        sink.start_stream().await.unwrap();
        sink.append("Hel").await.unwrap();
        sink.append("lo").await.unwrap();
        sink.end_stream().await.unwrap();
        drop(sink);

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
    }
}
