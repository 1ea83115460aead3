use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::{ChatModel, ChatStream, Provider};
use crate::config::LlmConfig;
use crate::models::ChatMessage;

/// Generation can legitimately outlast the client-wide request timeout.
const STREAM_TIMEOUT_SECS: u64 = 300;

/// Streaming chat client for the configured provider.
#[derive(Clone)]
pub struct HttpChatModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpChatModel {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn stream(&self, prompt: String, temperature: f32) -> Result<ChatStream> {
        stream_chat(
            &self.client,
            &self.config,
            &[ChatMessage::user(prompt)],
            temperature,
        )
        .await
    }
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
}

/// Send a streaming chat request and return its text deltas.
///
/// Connection and HTTP status failures are returned directly; failures after
/// the response started arrive as `Err` items.
pub async fn stream_chat(
    client: &reqwest::Client,
    config: &LlmConfig,
    messages: &[ChatMessage],
    temperature: f32,
) -> Result<ChatStream> {
    let provider = Provider::parse(&config.provider)?;

    let request = client
        .post(chat_endpoint(provider, &config.base_url))
        .timeout(Duration::from_secs(STREAM_TIMEOUT_SECS));
    let request = match provider {
        Provider::Ollama => request.json(&OllamaChatRequest {
            model: &config.chat_model,
            messages,
            stream: true,
            options: OllamaOptions { temperature },
        }),
        Provider::OpenAi => request
            .bearer_auth(config.api_key.as_deref().unwrap_or_default())
            .json(&OpenAiChatRequest {
                model: &config.chat_model,
                messages,
                stream: true,
                temperature,
            }),
    };

    let resp = request
        .send()
        .await
        .with_context(|| format!("Failed to connect to {provider} for chat streaming"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("{provider} chat API returned {status}: {body}");
    }

    let deltas = stream_lines(resp.bytes_stream()).filter_map(move |line| {
        future::ready(match line {
            Ok(line) => parse_line(provider, &line),
            Err(e) => Some(Err(e)),
        })
    });

    Ok(Box::pin(deltas))
}

fn chat_endpoint(provider: Provider, base_url: &str) -> String {
    match provider {
        Provider::Ollama => format!("{base_url}/api/chat"),
        Provider::OpenAi => format!("{base_url}/v1/chat/completions"),
    }
}

/// Turn one response line into a delta.
///
/// `None` means the line carries no text: blank lines, SSE comments and
/// event names, role-only or empty deltas, and end-of-stream markers.
fn parse_line(provider: Provider, line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let content = match provider {
        Provider::Ollama => parse_ollama(line),
        Provider::OpenAi => {
            let data = line.strip_prefix("data:")?.trim();
            if data == "[DONE]" {
                return None;
            }
            parse_openai(data)
        }
    };

    match content {
        Ok(Some(text)) if !text.is_empty() => Some(Ok(text)),
        Ok(_) => None,
        Err(e) => Some(Err(e)),
    }
}

// ─── Ollama: one JSON object per line ────────────────────

#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaDelta>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct OllamaDelta {
    #[serde(default)]
    content: String,
}

fn parse_ollama(line: &str) -> Result<Option<String>> {
    let chunk: OllamaChunk =
        serde_json::from_str(line).context("Failed to parse Ollama chunk")?;
    if chunk.done {
        return Ok(None);
    }
    Ok(chunk.message.map(|m| m.content))
}

// ─── OpenAI: `data:` lines of an SSE stream ──────────────

#[derive(Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    delta: OpenAiDelta,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

fn parse_openai(data: &str) -> Result<Option<String>> {
    let chunk: OpenAiChunk =
        serde_json::from_str(data).context("Failed to parse OpenAI chunk")?;
    Ok(chunk.choices.into_iter().next().and_then(|c| c.delta.content))
}

// ─── Line buffering ──────────────────────────────────────

/// Split a byte stream into non-blank lines.
///
/// Bytes are buffered until a newline arrives, so multi-byte characters split
/// across network reads are decoded intact.
fn stream_lines<E>(
    bytes: impl Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send
where
    E: std::fmt::Display + Send + 'static,
{
    futures_util::stream::unfold(
        (Box::pin(bytes), Vec::<u8>::new(), false),
        |(mut bytes, mut pending, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                    let rest = pending.split_off(pos + 1);
                    let line = String::from_utf8_lossy(&pending[..pos]).into_owned();
                    pending = rest;
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some((Ok(line), (bytes, pending, false)));
                }

                match bytes.next().await {
                    Some(Ok(read)) => pending.extend_from_slice(&read),
                    Some(Err(e)) => {
                        let err = anyhow::anyhow!("Stream read error: {e}");
                        return Some((Err(err), (bytes, pending, true)));
                    }
                    None => {
                        let tail = String::from_utf8_lossy(&pending).into_owned();
                        if tail.trim().is_empty() {
                            return None;
                        }
                        return Some((Ok(tail), (bytes, Vec::new(), true)));
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn collect_ok(provider: Provider, lines: &[&str]) -> Vec<String> {
        lines
            .iter()
            .filter_map(|l| parse_line(provider, l))
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_endpoints_per_provider() {
        assert_eq!(
            chat_endpoint(Provider::Ollama, "http://localhost:11434"),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            chat_endpoint(Provider::OpenAi, "https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_ollama_stream_yields_content_until_done() {
        let lines = [
            r#"{"message":{"role":"assistant","content":"The "},"done":false}"#,
            r#"{"message":{"role":"assistant","content":""},"done":false}"#,
            r#"{"message":{"role":"assistant","content":"app"},"done":false}"#,
            r#"{"message":{"role":"assistant","content":""},"done":true,"eval_count":12}"#,
        ];
        assert_eq!(collect_ok(Provider::Ollama, &lines), vec!["The ", "app"]);
    }

    #[test]
    fn test_ollama_malformed_line_is_error() {
        let result = parse_line(Provider::Ollama, "not valid json{{{");
        assert!(result.unwrap().is_err());
    }

    #[test]
    fn test_openai_stream_skips_role_and_done() {
        let lines = [
            ": keep-alive",
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data:{"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"data: {"choices":[]}"#,
            "data: [DONE]",
        ];
        assert_eq!(collect_ok(Provider::OpenAi, &lines), vec!["Hel", "lo"]);
    }

    #[test]
    fn test_openai_malformed_data_is_error() {
        let result = parse_line(Provider::OpenAi, "data: {broken json");
        assert!(result.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_stream_lines_reassembles_split_reads() {
        let parts: Vec<Result<bytes::Bytes, String>> = vec![
            Ok(bytes::Bytes::from_static(b"data: one\nda")),
            Ok(bytes::Bytes::from_static(b"ta: two\n\n")),
            Ok(bytes::Bytes::from_static(b"tail")),
        ];
        let lines: Vec<String> = stream_lines(stream::iter(parts))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["data: one", "data: two", "tail"]);
    }

    #[tokio::test]
    async fn test_stream_lines_keeps_multibyte_split_across_reads() {
        let snowman = "☃".as_bytes();
        let parts: Vec<Result<bytes::Bytes, String>> = vec![
            Ok(bytes::Bytes::copy_from_slice(&snowman[..1])),
            Ok(bytes::Bytes::copy_from_slice(&snowman[1..])),
            Ok(bytes::Bytes::from_static(b"\n")),
        ];
        let lines: Vec<String> = stream_lines(stream::iter(parts))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["☃"]);
    }

    #[tokio::test]
    async fn test_stream_lines_ends_after_read_error() {
        let parts: Vec<Result<bytes::Bytes, String>> = vec![
            Ok(bytes::Bytes::from_static(b"partial")),
            Err("connection reset".to_string()),
            Ok(bytes::Bytes::from_static(b"late\n")),
        ];
        let items: Vec<Result<String>> = stream_lines(stream::iter(parts)).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0]
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("connection reset"));
    }
}
