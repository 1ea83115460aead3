//! Hosted model access: embeddings and streaming chat completions.
//!
//! The rest of the crate talks to models only through [`Embedder`] and
//! [`ChatModel`], so tests can swap in deterministic stubs.

pub mod chat_stream;
pub mod embeddings;

use std::fmt;
use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::Stream;

pub use chat_stream::HttpChatModel;
pub use embeddings::HttpEmbedder;

/// Plain-text deltas of one generated answer.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// The HTTP dialects the clients speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// `/api/embed` and NDJSON `/api/chat`
    Ollama,
    /// `/v1/embeddings` and SSE `/v1/chat/completions`
    OpenAi,
}

impl Provider {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            other => anyhow::bail!("Unsupported LLM provider: {other}"),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Ollama => "Ollama",
            Provider::OpenAi => "OpenAI",
        })
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start generating a reply to `prompt`, yielding text as it arrives.
    async fn stream(&self, prompt: String, temperature: f32) -> Result<ChatStream>;
}
