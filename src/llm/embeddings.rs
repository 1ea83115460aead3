use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Embedder, Provider};
use crate::config::LlmConfig;

/// Maximum bytes sent per text. Chunks are far below this; it only bites on
/// very long questions.
const MAX_EMBED_BYTES: usize = 8_000;

/// Embedding client for the configured provider.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embed_batch(&self.client, &self.config, texts).await
    }
}

/// Embed `texts` in provider-sized batches. The result is parallel to `texts`.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let provider = Provider::parse(&config.provider)?;

    let inputs: Vec<&str> = texts.iter().map(|t| clip(t)).collect();
    let mut vectors = Vec::with_capacity(inputs.len());

    for batch in inputs.chunks(batch_size(provider)) {
        let embedded = match provider {
            Provider::Ollama => request_ollama(client, config, batch).await?,
            Provider::OpenAi => request_openai(client, config, batch).await?,
        };
        if embedded.len() != batch.len() {
            anyhow::bail!(
                "{provider} embed API returned {} vectors for {} inputs",
                embedded.len(),
                batch.len()
            );
        }
        vectors.extend(embedded);
    }

    tracing::debug!("Embedded {} texts with {}", vectors.len(), config.embedding_model);
    Ok(vectors)
}

fn batch_size(provider: Provider) -> usize {
    match provider {
        Provider::Ollama => 32,
        Provider::OpenAi => 64,
    }
}

/// Cut `text` to at most `MAX_EMBED_BYTES` on a char boundary.
fn clip(text: &str) -> &str {
    if text.len() <= MAX_EMBED_BYTES {
        return text;
    }
    let mut end = MAX_EMBED_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn checked_json<T: serde::de::DeserializeOwned>(
    provider: Provider,
    resp: reqwest::Response,
) -> Result<T> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("{provider} embed API returned {status}: {body}");
    }
    resp.json()
        .await
        .with_context(|| format!("Failed to parse {provider} embed response"))
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn request_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    batch: &[&str],
) -> Result<Vec<Vec<f32>>> {
    let resp = client
        .post(format!("{}/api/embed", config.base_url))
        .json(&OllamaEmbedRequest {
            model: &config.embedding_model,
            input: batch,
            truncate: true,
        })
        .send()
        .await
        .context("Failed to call Ollama embed API")?;

    let body: OllamaEmbedResponse = checked_json(Provider::Ollama, resp).await?;
    Ok(body.embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

async fn request_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    batch: &[&str],
) -> Result<Vec<Vec<f32>>> {
    let resp = client
        .post(format!("{}/v1/embeddings", config.base_url))
        .bearer_auth(config.api_key.as_deref().unwrap_or_default())
        .json(&OpenAiEmbedRequest {
            model: &config.embedding_model,
            input: batch,
        })
        .send()
        .await
        .context("Failed to call OpenAI embed API")?;

    let body: OpenAiEmbedResponse = checked_json(Provider::OpenAi, resp).await?;
    Ok(in_input_order(body.data))
}

/// Each vector carries its input position; response order is not guaranteed.
fn in_input_order(mut data: Vec<OpenAiEmbedding>) -> Vec<Vec<f32>> {
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_leaves_short_text() {
        assert_eq!(clip("hello"), "hello");
    }

    #[test]
    fn test_clip_respects_char_boundary() {
        let text = "é".repeat(MAX_EMBED_BYTES);
        let out = clip(&text);
        assert!(out.len() <= MAX_EMBED_BYTES);
        assert!(text.is_char_boundary(out.len()));
    }

    #[test]
    fn test_openai_vectors_reordered_by_index() {
        let body: OpenAiEmbedResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#,
        )
        .unwrap();
        assert_eq!(in_input_order(body.data), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_batch_sizes() {
        assert_eq!(batch_size(Provider::Ollama), 32);
        assert_eq!(batch_size(Provider::OpenAi), 64);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_request() {
        let config = LlmConfig {
            provider: "nonexistent".into(),
            ..LlmConfig::default()
        };
        let result = embed_batch(&reqwest::Client::new(), &config, &[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_error() {
        let config = LlmConfig {
            provider: "nonexistent".into(),
            ..LlmConfig::default()
        };
        let err = embed_batch(&reqwest::Client::new(), &config, &["x".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported LLM provider"));
    }
}
