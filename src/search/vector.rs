use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ChatError;
use crate::llm::Embedder;
use crate::models::Chunk;

/// Maps a question to the chunks most likely to answer it.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>>;
}

/// A stored vector entry
#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// In-memory vector index with cosine similarity search.
///
/// Built in one go from a full chunk list and never modified afterwards; a
/// new repository gets a new index.
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embed every chunk and build the index.
    ///
    /// Fails as a whole: either every chunk has a vector or no index exists.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self, ChatError> {
        if chunks.is_empty() {
            return Err(ChatError::IndexBuild(anyhow::anyhow!("no chunks to index")));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = embedder.embed(&texts).await.map_err(ChatError::IndexBuild)?;

        Self::from_embeddings(chunks, embeddings)
    }

    /// Pair chunks with precomputed vectors. `embeddings` must be parallel with `chunks`.
    pub fn from_embeddings(
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, ChatError> {
        if embeddings.len() != chunks.len() {
            return Err(ChatError::IndexBuild(anyhow::anyhow!(
                "embedding service returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        if let Some(dim) = embeddings.first().map(Vec::len) {
            if dim == 0 || embeddings.iter().any(|e| e.len() != dim) {
                return Err(ChatError::IndexBuild(anyhow::anyhow!(
                    "embedding service returned vectors of inconsistent dimension"
                )));
            }
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();

        Ok(Self { entries })
    }

    /// Search by cosine similarity against a query embedding.
    pub fn search(&self, query_embedding: &[f32], limit: usize) -> Vec<VectorHit> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        // Stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| VectorHit {
                chunk: e.chunk.clone(),
                score,
            })
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Top-k retriever over a built index, embedding queries with the same
/// embedder used for the corpus.
pub struct VectorRetriever {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl VectorRetriever {
    pub fn new(index: VectorIndex, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.index.entry_count()
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let query_embedding = vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned for query"))?;

        let hits = self.index.search(&query_embedding, self.top_k);
        if let Some(best) = hits.first() {
            tracing::debug!(
                "Retrieved {} chunks, best {} (score {:.3})",
                hits.len(),
                best.chunk.file_path,
                best.score
            );
        }
        Ok(hits.into_iter().map(|hit| hit.chunk).collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
