//! Per-session chat state machine.
//!
//! A session starts with no repository. A message starting with `http` is a
//! repository link and (re)loads the session; anything else is a question
//! answered from the loaded repository.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use uuid::Uuid;

use crate::chunking::{build_chunks, RecursiveSplitter, SplitterConfig};
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::github::{FetchReport, RepoFetcher};
use crate::llm::{ChatModel, Embedder, HttpChatModel, HttpEmbedder, Provider};
use crate::models::{RepoFile, SessionStateKind, SessionStatus};
use crate::rag::AnswerPipeline;
use crate::search::{VectorIndex, VectorRetriever};

pub const GREETING: &str = "Send me a GitHub repo link to start analyzing it!";

const FETCHING: &str = "Fetching repository files...";
const EMPTY_REPO: &str = "Could not fetch repository or it's empty.";
const NO_REPO: &str = "Send a GitHub repository link first.";
const TRUNCATED_NOTE: &str =
    "Note: the repository exceeded the fetch limits; only part of it was indexed.";

/// Where user-visible output goes.
///
/// A streamed message is opened with `start_stream`, grown with `append`
/// and closed with `end_stream`. Every method fails with `ChatError::Sink`
/// once the receiving side is gone.
#[async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Show that an answer is being prepared.
    async fn send_typing(&mut self) -> Result<()> {
        Ok(())
    }

    async fn start_stream(&mut self) -> Result<()>;

    async fn append(&mut self, fragment: &str) -> Result<()>;

    async fn end_stream(&mut self) -> Result<()>;
}

/// The external services and parameters every session of a process shares.
#[derive(Clone)]
pub struct Backends {
    pub fetcher: RepoFetcher,
    pub embedder: Arc<dyn Embedder>,
    pub model: Arc<dyn ChatModel>,
    pub splitter: RecursiveSplitter,
    pub top_k: usize,
    pub temperature: f32,
}

impl Backends {
    /// HTTP-backed services for `config`, all sharing `client`.
    pub fn from_config(client: reqwest::Client, config: &Config) -> anyhow::Result<Self> {
        Provider::parse(&config.llm.provider)?;
        let splitter = RecursiveSplitter::new(SplitterConfig::new(
            config.index.chunk_size,
            config.index.chunk_overlap,
        ))?;

        Ok(Self {
            fetcher: RepoFetcher::new(client.clone(), config.github.clone()),
            embedder: Arc::new(HttpEmbedder::new(client.clone(), config.llm.clone())),
            model: Arc::new(HttpChatModel::new(client, config.llm.clone())),
            splitter,
            top_k: config.index.top_k,
            temperature: config.llm.temperature,
        })
    }
}

struct LoadedRepo {
    repo_url: String,
    file_count: usize,
    chunk_count: usize,
    pipeline: AnswerPipeline,
}

enum SessionState {
    NoRepoLoaded,
    RepoLoaded(LoadedRepo),
}

pub struct Session {
    id: Uuid,
    backends: Backends,
    state: SessionState,
}

impl Session {
    pub fn new(id: Uuid, backends: Backends) -> Self {
        Self {
            id,
            backends,
            state: SessionState::NoRepoLoaded,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        match &self.state {
            SessionState::NoRepoLoaded => SessionStatus {
                id: self.id,
                state: SessionStateKind::NoRepoLoaded,
                repo_url: None,
                file_count: None,
                chunk_count: None,
            },
            SessionState::RepoLoaded(repo) => SessionStatus {
                id: self.id,
                state: SessionStateKind::RepoLoaded,
                repo_url: Some(repo.repo_url.clone()),
                file_count: Some(repo.file_count),
                chunk_count: Some(repo.chunk_count),
            },
        }
    }

    /// Handle one user message, writing every reply to `sink`.
    ///
    /// Fetch, index and generation failures become messages; only a broken
    /// sink is returned as an error.
    pub async fn handle_message(&mut self, text: &str, sink: &mut dyn MessageSink) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        if text.starts_with("http") {
            self.load_repository(text, sink).await
        } else {
            self.answer_question(text, sink).await
        }
    }

    async fn load_repository(&mut self, repo_url: &str, sink: &mut dyn MessageSink) -> Result<()> {
        sink.send(FETCHING).await?;

        let report = self.backends.fetcher.fetch(repo_url).await;
        if report.files.is_empty() {
            tracing::warn!("Session {}: {}", self.id, ChatError::EmptyRepo);
            return sink.send(EMPTY_REPO).await;
        }

        let loaded = match self.ingest(repo_url, &report.files).await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!("Session {}: indexing {repo_url} failed: {e}", self.id);
                return sink
                    .send(&format!("Failed to index repository: {}", e.detail()))
                    .await;
            }
        };

        let file_count = loaded.file_count;
        self.state = SessionState::RepoLoaded(loaded);

        sink.send(&format!(
            "Repository loaded with {file_count} files! Ask me anything about it."
        ))
        .await?;
        for note in fetch_notes(&report) {
            sink.send(&note).await?;
        }
        Ok(())
    }

    async fn ingest(&self, repo_url: &str, files: &[RepoFile]) -> Result<LoadedRepo> {
        let chunks = build_chunks(files, &self.backends.splitter);
        let chunk_count = chunks.len();
        tracing::info!(
            "Indexing {repo_url}: {} files, {chunk_count} chunks",
            files.len()
        );

        let index = VectorIndex::build(chunks, self.backends.embedder.as_ref()).await?;
        let retriever = VectorRetriever::new(
            index,
            Arc::clone(&self.backends.embedder),
            self.backends.top_k,
        );
        tracing::info!("Index ready for {repo_url} ({} entries)", retriever.entry_count());

        Ok(LoadedRepo {
            repo_url: repo_url.to_string(),
            file_count: files.len(),
            chunk_count,
            pipeline: AnswerPipeline::new(
                Arc::new(retriever),
                Arc::clone(&self.backends.model),
                self.backends.temperature,
            ),
        })
    }

    async fn answer_question(&mut self, question: &str, sink: &mut dyn MessageSink) -> Result<()> {
        let SessionState::RepoLoaded(repo) = &self.state else {
            tracing::debug!("Session {}: {}", self.id, ChatError::NoRepoLoaded);
            return sink.send(NO_REPO).await;
        };
        let pipeline = repo.pipeline.clone();

        sink.send_typing().await?;

        let mut stream = match pipeline.answer(question).await {
            Ok(stream) => stream,
            Err(e) => return self.report_generation_failure(&e, sink).await,
        };

        sink.start_stream().await?;
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => sink.append(&delta).await?,
                Err(e) => {
                    failure = Some(ChatError::Generation(e));
                    break;
                }
            }
        }
        sink.end_stream().await?;

        match failure {
            Some(e) => self.report_generation_failure(&e, sink).await,
            None => Ok(()),
        }
    }

    async fn report_generation_failure(
        &self,
        error: &ChatError,
        sink: &mut dyn MessageSink,
    ) -> Result<()> {
        tracing::error!("Session {}: {error}", self.id);
        sink.send(&format!(
            "Something went wrong while generating the answer: {}",
            error.detail()
        ))
        .await
    }
}

/// Extra notices appended to the "loaded" message when the fetch was incomplete.
fn fetch_notes(report: &FetchReport) -> Vec<String> {
    let mut notes = Vec::new();
    if report.has_partial_failures() {
        notes.push(format!(
            "Note: {} folder listings and {} file downloads failed; some files may be missing.",
            report.failed_listings, report.failed_downloads
        ));
    }
    if report.truncated {
        notes.push(TRUNCATED_NOTE.to_string());
    }
    notes
}
