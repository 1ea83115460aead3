//! # repo-chat
//!
//! Chat with a public GitHub repository. Paste a link, the service pulls the
//! repository's text files through the contents API, indexes them in memory,
//! and answers questions about them with retrieval-augmented generation.
//!
//! ## Pipeline
//!
//! ```text
//!   repo link ──► github::RepoFetcher ──► chunking::build_chunks
//!                                                │
//!                                                ▼
//!                                    search::VectorIndex::build
//!                                                │
//!   question ──► rag::AnswerPipeline ◄── search::VectorRetriever (top 4)
//!                      │
//!                      ▼
//!          llm::ChatModel (streaming) ──► session::MessageSink
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the server, fetcher, index and LLM
//! - [`error`] - `ChatError`, the failures that end one interaction
//! - [`models`] - Shared data types: `RepoFile`, `Chunk`, request/response types
//! - [`github`] - Recursive walk of a repository through the GitHub contents API
//! - [`chunking`] - File labelling and the recursive character splitter
//! - [`llm`] - Embedding and streaming chat clients for Ollama or OpenAI-compatible APIs
//! - [`search`] - In-memory cosine-similarity index and top-k retriever
//! - [`rag`] - Prompt template and the retrieve-then-generate answer pipeline
//! - [`session`] - Per-session state machine and the `MessageSink` output trait
//! - [`state`] - Shared application state holding config, services and sessions
//! - [`api`] - Axum handlers for sessions, messages (SSE) and config

pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod github;
pub mod llm;
pub mod models;
pub mod rag;
pub mod search;
pub mod session;
pub mod state;
