use thiserror::Error;

/// Failures that end one user interaction. None of them is fatal to the
/// process or to the session.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The fetch produced no files at all.
    #[error("repository could not be fetched or contains no supported files")]
    EmptyRepo,

    /// Embedding the corpus failed; no retriever was produced.
    #[error("failed to build index: {0:#}")]
    IndexBuild(anyhow::Error),

    /// Retrieval or model invocation failed for one question.
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),

    /// A question arrived before any repository was loaded.
    #[error("no repository loaded")]
    NoRepoLoaded,

    /// The user-facing channel went away.
    #[error("message sink closed: {0}")]
    Sink(String),
}

impl ChatError {
    /// The underlying cause without the variant prefix, for user-facing text.
    pub fn detail(&self) -> String {
        match self {
            ChatError::IndexBuild(e) | ChatError::Generation(e) => format!("{e:#}"),
            other => other.to_string(),
        }
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
