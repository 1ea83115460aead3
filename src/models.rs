use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A text file downloaded from a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
}

/// A bounded slice of one labeled file, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub file_path: String,
    pub chunk_index: usize,
    pub content: String,
}

/// A single chat turn sent to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response to `POST /api/sessions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub id: Uuid,
    pub greeting: String,
}

/// Body of `POST /api/sessions/{id}/messages`
#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStateKind {
    NoRepoLoaded,
    RepoLoaded,
}

/// Response to `GET /api/sessions/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub state: SessionStateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
}
