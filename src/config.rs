use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Sessions untouched for this long are dropped (0 keeps them forever)
    pub session_idle_secs: u64,
    /// Repository fetching limits and endpoint
    pub github: GithubConfig,
    /// Chunking and retrieval parameters
    pub index: IndexConfig,
    /// LLM provider configuration
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// Base URL of the contents API (without trailing slash)
    pub api_base: String,
    /// Deepest directory level the fetcher descends into (root = 0)
    pub max_depth: usize,
    /// Stop collecting after this many files
    pub max_files: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            max_depth: 16,
            max_files: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks
    pub chunk_overlap: usize,
    /// Chunks returned per question
    pub top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
            top_k: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" or "ollama"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answering questions
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// Sampling temperature for answers
    pub temperature: f32,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.3,
            api_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            session_idle_secs: 1800,
            github: GithubConfig::default(),
            index: IndexConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("REPO_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(v) = parse_var(&lookup, "REPO_CHAT_SESSION_IDLE_SECS") {
            config.session_idle_secs = v;
        }
        if let Some(base) = lookup("GITHUB_API_BASE") {
            config.github.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(v) = parse_var(&lookup, "REPO_CHAT_MAX_DEPTH") {
            config.github.max_depth = v;
        }
        if let Some(v) = parse_var(&lookup, "REPO_CHAT_MAX_FILES") {
            config.github.max_files = v;
        }
        if let Some(v) = parse_var(&lookup, "REPO_CHAT_CHUNK_SIZE") {
            config.index.chunk_size = v;
        }
        if let Some(v) = parse_var(&lookup, "REPO_CHAT_CHUNK_OVERLAP") {
            config.index.chunk_overlap = v;
        }
        if let Some(v) = parse_var(&lookup, "REPO_CHAT_TOP_K") {
            config.index.top_k = v;
        }

        if let Some(provider) = lookup("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(model) = lookup("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Some(t) = parse_var(&lookup, "LLM_TEMPERATURE") {
            config.llm.temperature = t;
        }
        config.llm.api_key = lookup("LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));

        if config.index.chunk_size == 0 {
            tracing::warn!("REPO_CHAT_CHUNK_SIZE must be positive, using 1000");
            config.index.chunk_size = IndexConfig::default().chunk_size;
        }
        if config.index.chunk_overlap >= config.index.chunk_size {
            let clamped = config.index.chunk_size / 2;
            tracing::warn!(
                "Chunk overlap {} is not smaller than chunk size {}, clamping to {clamped}",
                config.index.chunk_overlap,
                config.index.chunk_size
            );
            config.index.chunk_overlap = clamped;
        }
        if config.index.top_k == 0 {
            config.index.top_k = 1;
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {key}: {raw:?}");
            None
        }
    }
}
