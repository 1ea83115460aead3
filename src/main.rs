use std::time::Duration;

use tracing_subscriber::EnvFilter;

use repo_chat::api;
use repo_chat::config::Config;
use repo_chat::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment alone is enough.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!(
        "Chat model: {}, embedding model: {}",
        config.llm.chat_model,
        config.llm.embedding_model
    );
    if config.llm.provider == "openai" && config.llm.api_key.is_none() {
        tracing::warn!("No LLM_API_KEY or OPENAI_API_KEY set; OpenAI requests will be rejected");
    }

    let state = AppState::new(config.clone())?;
    if config.session_idle_secs > 0 {
        state.spawn_idle_reaper(Duration::from_secs(config.session_idle_secs));
    }
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
