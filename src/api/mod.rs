//! HTTP surface: the chat page plus a JSON/SSE session API.

pub mod chat;
pub mod sessions;

use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// All routes, bound to `state`.
pub fn router(state: AppState) -> Router {
    // No CORS layer: the page is served from the same origin.
    Router::new()
        .route("/", get(serve_index))
        .route("/api/sessions", post(sessions::create_session))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/api/sessions/{id}/messages", post(chat::post_message))
        .route("/api/config", get(sessions::get_config))
        .with_state(state)
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}
