pub mod chat_task;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_user;
pub use rest::ApiDoc;
pub use state::{AppState, Services};
pub use ws_handler::ws_handler;

/// Multipart framing on top of the largest accepted upload.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Builds every notebook route behind the `x-username` check.
pub fn router(app_state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(app_state.config.rag.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .route(
            "/notebooks",
            post(rest::create_notebook_handler).get(rest::list_notebooks_handler),
        )
        .route(
            "/notebooks/{id}",
            get(rest::get_notebook_handler).delete(rest::delete_notebook_handler),
        )
        .route("/notebooks/upload", post(rest::upload_new_notebook_handler))
        .route("/notebooks/{id}/sources", post(rest::upload_source_handler))
        .route("/notebooks/{id}/sources/url", post(rest::add_url_source_handler))
        .route(
            "/notebooks/{id}/sources/{source_id}",
            delete(rest::delete_source_handler),
        )
        .route(
            "/notebooks/{id}/chat",
            get(rest::chat_history_handler)
                .post(rest::chat_handler)
                .delete(rest::clear_chat_handler),
        )
        .route("/notebooks/{id}/ws", get(ws_handler))
        .route("/notebooks/{id}/artifacts", get(rest::list_artifacts_handler))
        .route("/notebooks/{id}/artifacts/report", post(rest::generate_report_handler))
        .route("/notebooks/{id}/artifacts/quiz", post(rest::generate_quiz_handler))
        .route("/notebooks/{id}/artifacts/podcast", post(rest::generate_podcast_handler))
        .route(
            "/notebooks/{id}/artifacts/{kind}/{filename}",
            get(rest::get_artifact_handler).delete(rest::delete_artifact_handler),
        )
        .layer(axum_middleware::from_fn(require_user))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
}
