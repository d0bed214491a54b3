//! HTTP server setup: router and API routes.

use super::state::ApiState;
use super::{chat, conversations, files};

use axum::Router;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// The full application router with CORS applied.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat::chat))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/conversations/{id}",
            get(conversations::get_conversation)
                .patch(conversations::update_conversation)
                .delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            post(conversations::add_message),
        )
        .route("/files", get(files::list_files).delete(files::delete_file))
        .route("/files/upload", post(files::upload_file))
        .route(
            "/files/vector-stores",
            get(files::list_vector_stores).post(files::create_vector_store),
        );

    Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the given address.
pub async fn start_http_server(
    bind: SocketAddr,
    state: Arc<ApiState>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(bind = %local_addr, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let mut shutdown = shutdown_rx;
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|v| *v).await;
            })
            .await
        {
            tracing::error!(%error, "HTTP server exited with error");
        }
    });

    Ok(handle)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
