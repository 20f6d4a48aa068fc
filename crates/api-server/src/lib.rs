//! HTTP + SSE front end for the document analysis pipeline (spec §6).
//!
//! Owns no pipeline logic: every route is a thin translation between HTTP
//! and `doc-agent-orchestrator`'s `Orchestrator::handle_message`, whose
//! event stream this crate frames as `event: <name>` / `data: <json>` SSE.

mod handlers;
mod types;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use doc_agent_common::config::AppConfig;
use doc_agent_deletion_worker::DeletionHandle;
use doc_agent_orchestrator::Orchestrator;
use doc_agent_storage::{MetadataStore, ObjectStore};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use handlers::*;
pub use types::*;

/// Shared state handed to every handler (spec §9: explicit process-wide
/// handles created at startup, no ambient singletons).
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub deletion_handle: DeletionHandle,
    pub config: Arc<AppConfig>,
}

/// Builds the router: health, chat creation, the SSE message endpoint, and
/// cascade-delete, behind CORS restricted to `config.cors.cors_origins`.
#[must_use]
pub fn build_router(state: ApiState) -> Router {
    let cors = if state.config.cors.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state.config.cors.cors_origins.iter().filter_map(|origin| origin.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/chats", post(create_chat))
        .route("/api/v1/chats/{chat_id}/messages", post(send_message))
        .route("/api/v1/chats/{chat_id}", delete(delete_chat))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Binds `addr` and serves the router until the process is terminated.
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!(addr, "starting doc-agent api server");
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
