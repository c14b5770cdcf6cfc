//! HTTP surface of the control plane

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use handlers::{artifacts, bootstrap, config, delegations, metadata, tasks, token};
use state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Register `path` both with and without a trailing slash
fn route_both(
    router: Router<Arc<AppState>>,
    path: &str,
    method_router: MethodRouter<Arc<AppState>>,
) -> Router<Arc<AppState>> {
    let bare = path.trim_end_matches('/');
    router
        .route(bare, method_router.clone())
        .route(&format!("{bare}/"), method_router)
}

fn v1_routes() -> Router<Arc<AppState>> {
    let routes = [
        (
            "/bootstrap",
            get(bootstrap::get_bootstrap).post(bootstrap::post_bootstrap),
        ),
        ("/artifacts", post(artifacts::add_artifacts)),
        ("/artifacts/delete", post(artifacts::delete_artifacts)),
        ("/artifacts/publish", post(artifacts::publish_artifacts)),
        ("/metadata", post(metadata::post_metadata)),
        ("/metadata/online", post(metadata::post_metadata_online)),
        (
            "/metadata/sign",
            get(metadata::get_metadata_sign).post(metadata::post_metadata_sign),
        ),
        ("/metadata/sign/delete", post(metadata::post_metadata_sign_delete)),
        (
            "/delegations",
            post(delegations::post_delegations).put(delegations::put_delegations),
        ),
        ("/delegations/delete", post(delegations::delete_delegations)),
        ("/config", get(config::get_config).put(config::put_config)),
        ("/task", get(tasks::get_task)),
        ("/token", post(token::post_token).get(token::get_token)),
        ("/token/new", post(token::post_token_new)),
    ];

    routes
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            route_both(router, path, method_router)
        })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
