//! HTTP API backing the prpilot dashboard.

pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // System
        .route("/api/health", get(routes::system::health))
        .route("/api/config", get(routes::system::get_config))
        .route("/api/status", get(routes::system::get_status))
        .route("/api/stats", get(routes::system::get_stats))
        .route(
            "/api/test-connection/{service}",
            post(routes::system::test_connection),
        )
        // Repository metadata
        .route("/api/github/branches", get(routes::github::branches))
        .route("/api/github/labels", get(routes::github::labels))
        .route(
            "/api/github/collaborators",
            get(routes::github::collaborators),
        )
        .route(
            "/api/github/form-options",
            get(routes::github::form_options),
        )
        // Pull requests
        .route("/api/prs", get(routes::pulls::list_prs))
        .route("/api/prs", post(routes::pulls::create_pr))
        .route(
            "/api/github/pull-requests",
            post(routes::pulls::open_pull_request),
        )
        .route(
            "/api/github/pull-requests/{number}",
            get(routes::pulls::get_pull_request),
        )
        .route(
            "/api/github/pull-requests/{number}/files",
            get(routes::pulls::files),
        )
        .route(
            "/api/github/pull-requests/{number}/reviews",
            get(routes::pulls::reviews).post(routes::pulls::submit_review),
        )
        .route(
            "/api/github/pull-requests/{number}/reviews/{review_id}",
            delete(routes::pulls::delete_review),
        )
        // AI reviews
        .route(
            "/api/github/pull-requests/{number}/ai-review",
            get(routes::ai_reviews::get_ai_review)
                .post(routes::ai_reviews::run_ai_review)
                .delete(routes::ai_reviews::delete_ai_review),
        )
        .route("/api/ai-reviews", get(routes::ai_reviews::list_ai_reviews))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the HTTP API on `host:port`.
pub async fn serve(app_state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

/// Start the HTTP API on a pre-bound listener.
///
/// Accepting an already bound `TcpListener` lets the caller read the actual
/// port first, which matters when binding port 0.
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(app_state);

    tracing::info!("prpilot API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
