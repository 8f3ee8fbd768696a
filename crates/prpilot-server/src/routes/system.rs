use axum::extract::{Path, State};
use axum::Json;
use prpilot_core::Service;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/health: liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api/config: non-secret configuration summary.
pub async fn get_config(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(serde_json::to_value(app.config.as_ref())?))
}

/// GET /api/status: repository, open and pending counts, sheet connectivity.
pub async fn get_status(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let status = app.automation.status().await?;
    Ok(Json(serde_json::to_value(status)?))
}

/// GET /api/stats: repository approval counts plus sheet and store statistics.
///
/// Each part degrades on its own: a failed GitHub query leaves the counts
/// out and is reported under `failures`.
pub async fn get_stats(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let automation = &app.automation;
    let (repo, extra) = tokio::join!(automation.repo_stats(), automation.stats());

    let mut failures = serde_json::to_value(&extra.failures)?;
    let mut body = match repo {
        Ok(repo) => serde_json::to_value(repo)?,
        Err(e) => {
            tracing::warn!(error = %e, "repository statistics unavailable");
            if let Some(list) = failures.as_array_mut() {
                list.push(serde_json::json!({ "source": "github", "error": e.to_string() }));
            }
            serde_json::json!({})
        }
    };
    if let Some(map) = body.as_object_mut() {
        map.insert("sheet".into(), serde_json::to_value(&extra.sheet)?);
        map.insert("reviews".into(), serde_json::to_value(&extra.reviews)?);
        map.insert("failures".into(), failures.take());
    }
    Ok(Json(body))
}

/// POST /api/test-connection/{service}: probe one collaborator.
///
/// A failed probe is still a 200 with `success: false`; only an unknown
/// service name is rejected.
pub async fn test_connection(
    State(app): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let service: Service = service.parse()?;
    let check = app.automation.test_connection(service).await;
    Ok(Json(serde_json::to_value(check)?))
}
