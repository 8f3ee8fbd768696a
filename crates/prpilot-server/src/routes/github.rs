use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/github/branches
pub async fn branches(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let branches = app.automation.scm()?.list_branches().await?;
    Ok(Json(serde_json::json!({ "branches": branches })))
}

/// GET /api/github/labels
pub async fn labels(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let labels = app.automation.scm()?.list_labels().await?;
    Ok(Json(serde_json::json!({ "labels": labels })))
}

/// GET /api/github/collaborators
pub async fn collaborators(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let collaborators = app.automation.scm()?.list_collaborators().await?;
    Ok(Json(serde_json::json!({ "collaborators": collaborators })))
}

/// GET /api/github/form-options: branches, labels and collaborators in one
/// call. Never fails; a source that errors comes back empty and is listed
/// under `failures`.
pub async fn form_options(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let options = app.automation.form_options().await;
    Ok(Json(serde_json::to_value(options)?))
}
