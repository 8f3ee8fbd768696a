use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    /// Post the AI comments to the PR as well.
    #[serde(default)]
    comment: bool,
}

/// POST /api/github/pull-requests/{number}/ai-review: run the AI review and
/// persist it.
pub async fn run_ai_review(
    State(app): State<AppState>,
    Path(number): Path<u64>,
    Query(query): Query<RunQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = app.automation.review_pr(number, query.comment).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "review": outcome.review,
        "stored": outcome.stored,
        "commentsPosted": outcome.comments_posted,
        "processingTimeMs": outcome.processing_time_ms,
    })))
}

/// GET /api/github/pull-requests/{number}/ai-review: the stored review.
pub async fn get_ai_review(
    State(app): State<AppState>,
    Path(number): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError> {
    match app.automation.stored_review(number)? {
        Some(stored) => Ok(Json(serde_json::to_value(stored)?)),
        None => Err(AppError::not_found(format!(
            "no AI review stored for PR #{number}"
        ))),
    }
}

/// DELETE /api/github/pull-requests/{number}/ai-review
pub async fn delete_ai_review(
    State(app): State<AppState>,
    Path(number): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !app.automation.delete_stored_review(number)? {
        return Err(AppError::not_found(format!(
            "no AI review stored for PR #{number}"
        )));
    }
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("AI review for PR #{number} deleted"),
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

/// GET /api/ai-reviews?q=&limit=: stored reviews, newest first.
pub async fn list_ai_reviews(
    State(app): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let reviews = app.automation.stored_reviews(query.q.as_deref(), limit)?;
    Ok(Json(serde_json::json!({
        "count": reviews.len(),
        "reviews": reviews,
    })))
}
