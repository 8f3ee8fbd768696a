use axum::extract::{Path, Query, State};
use axum::Json;
use prpilot_core::{NewPullRequest, ReviewIntent};
use prpilot_review::{CreatePrRequest, PrFilter};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    state: Option<String>,
}

/// GET /api/prs?state=open|closed|all: PRs with their reconciled approval.
/// Defaults to all PRs.
pub async fn list_prs(
    State(app): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = match query.state.as_deref() {
        Some(state) => state.parse::<PrFilter>()?,
        None => PrFilter::All,
    };
    let prs = app.automation.pull_requests(filter).await?;
    Ok(Json(serde_json::json!({ "prs": prs })))
}

/// POST /api/prs: create a PR for a branch, generating content with AI when
/// no title is given or a prompt is supplied.
pub async fn create_pr(
    State(app): State<AppState>,
    Json(body): Json<CreatePrRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = app.automation.create_pr(&body).await?;
    Ok(Json(serde_json::json!({ "success": true, "pullRequest": result })))
}

/// Body of POST /api/github/pull-requests. `base` may be omitted.
#[derive(Debug, Deserialize)]
pub struct OpenPullRequestBody {
    title: String,
    head: String,
    #[serde(default)]
    base: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    reviewers: Vec<String>,
}

/// POST /api/github/pull-requests: open a PR from explicit content.
pub async fn open_pull_request(
    State(app): State<AppState>,
    Json(body): Json<OpenPullRequestBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let request = NewPullRequest {
        title: body.title,
        head: body.head,
        base: body.base,
        body: body.body,
        labels: body.labels,
        reviewers: body.reviewers,
    };
    let result = app.automation.open_pull_request(request).await?;
    Ok(Json(serde_json::json!({ "success": true, "pullRequest": result })))
}

/// GET /api/github/pull-requests/{number}: one PR with its approval summary.
pub async fn get_pull_request(
    State(app): State<AppState>,
    Path(number): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let view = app.automation.pull_request(number).await?;
    Ok(Json(serde_json::to_value(view)?))
}

/// GET /api/github/pull-requests/{number}/files
pub async fn files(
    State(app): State<AppState>,
    Path(number): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let files = app.automation.files(number).await?;
    Ok(Json(serde_json::json!({ "files": files })))
}

/// GET /api/github/pull-requests/{number}/reviews: review history plus
/// `isApproved`.
pub async fn reviews(
    State(app): State<AppState>,
    Path(number): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let view = app.automation.reviews(number).await?;
    Ok(Json(serde_json::to_value(view)?))
}

/// Body of a review submission. `event` is accepted as an alias of `action`
/// so GitHub-style payloads (`APPROVE`, `REQUEST_CHANGES`) work too.
#[derive(Debug, Deserialize)]
pub struct SubmitReviewBody {
    #[serde(alias = "event")]
    action: String,
    #[serde(default)]
    body: Option<String>,
}

/// POST /api/github/pull-requests/{number}/reviews: gated submission.
///
/// Returns 409 when the PR is already approved and the action would change
/// that.
pub async fn submit_review(
    State(app): State<AppState>,
    Path(number): Path<u64>,
    Json(body): Json<SubmitReviewBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let intent: ReviewIntent = body.action.parse()?;
    let review = app
        .automation
        .submit_review(number, intent, body.body.as_deref())
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Review submitted successfully for PR #{number}"),
        "review": review,
    })))
}

/// DELETE /api/github/pull-requests/{number}/reviews/{review_id}
pub async fn delete_review(
    State(app): State<AppState>,
    Path((number, review_id)): Path<(u64, u64)>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.automation.delete_review(number, review_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Review {review_id} deleted from PR #{number}"),
    })))
}
