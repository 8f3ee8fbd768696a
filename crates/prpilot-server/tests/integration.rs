use std::sync::Arc;

use axum::http::StatusCode;
use http_body_util::BodyExt;
use prpilot_core::{Branch, PrPilotConfig, PrState, ReviewState};
use prpilot_review::testing::{pull_request, review, FakeAiReviewer, FakeSheet, FakeSourceControl};
use prpilot_review::{Automation, ReviewStore};
use prpilot_server::{build_router, AppState};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    scm: Arc<FakeSourceControl>,
    ai: Arc<FakeAiReviewer>,
    state: AppState,
}

impl Harness {
    fn new(scm: FakeSourceControl) -> Self {
        Self::with(scm, |a| a)
    }

    fn with(scm: FakeSourceControl, configure: impl FnOnce(Automation) -> Automation) -> Self {
        let scm = Arc::new(scm);
        let ai = Arc::new(FakeAiReviewer::new());
        let automation = configure(Automation::new(scm.clone(), ai.clone()));
        let state = AppState::new(automation, PrPilotConfig::default().summary());
        Self { scm, ai, state }
    }

    fn app(&self) -> axum::Router {
        build_router(self.state.clone())
    }
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn approved_pr() -> FakeSourceControl {
    FakeSourceControl::new()
        .with_pr(pull_request(1, PrState::Open))
        .with_reviews(1, vec![review(7, "bob", ReviewState::Approved)])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_healthy() {
    let h = Harness::new(FakeSourceControl::new());
    let (status, json) = get(h.app(), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn config_summary_has_no_secrets() {
    let h = Harness::new(FakeSourceControl::new());
    let (status, json) = get(h.app(), "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["github"]["baseBranch"], "main");
    assert_eq!(json["github"]["tokenConfigured"], false);
}

#[tokio::test]
async fn approve_on_approved_pr_returns_409_without_submitting() {
    let h = Harness::new(approved_pr());
    let (status, json) = post_json(
        h.app(),
        "/api/github/pull-requests/1/reviews",
        serde_json::json!({ "action": "approve", "body": "lgtm" }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("already approved"));
    assert_eq!(h.scm.calls("submit_review"), 0);
}

#[tokio::test]
async fn comment_on_approved_pr_is_submitted_once() {
    let h = Harness::new(approved_pr());
    let (status, json) = post_json(
        h.app(),
        "/api/github/pull-requests/1/reviews",
        serde_json::json!({ "event": "COMMENT", "body": "nit: rename" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(h.scm.calls("submit_review"), 1);
}

#[tokio::test]
async fn unknown_review_action_is_400() {
    let h = Harness::new(approved_pr());
    let (status, _) = post_json(
        h.app(),
        "/api/github/pull-requests/1/reviews",
        serde_json::json!({ "action": "merge" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.scm.calls("get_pull_request"), 0);
}

#[tokio::test]
async fn reviews_include_is_approved() {
    let h = Harness::new(approved_pr());
    let (status, json) = get(h.app(), "/api/github/pull-requests/1/reviews").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isApproved"], true);
    assert_eq!(json["reviews"][0]["user"], "bob");
}

#[tokio::test]
async fn missing_pull_request_is_404() {
    let h = Harness::new(FakeSourceControl::new());
    let (status, json) = get(h.app(), "/api/github/pull-requests/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn list_prs_filters_and_reconciles() {
    let scm = approved_pr()
        .with_pr(pull_request(2, PrState::Merged))
        .with_pr(pull_request(3, PrState::Closed));
    let h = Harness::new(scm);

    let (status, json) = get(h.app(), "/api/prs").await;
    assert_eq!(status, StatusCode::OK);
    let prs = json["prs"].as_array().unwrap();
    assert_eq!(prs.len(), 3);
    assert_eq!(prs[0]["isApproved"], true);
    assert_eq!(prs[1]["isApproved"], true);
    assert_eq!(prs[2]["isApproved"], false);
    assert_eq!(prs[0]["number"], 1);

    let (_, json) = get(h.app(), "/api/prs?state=open").await;
    assert_eq!(json["prs"].as_array().unwrap().len(), 1);

    let (status, _) = get(h.app(), "/api/prs?state=draft").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn form_options_degrade_per_source() {
    let scm = FakeSourceControl::new()
        .with_branches(vec![Branch {
            name: "main".into(),
            sha: "abc".into(),
            protected: false,
        }])
        .failing("list_labels");
    let h = Harness::new(scm);

    let (status, json) = get(h.app(), "/api/github/form-options").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["branches"].as_array().unwrap().len(), 1);
    assert!(json["labels"].as_array().unwrap().is_empty());
    assert_eq!(json["failures"][0]["source"], "labels");
}

#[tokio::test]
async fn single_source_failure_is_502() {
    let h = Harness::new(FakeSourceControl::new().failing("list_labels"));
    let (status, json) = get(h.app(), "/api/github/labels").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("list_labels failed"));
}

#[tokio::test]
async fn open_pull_request_without_reviewers_is_tracked() {
    let sheet = Arc::new(FakeSheet::new());
    let tracked = sheet.clone();
    let h = Harness::with(FakeSourceControl::new(), move |a| a.with_sheet(sheet));

    let (status, json) = post_json(
        h.app(),
        "/api/github/pull-requests",
        serde_json::json!({ "title": "Add search", "head": "search", "base": "main" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pullRequest"]["number"], 1);
    assert_eq!(json["pullRequest"]["tracked"], true);
    assert_eq!(tracked.rows_snapshot().len(), 1);
}

#[tokio::test]
async fn empty_title_is_400() {
    let h = Harness::new(FakeSourceControl::new());
    let (status, _) = post_json(
        h.app(),
        "/api/github/pull-requests",
        serde_json::json!({ "title": "", "head": "search" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.scm.calls("create_pull_request"), 0);
}

#[tokio::test]
async fn ai_review_is_run_and_stored() {
    let store = Arc::new(ReviewStore::in_memory().unwrap());
    let h = Harness::with(
        FakeSourceControl::new().with_pr(pull_request(5, PrState::Open)),
        move |a| a.with_store(store),
    );

    let (status, _) = get(h.app(), "/api/github/pull-requests/5/ai-review").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = post_json(
        h.app(),
        "/api/github/pull-requests/5/ai-review",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["review"]["summary"], "Looks reasonable");
    assert_eq!(json["stored"], true);
    assert_eq!(h.ai.calls("review_pull_request"), 1);

    let (status, json) = get(h.app(), "/api/github/pull-requests/5/ai-review").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prNumber"], 5);

    let (_, json) = get(h.app(), "/api/ai-reviews?q=reasonable").await;
    assert_eq!(json["count"], 1);
}

#[tokio::test]
async fn stored_ai_review_can_be_deleted() {
    let store = Arc::new(ReviewStore::in_memory().unwrap());
    let h = Harness::with(
        FakeSourceControl::new().with_pr(pull_request(5, PrState::Open)),
        move |a| a.with_store(store),
    );
    let uri = "/api/github/pull-requests/5/ai-review";

    let (status, _) = post_json(h.app(), uri, serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(h.app(), "DELETE", uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (status, _) = get(h.app(), uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(h.app(), "DELETE", uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stored_reviews_without_store_is_503() {
    let h = Harness::new(FakeSourceControl::new());
    let (status, _) = get(h.app(), "/api/ai-reviews").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn stats_combine_repository_and_store() {
    let store = Arc::new(ReviewStore::in_memory().unwrap());
    let h = Harness::with(
        approved_pr().with_pr(pull_request(2, PrState::Closed)),
        move |a| a.with_store(store),
    );

    let (status, json) = get(h.app(), "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["totalPRs"], 2);
    assert_eq!(json["openPRs"], 1);
    assert_eq!(json["approvedPRs"], 1);
    assert_eq!(json["approvalRate"], 50.0);
    assert_eq!(json["reviews"]["totalReviews"], 0);
    assert!(json["sheet"].is_null());
}

#[tokio::test]
async fn unconfigured_github_is_503() {
    let mut config = PrPilotConfig::default();
    config.store.enabled = false;
    let state = AppState::from_config(&config).unwrap();

    let (status, json) = get(build_router(state), "/api/status").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().unwrap().contains("configuration missing"));
}

#[tokio::test]
async fn test_connection_reports_per_service() {
    let h = Harness::new(FakeSourceControl::new());

    let (status, json) = post_json(h.app(), "/api/test-connection/github", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (_, json) = post_json(h.app(), "/api/test-connection/sheets", serde_json::json!({})).await;
    assert_eq!(json["success"], false);

    let (status, _) = post_json(h.app(), "/api/test-connection/jira", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
