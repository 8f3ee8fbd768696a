use std::sync::Arc;
use std::time::Duration;

use prpilot_core::{
    AiComment, AiReview, Branch, Label, NewPullRequest, PrContent, PrPilotError, PrState,
    ReviewEvent, ReviewIntent, ReviewState,
};
use prpilot_review::automation::{Automation, CreatePrRequest, SheetAction};
use prpilot_review::collaborators::TrackingSheet;
use prpilot_review::store::ReviewStore;
use prpilot_review::testing::{pull_request, review, FakeAiReviewer, FakeSheet, FakeSourceControl};

fn automation(scm: &Arc<FakeSourceControl>, ai: &Arc<FakeAiReviewer>) -> Automation {
    Automation::new(scm.clone(), ai.clone())
}

#[tokio::test]
async fn approve_on_approved_pr_is_refused_without_remote_call() {
    let scm = Arc::new(
        FakeSourceControl::new()
            .with_pr(pull_request(1, PrState::Open))
            .with_reviews(1, vec![review(1, "bob", ReviewState::Approved)]),
    );
    let ai = Arc::new(FakeAiReviewer::new());
    let auto = automation(&scm, &ai);

    for intent in [ReviewIntent::Approve, ReviewIntent::RequestChanges] {
        let err = auto.submit_review(1, intent, Some("lgtm")).await.unwrap_err();
        assert!(matches!(err, PrPilotError::ActionNotPermitted(_)));
    }
    assert_eq!(scm.calls("submit_review"), 0);

    auto.submit_review(1, ReviewIntent::Comment, Some("  note  ")).await.unwrap();
    assert_eq!(scm.calls("submit_review"), 1);
    let (number, submission) = scm.submitted().remove(0);
    assert_eq!(number, 1);
    assert_eq!(submission.event, ReviewEvent::Comment);
    assert_eq!(submission.body.as_deref(), Some("note"));
}

#[tokio::test]
async fn merged_pr_counts_as_approved_for_gating() {
    let scm = Arc::new(FakeSourceControl::new().with_pr(pull_request(2, PrState::Merged)));
    let ai = Arc::new(FakeAiReviewer::new());
    let auto = automation(&scm, &ai);

    let err = auto.submit_review(2, ReviewIntent::Approve, None).await.unwrap_err();
    assert!(matches!(err, PrPilotError::ActionNotPermitted(_)));
    assert_eq!(scm.calls("submit_review"), 0);
}

#[tokio::test]
async fn approve_on_unapproved_pr_submits_exactly_once() {
    let scm = Arc::new(
        FakeSourceControl::new()
            .with_pr(pull_request(3, PrState::Open))
            .with_reviews(3, vec![review(1, "bob", ReviewState::ChangesRequested)]),
    );
    let ai = Arc::new(FakeAiReviewer::new());
    let auto = automation(&scm, &ai);

    let created = auto.submit_review(3, ReviewIntent::Approve, Some("   ")).await.unwrap();
    assert_eq!(created.state, ReviewState::Approved);
    assert_eq!(scm.calls("get_pull_request"), 1);
    assert_eq!(scm.calls("list_reviews"), 1);
    assert_eq!(scm.calls("submit_review"), 1);
    assert_eq!(scm.submitted()[0].1.body.as_deref(), Some("Approved"));
}

#[tokio::test]
async fn create_pr_generates_content_and_tracks_row() {
    let scm = Arc::new(FakeSourceControl::new());
    let ai = Arc::new(FakeAiReviewer::new().with_content(PrContent {
        title: "Add login".into(),
        body: "Adds a login form".into(),
        labels: vec!["feature".into()],
        reviewers: vec!["bob".into()],
    }));
    let sheet = Arc::new(FakeSheet::new());
    let auto = automation(&scm, &ai).with_sheet(sheet.clone());

    let result = auto
        .create_pr(&CreatePrRequest {
            branch: "feature/login".into(),
            auto_merge: true,
            ..CreatePrRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(result.title, "Add login");
    assert!(result.ai_generated);
    assert!(result.tracked);
    assert!(!result.merged, "reviewers were requested");
    assert_eq!(scm.calls("merge_pull_request"), 0);
    assert_eq!(scm.created()[0].base, "main");
    assert_eq!(sheet.rows_snapshot()[0].pr_number, result.number);
}

#[tokio::test]
async fn create_pr_falls_back_when_ai_fails_and_merges_without_reviewers() {
    let scm = Arc::new(FakeSourceControl::new());
    let ai = Arc::new(FakeAiReviewer::new().failing());
    let auto = automation(&scm, &ai);

    let result = auto
        .create_pr(&CreatePrRequest {
            branch: "fix/crash".into(),
            base: Some("develop".into()),
            auto_merge: true,
            ..CreatePrRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(result.title, "Update fix/crash");
    assert_eq!(result.labels, vec!["enhancement".to_string()]);
    assert!(!result.ai_generated);
    assert!(result.merged);
    assert_eq!(scm.merged(), vec![result.number]);
    assert_eq!(scm.created()[0].base, "develop");
}

#[tokio::test]
async fn create_pr_with_title_skips_generation() {
    let scm = Arc::new(FakeSourceControl::new());
    let ai = Arc::new(FakeAiReviewer::new());
    let auto = automation(&scm, &ai);

    let result = auto
        .create_pr(&CreatePrRequest {
            branch: "docs".into(),
            title: Some("Fix typo".into()),
            ..CreatePrRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(result.title, "Fix typo");
    assert_eq!(ai.calls("generate_pr_content"), 0);
    assert_eq!(scm.calls("branch_info"), 0);
}

#[tokio::test]
async fn open_pull_request_uses_given_content_and_default_base() {
    let scm = Arc::new(FakeSourceControl::new());
    let ai = Arc::new(FakeAiReviewer::new());
    let auto = automation(&scm, &ai);

    let result = auto
        .open_pull_request(NewPullRequest {
            title: " Add search ".into(),
            head: "search".into(),
            base: String::new(),
            body: "Adds search".into(),
            labels: vec![],
            reviewers: vec!["bob".into()],
        })
        .await
        .unwrap();

    assert_eq!(result.title, "Add search");
    assert_eq!(result.reviewers, vec!["bob".to_string()]);
    assert_eq!(scm.created()[0].base, "main");
    assert_eq!(ai.calls("generate_pr_content"), 0);

    let err = auto
        .open_pull_request(NewPullRequest {
            title: "  ".into(),
            head: "search".into(),
            base: "main".into(),
            body: String::new(),
            labels: vec![],
            reviewers: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PrPilotError::Validation(_)));
}

#[tokio::test]
async fn create_pr_rejects_empty_branch() {
    let scm = Arc::new(FakeSourceControl::new());
    let ai = Arc::new(FakeAiReviewer::new());
    let err = automation(&scm, &ai)
        .create_pr(&CreatePrRequest {
            branch: "  ".into(),
            ..CreatePrRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PrPilotError::Validation(_)));
    assert_eq!(scm.calls("create_pull_request"), 0);
}

fn review_with_comments() -> AiReview {
    AiReview {
        summary: "Mostly fine".into(),
        score: 7.5,
        suggestions: vec![],
        issues: vec![],
        comments: vec![
            AiComment {
                body: "Handle None".into(),
                path: Some("src/lib.rs".into()),
                line: Some(4),
            },
            AiComment {
                body: "Add docs".into(),
                path: None,
                line: None,
            },
        ],
    }
}

#[tokio::test]
async fn review_pr_posts_comments_stores_and_updates_sheet() {
    let scm = Arc::new(FakeSourceControl::new().with_pr(pull_request(4, PrState::Open)));
    let ai = Arc::new(FakeAiReviewer::new().with_review(review_with_comments()));
    let sheet = Arc::new(FakeSheet::new());
    sheet.add_row(&pull_request(4, PrState::Open)).await.unwrap();
    let store = Arc::new(ReviewStore::in_memory().unwrap());
    let auto = automation(&scm, &ai)
        .with_sheet(sheet.clone())
        .with_store(store.clone());

    let outcome = auto.review_pr(4, true).await.unwrap();

    assert_eq!(outcome.comments_posted, 2);
    assert!(outcome.stored);
    assert!(outcome.sheet_updated);
    assert_eq!(scm.comments().len(), 2);
    let row = &sheet.rows_snapshot()[0];
    assert_eq!(row.review_status, "reviewed");
    assert_eq!(row.comments_count, 2);
    assert_eq!(store.get(4).unwrap().unwrap().summary, "Mostly fine");
}

#[tokio::test]
async fn review_pr_without_auto_comment_posts_nothing() {
    let scm = Arc::new(FakeSourceControl::new().with_pr(pull_request(4, PrState::Open)));
    let ai = Arc::new(FakeAiReviewer::new().with_review(review_with_comments()));
    let outcome = automation(&scm, &ai).review_pr(4, false).await.unwrap();
    assert_eq!(outcome.comments_posted, 0);
    assert_eq!(scm.calls("add_comment"), 0);
}

#[tokio::test]
async fn review_open_prs_continues_after_failure() {
    let scm = Arc::new(
        FakeSourceControl::new()
            .with_pr(pull_request(1, PrState::Open))
            .with_pr(pull_request(2, PrState::Open))
            .with_pr(pull_request(3, PrState::Closed))
            .failing("list_files"),
    );
    let ai = Arc::new(FakeAiReviewer::new());
    let result = automation(&scm, &ai).review_open_prs(true).await.unwrap();

    assert_eq!(result.reviewed_count, 0);
    assert_eq!(result.failures.len(), 2);
    assert_eq!(scm.calls("list_files"), 2);
}

#[tokio::test]
async fn track_approvals_reconciles_and_upserts_rows() {
    let scm = Arc::new(
        FakeSourceControl::new()
            .with_pr(pull_request(1, PrState::Open))
            .with_pr(pull_request(2, PrState::Merged))
            .with_reviews(
                1,
                vec![
                    review(1, "bob", ReviewState::Approved),
                    review(2, "bob", ReviewState::Approved),
                    review(3, "carol", ReviewState::Commented),
                ],
            )
            .with_required_approvals(2),
    );
    let ai = Arc::new(FakeAiReviewer::new());
    let sheet = Arc::new(FakeSheet::new());
    let auto = automation(&scm, &ai).with_sheet(sheet.clone());

    let result = auto.track_approvals(true).await.unwrap();

    assert_eq!(result.tracked_count, 2);
    assert_eq!(result.sheets_updated, 2);
    let first = &result.records[0].approval;
    assert!(first.approved);
    assert_eq!(first.approved_by, vec!["bob".to_string()]);
    assert_eq!(first.approved_reviews, 1);
    assert_eq!(first.pending_reviews, 1);
    assert!(result.records[1].approval.approved);

    let rows = sheet.rows_snapshot();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].approvals, "1/2 \u{2705}");
    assert_eq!(rows[1].status, "merged");
    assert_eq!(scm.calls("required_approvals"), 1, "required count is cached per base");
    assert!(auto.last_sync().is_some());
}

#[tokio::test]
async fn track_approvals_without_sync_leaves_sheet_alone() {
    let scm = Arc::new(FakeSourceControl::new().with_pr(pull_request(1, PrState::Open)));
    let ai = Arc::new(FakeAiReviewer::new());
    let sheet = Arc::new(FakeSheet::new());
    let auto = automation(&scm, &ai).with_sheet(sheet.clone());

    let result = auto.track_approvals(false).await.unwrap();
    assert_eq!(result.sheets_updated, 0);
    assert_eq!(sheet.calls("update_approvals"), 0);
    assert!(auto.last_sync().is_none());
}

#[tokio::test]
async fn form_options_default_each_source_independently() {
    let scm = Arc::new(
        FakeSourceControl::new()
            .with_branches(vec![Branch {
                name: "main".into(),
                sha: "abc".into(),
                protected: true,
            }])
            .with_labels(vec![Label {
                name: "bug".into(),
                color: "red".into(),
                description: None,
            }])
            .failing("list_collaborators"),
    );
    let ai = Arc::new(FakeAiReviewer::new());
    let options = automation(&scm, &ai).form_options().await;

    assert_eq!(options.branches.len(), 1);
    assert_eq!(options.labels.len(), 1);
    assert!(options.collaborators.is_empty());
    assert_eq!(options.failures.len(), 1);
    assert_eq!(options.failures[0].source, "collaborators");
}

#[tokio::test]
async fn manage_sheet_requires_a_sheet() {
    let scm = Arc::new(FakeSourceControl::new());
    let ai = Arc::new(FakeAiReviewer::new());
    let err = automation(&scm, &ai)
        .manage_sheet(SheetAction::Setup)
        .await
        .unwrap_err();
    assert!(matches!(err, PrPilotError::ConfigurationMissing(_)));
}

#[tokio::test]
async fn manage_sheet_setup_clear_and_sync() {
    let scm = Arc::new(FakeSourceControl::new().with_pr(pull_request(1, PrState::Open)));
    let ai = Arc::new(FakeAiReviewer::new());
    let sheet = Arc::new(FakeSheet::new());
    let auto = automation(&scm, &ai).with_sheet(sheet.clone());

    auto.manage_sheet(SheetAction::Setup).await.unwrap();
    assert!(sheet.has_header());

    let synced = auto.manage_sheet(SheetAction::Sync).await.unwrap();
    assert_eq!(synced.tracking.unwrap().sheets_updated, 1);
    assert_eq!(sheet.rows_snapshot().len(), 1);

    auto.manage_sheet(SheetAction::Clear).await.unwrap();
    assert!(sheet.rows_snapshot().is_empty());
}

#[tokio::test]
async fn status_counts_pending_reviews() {
    let scm = Arc::new(
        FakeSourceControl::new()
            .with_pr(pull_request(1, PrState::Open))
            .with_pr(pull_request(2, PrState::Open))
            .with_pr(pull_request(3, PrState::Closed))
            .with_reviews(1, vec![review(1, "bob", ReviewState::Approved)]),
    );
    let ai = Arc::new(FakeAiReviewer::new());
    let status = automation(&scm, &ai).status().await.unwrap();

    assert_eq!(status.repository, "acme/widgets");
    assert_eq!(status.open_prs, 2);
    assert_eq!(status.pending_reviews, 1);
    assert!(!status.sheets_connected);
    assert_eq!(status.ai_model, "fake-model");
    assert_eq!(scm.calls("list_pull_requests"), 1);
    assert_eq!(scm.calls("list_reviews"), 2);
}

#[tokio::test]
async fn repo_stats_match_dashboard_formula() {
    let scm = Arc::new(
        FakeSourceControl::new()
            .with_pr(pull_request(1, PrState::Open))
            .with_pr(pull_request(2, PrState::Open))
            .with_pr(pull_request(3, PrState::Merged))
            .with_reviews(1, vec![review(1, "bob", ReviewState::Approved)])
            .with_required_approvals(2),
    );
    let ai = Arc::new(FakeAiReviewer::new());
    let stats = automation(&scm, &ai).repo_stats().await.unwrap();

    assert_eq!(stats.total_prs, 3);
    assert_eq!(stats.open_prs, 2);
    assert_eq!(stats.closed_prs, 1);
    assert_eq!(stats.approved_prs, 1);
    assert_eq!(stats.pending_reviews, 2);
    assert_eq!(stats.approval_rate, 33.3);
}

#[tokio::test]
async fn continuous_workflow_stops_on_shutdown() {
    let scm = Arc::new(FakeSourceControl::new().with_pr(pull_request(1, PrState::Open)));
    let ai = Arc::new(FakeAiReviewer::new());
    let auto = automation(&scm, &ai);

    let completed = auto
        .run_continuous(
            Duration::from_secs(3600),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await;

    assert_eq!(completed, 1);
    assert_eq!(ai.calls("review_pull_request"), 1);
}

#[tokio::test]
async fn stored_review_deletion_requires_and_uses_the_store() {
    let scm = Arc::new(FakeSourceControl::new().with_pr(pull_request(4, PrState::Open)));
    let ai = Arc::new(FakeAiReviewer::new());

    let err = automation(&scm, &ai).delete_stored_review(4).unwrap_err();
    assert!(matches!(err, PrPilotError::ConfigurationMissing(_)));

    let store = Arc::new(ReviewStore::in_memory().unwrap());
    let auto = automation(&scm, &ai).with_store(store.clone());
    auto.review_pr(4, false).await.unwrap();
    assert!(store.get(4).unwrap().is_some());

    assert!(auto.delete_stored_review(4).unwrap());
    assert!(store.get(4).unwrap().is_none());
    assert!(!auto.delete_stored_review(4).unwrap());
}
