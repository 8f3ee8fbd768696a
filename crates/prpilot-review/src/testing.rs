//! In-memory collaborators that record every call.
//!
//! Enabled for this crate's tests and, through the `test-support` feature,
//! for dependents such as the HTTP server tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use prpilot_core::{
    AiComment, AiReview, ApprovalSummary, Branch, BranchInfo, Collaborator, Label, NewPullRequest,
    PrContent, PrFile, PrPilotError, PrState, PullRequest, Result, Review, ReviewState,
    ReviewSubmission, Service, SheetRow,
};

use crate::collaborators::{AiReviewer, PrFilter, SourceControl, TrackingSheet};

/// A pull request with predictable fields.
pub fn pull_request(number: u64, state: PrState) -> PullRequest {
    let at = Utc
        .with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    PullRequest {
        number,
        title: format!("PR {number}"),
        body: String::new(),
        state,
        html_url: format!("https://github.com/acme/widgets/pull/{number}"),
        head_branch: format!("feature-{number}"),
        base_branch: "main".into(),
        created_at: at,
        updated_at: at,
        author: "author".into(),
        labels: Vec::new(),
        reviewers: Vec::new(),
    }
}

/// A submitted review by `user`.
pub fn review(id: u64, user: &str, state: ReviewState) -> Review {
    Review {
        id,
        user: user.into(),
        body: String::new(),
        state,
        submitted_at: None,
        commit_id: None,
    }
}

fn fake_failure(service: Service, op: &str) -> PrPilotError {
    PrPilotError::remote(service, Some(500), format!("{op} failed"))
}

#[derive(Default)]
struct ScmState {
    prs: Vec<PullRequest>,
    reviews: HashMap<u64, Vec<Review>>,
    files: HashMap<u64, Vec<PrFile>>,
    branches: Vec<Branch>,
    labels: Vec<Label>,
    collaborators: Vec<Collaborator>,
    required: u32,
    failing: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
    created: Vec<NewPullRequest>,
    submitted: Vec<(u64, ReviewSubmission)>,
    comments: Vec<(u64, AiComment)>,
    merged: Vec<u64>,
    deleted: Vec<(u64, u64)>,
}

/// Source control backed by in-memory pull requests.
///
/// # Examples
///
/// ```
/// use prpilot_core::PrState;
/// use prpilot_review::testing::{pull_request, FakeSourceControl};
///
/// let scm = FakeSourceControl::new().with_pr(pull_request(1, PrState::Open));
/// assert_eq!(scm.calls("get_pull_request"), 0);
/// ```
pub struct FakeSourceControl {
    state: Mutex<ScmState>,
}

impl Default for FakeSourceControl {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSourceControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScmState {
                required: 1,
                ..ScmState::default()
            }),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut ScmState)) -> Self {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
        self
    }

    pub fn with_pr(self, pr: PullRequest) -> Self {
        self.with_state(|s| s.prs.push(pr))
    }

    pub fn with_reviews(self, number: u64, reviews: Vec<Review>) -> Self {
        self.with_state(|s| {
            s.reviews.insert(number, reviews);
        })
    }

    pub fn with_files(self, number: u64, files: Vec<PrFile>) -> Self {
        self.with_state(|s| {
            s.files.insert(number, files);
        })
    }

    pub fn with_branches(self, branches: Vec<Branch>) -> Self {
        self.with_state(|s| s.branches = branches)
    }

    pub fn with_labels(self, labels: Vec<Label>) -> Self {
        self.with_state(|s| s.labels = labels)
    }

    pub fn with_required_approvals(self, required: u32) -> Self {
        self.with_state(|s| s.required = required)
    }

    /// Make operation `op` (a trait method name) fail.
    pub fn failing(self, op: &'static str) -> Self {
        self.with_state(|s| {
            s.failing.insert(op);
        })
    }

    fn record(&self, op: &'static str) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PrPilotError::Validation("fake state poisoned".into()))?;
        *state.calls.entry(op).or_default() += 1;
        if state.failing.contains(op) {
            return Err(fake_failure(Service::GitHub, op));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&ScmState) -> T) -> T {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut ScmState) -> T) -> T {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// How many times `op` was called.
    pub fn calls(&self, op: &str) -> usize {
        self.read(|s| s.calls.get(op).copied().unwrap_or(0))
    }

    pub fn created(&self) -> Vec<NewPullRequest> {
        self.read(|s| s.created.clone())
    }

    pub fn submitted(&self) -> Vec<(u64, ReviewSubmission)> {
        self.read(|s| s.submitted.clone())
    }

    pub fn comments(&self) -> Vec<(u64, AiComment)> {
        self.read(|s| s.comments.clone())
    }

    pub fn merged(&self) -> Vec<u64> {
        self.read(|s| s.merged.clone())
    }

    pub fn deleted(&self) -> Vec<(u64, u64)> {
        self.read(|s| s.deleted.clone())
    }

    fn find(&self, number: u64) -> Result<PullRequest> {
        self.read(|s| s.prs.iter().find(|p| p.number == number).cloned())
            .ok_or_else(|| PrPilotError::remote(Service::GitHub, Some(404), "Not Found"))
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    fn repository(&self) -> String {
        "acme/widgets".into()
    }

    async fn list_pull_requests(&self, filter: PrFilter) -> Result<Vec<PullRequest>> {
        self.record("list_pull_requests")?;
        Ok(self.read(|s| {
            s.prs
                .iter()
                .filter(|p| match filter {
                    PrFilter::Open => p.state == PrState::Open,
                    PrFilter::Closed => p.state != PrState::Open,
                    PrFilter::All => true,
                })
                .cloned()
                .collect()
        }))
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        self.record("get_pull_request")?;
        self.find(number)
    }

    async fn list_reviews(&self, number: u64) -> Result<Vec<Review>> {
        self.record("list_reviews")?;
        Ok(self.read(|s| s.reviews.get(&number).cloned().unwrap_or_default()))
    }

    async fn list_files(&self, number: u64) -> Result<Vec<PrFile>> {
        self.record("list_files")?;
        Ok(self.read(|s| s.files.get(&number).cloned().unwrap_or_default()))
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        self.record("create_pull_request")?;
        Ok(self.write(|s| {
            let number = s.prs.iter().map(|p| p.number).max().unwrap_or(0) + 1;
            let mut pr = pull_request(number, PrState::Open);
            pr.title = request.title.clone();
            pr.body = request.body.clone();
            pr.head_branch = request.head.clone();
            pr.base_branch = request.base.clone();
            pr.labels = request.labels.clone();
            pr.reviewers = request.reviewers.clone();
            s.prs.push(pr.clone());
            s.created.push(request.clone());
            pr
        }))
    }

    async fn submit_review(&self, number: u64, submission: &ReviewSubmission) -> Result<Review> {
        self.record("submit_review")?;
        Ok(self.write(|s| {
            s.submitted.push((number, submission.clone()));
            let state = match submission.event {
                prpilot_core::ReviewEvent::Approve => ReviewState::Approved,
                prpilot_core::ReviewEvent::RequestChanges => ReviewState::ChangesRequested,
                prpilot_core::ReviewEvent::Comment => ReviewState::Commented,
            };
            let reviews = s.reviews.entry(number).or_default();
            let mut created = review(reviews.len() as u64 + 100, "reviewer", state);
            created.body = submission.body.clone().unwrap_or_default();
            reviews.push(created.clone());
            created
        }))
    }

    async fn delete_review(&self, number: u64, review_id: u64) -> Result<()> {
        self.record("delete_review")?;
        self.write(|s| s.deleted.push((number, review_id)));
        Ok(())
    }

    async fn add_comment(&self, number: u64, comment: &AiComment) -> Result<()> {
        self.record("add_comment")?;
        self.write(|s| s.comments.push((number, comment.clone())));
        Ok(())
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        self.record("list_branches")?;
        Ok(self.read(|s| s.branches.clone()))
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        self.record("list_labels")?;
        Ok(self.read(|s| s.labels.clone()))
    }

    async fn list_collaborators(&self) -> Result<Vec<Collaborator>> {
        self.record("list_collaborators")?;
        Ok(self.read(|s| s.collaborators.clone()))
    }

    async fn branch_info(&self, branch: &str, base: &str) -> Result<BranchInfo> {
        self.record("branch_info")?;
        Ok(BranchInfo {
            branch: branch.into(),
            base: base.into(),
            commits: Vec::new(),
            files: Vec::new(),
        })
    }

    async fn required_approvals(&self, _base_branch: &str) -> Result<u32> {
        self.record("required_approvals")?;
        Ok(self.read(|s| s.required))
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        self.record("merge_pull_request")?;
        self.write(|s| s.merged.push(number));
        Ok(())
    }
}

/// AI reviewer returning canned content.
pub struct FakeAiReviewer {
    review: AiReview,
    content: PrContent,
    fail: bool,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl Default for FakeAiReviewer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAiReviewer {
    pub fn new() -> Self {
        Self {
            review: AiReview {
                summary: "Looks reasonable".into(),
                score: 8.0,
                suggestions: vec!["Add tests".into()],
                issues: Vec::new(),
                comments: Vec::new(),
            },
            content: PrContent {
                title: "Generated title".into(),
                body: "Generated body".into(),
                labels: vec!["enhancement".into()],
                reviewers: Vec::new(),
            },
            fail: false,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_review(mut self, review: AiReview) -> Self {
        self.review = review;
        self
    }

    pub fn with_content(mut self, content: PrContent) -> Self {
        self.content = content;
        self
    }

    /// Fail every completion.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn record(&self, op: &'static str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(op).or_default() += 1;
        }
        if self.fail {
            return Err(fake_failure(Service::Llm, op));
        }
        Ok(())
    }
}

#[async_trait]
impl AiReviewer for FakeAiReviewer {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn review_pull_request(&self, _pr: &PullRequest, _files: &[PrFile]) -> Result<AiReview> {
        self.record("review_pull_request")?;
        Ok(self.review.clone())
    }

    async fn generate_pr_content(
        &self,
        _info: &BranchInfo,
        _prompt: Option<&str>,
    ) -> Result<PrContent> {
        self.record("generate_pr_content")?;
        Ok(self.content.clone())
    }
}

#[derive(Default)]
struct SheetState {
    rows: Vec<SheetRow>,
    header: bool,
    fail: bool,
    calls: HashMap<&'static str, usize>,
}

/// Tracking sheet kept in memory. Row 1 is the header, so data row `i`
/// lives at sheet row `i + 2`.
#[derive(Default)]
pub struct FakeSheet {
    state: Mutex<SheetState>,
}

impl FakeSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every operation.
    pub fn failing(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail = true;
        }
        self
    }

    pub fn with_rows(self, rows: Vec<SheetRow>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.rows = rows;
        }
        self
    }

    pub fn rows_snapshot(&self) -> Vec<SheetRow> {
        self.state.lock().map(|s| s.rows.clone()).unwrap_or_default()
    }

    pub fn has_header(&self) -> bool {
        self.state.lock().map(|s| s.header).unwrap_or(false)
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.calls.get(op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn with<T>(&self, op: &'static str, f: impl FnOnce(&mut SheetState) -> T) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PrPilotError::Validation("fake state poisoned".into()))?;
        *state.calls.entry(op).or_default() += 1;
        if state.fail {
            return Err(fake_failure(Service::Sheets, op));
        }
        Ok(f(&mut state))
    }
}

#[async_trait]
impl TrackingSheet for FakeSheet {
    async fn setup(&self) -> Result<()> {
        self.with("setup", |s| s.header = true)
    }

    async fn add_row(&self, pr: &PullRequest) -> Result<()> {
        self.with("add_row", |s| {
            s.rows.push(SheetRow {
                pr_number: pr.number,
                title: pr.title.clone(),
                status: pr.state.to_string(),
                created_date: pr.created_at.to_rfc3339(),
                review_status: "pending".into(),
                approvals: "0/1".into(),
                comments_count: 0,
                last_updated: String::new(),
            })
        })
    }

    async fn find_row(&self, number: u64) -> Result<Option<u32>> {
        self.with("find_row", |s| {
            s.rows
                .iter()
                .position(|r| r.pr_number == number)
                .map(|i| i as u32 + 2)
        })
    }

    async fn update_review_status(
        &self,
        number: u64,
        review_status: &str,
        comments_count: u64,
    ) -> Result<bool> {
        self.with("update_review_status", |s| {
            match s.rows.iter_mut().find(|r| r.pr_number == number) {
                Some(row) => {
                    row.review_status = review_status.into();
                    row.comments_count = comments_count;
                    true
                }
                None => false,
            }
        })
    }

    async fn update_approvals(
        &self,
        number: u64,
        summary: &ApprovalSummary,
        status: PrState,
    ) -> Result<bool> {
        self.with("update_approvals", |s| {
            match s.rows.iter_mut().find(|r| r.pr_number == number) {
                Some(row) => {
                    row.status = status.to_string();
                    row.approvals = summary.approvals_cell();
                    true
                }
                None => false,
            }
        })
    }

    async fn rows(&self) -> Result<Vec<SheetRow>> {
        self.with("rows", |s| s.rows.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.with("clear", |s| s.rows.clear())
    }

    async fn test_connection(&self) -> bool {
        self.with("test_connection", |_| ()).is_ok()
    }
}
