//! Seams between the orchestrator and the remote services it drives.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use prpilot_core::{
    AiComment, AiReview, ApprovalSummary, Branch, BranchInfo, Collaborator, Label, NewPullRequest,
    PrContent, PrFile, PrPilotError, PrState, PullRequest, Result, Review, ReviewSubmission,
    SheetRow,
};

/// Which pull requests to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl PrFilter {
    /// Value of GitHub's `state` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            PrFilter::Open => "open",
            PrFilter::Closed => "closed",
            PrFilter::All => "all",
        }
    }
}

impl fmt::Display for PrFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrFilter {
    type Err = PrPilotError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(PrFilter::Open),
            "closed" => Ok(PrFilter::Closed),
            "all" => Ok(PrFilter::All),
            other => Err(PrPilotError::Validation(format!(
                "unknown pull request state '{other}', expected open, closed or all"
            ))),
        }
    }
}

/// Source-control operations (GitHub-shaped).
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// `owner/repo` the client is bound to.
    fn repository(&self) -> String;

    async fn list_pull_requests(&self, filter: PrFilter) -> Result<Vec<PullRequest>>;

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest>;

    /// Reviews in submission order.
    async fn list_reviews(&self, number: u64) -> Result<Vec<Review>>;

    async fn list_files(&self, number: u64) -> Result<Vec<PrFile>>;

    /// Open a pull request and apply its labels and reviewers.
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest>;

    async fn submit_review(&self, number: u64, submission: &ReviewSubmission) -> Result<Review>;

    async fn delete_review(&self, number: u64, review_id: u64) -> Result<()>;

    /// Post a line comment when `path` and `line` are set, a conversation comment otherwise.
    async fn add_comment(&self, number: u64, comment: &AiComment) -> Result<()>;

    async fn list_branches(&self) -> Result<Vec<Branch>>;

    async fn list_labels(&self) -> Result<Vec<Label>>;

    async fn list_collaborators(&self) -> Result<Vec<Collaborator>>;

    /// Recent commits on `branch` and the files it changes relative to `base`.
    async fn branch_info(&self, branch: &str, base: &str) -> Result<BranchInfo>;

    /// Approving reviews required by `base_branch` protection.
    async fn required_approvals(&self, base_branch: &str) -> Result<u32>;

    async fn merge_pull_request(&self, number: u64) -> Result<()>;
}

/// AI completion operations.
#[async_trait]
pub trait AiReviewer: Send + Sync {
    /// Model identifier, for status output and stored reviews.
    fn model(&self) -> &str;

    async fn review_pull_request(&self, pr: &PullRequest, files: &[PrFile]) -> Result<AiReview>;

    async fn generate_pr_content(&self, info: &BranchInfo, prompt: Option<&str>)
        -> Result<PrContent>;
}

/// Tracking-sheet operations, keyed by PR number.
#[async_trait]
pub trait TrackingSheet: Send + Sync {
    /// Write the header row.
    async fn setup(&self) -> Result<()>;

    /// Append a fresh row for `pr`.
    async fn add_row(&self, pr: &PullRequest) -> Result<()>;

    /// 1-based sheet row holding `number`, if any.
    async fn find_row(&self, number: u64) -> Result<Option<u32>>;

    /// Returns `false` when the PR has no row.
    async fn update_review_status(
        &self,
        number: u64,
        review_status: &str,
        comments_count: u64,
    ) -> Result<bool>;

    /// Returns `false` when the PR has no row.
    async fn update_approvals(
        &self,
        number: u64,
        summary: &ApprovalSummary,
        status: PrState,
    ) -> Result<bool>;

    /// All data rows, header excluded.
    async fn rows(&self) -> Result<Vec<SheetRow>>;

    /// Remove every data row, keeping the header.
    async fn clear(&self) -> Result<()>;

    async fn test_connection(&self) -> bool;
}
