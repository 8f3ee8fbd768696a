use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a pull request as reported at fetch time.
///
/// GitHub reports merged pull requests as `closed`; the client derives
/// [`PrState::Merged`] from the merge timestamp.
///
/// # Examples
///
/// ```
/// use prpilot_core::PrState;
///
/// let state: PrState = "merged".parse().unwrap();
/// assert_eq!(state, PrState::Merged);
/// assert_eq!(state.to_string(), "merged");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    /// Awaiting review or merge.
    Open,
    /// Closed without merging.
    Closed,
    /// Merged into the base branch.
    Merged,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Closed => write!(f, "closed"),
            PrState::Merged => write!(f, "merged"),
        }
    }
}

impl FromStr for PrState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(PrState::Open),
            "closed" => Ok(PrState::Closed),
            "merged" => Ok(PrState::Merged),
            other => Err(format!("unknown pull request state: {other}")),
        }
    }
}

/// Verdict carried by a submitted review.
///
/// Values GitHub may add later deserialize as [`ReviewState::Unknown`] rather
/// than failing the whole review list.
///
/// # Examples
///
/// ```
/// use prpilot_core::ReviewState;
///
/// let state: ReviewState = serde_json::from_str("\"CHANGES_REQUESTED\"").unwrap();
/// assert_eq!(state, ReviewState::ChangesRequested);
///
/// let odd: ReviewState = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
/// assert_eq!(odd, ReviewState::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Pending,
    Dismissed,
    #[serde(other)]
    Unknown,
}

/// A single review submitted on a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Remote identifier of the review.
    pub id: u64,
    /// Login of the reviewer.
    pub user: String,
    /// Review body, empty when none was given.
    #[serde(default)]
    pub body: String,
    /// Verdict.
    pub state: ReviewState,
    /// Submission time; pending reviews have none.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Commit the review was made against.
    pub commit_id: Option<String>,
}

/// A pull request as mirrored from the source-control service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub state: PrState,
    pub html_url: String,
    pub head_branch: String,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub reviewers: Vec<String>,
}

/// A file changed by a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrFile {
    pub filename: String,
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub changes: u64,
    /// Unified diff; absent for binary or oversized files.
    pub patch: Option<String>,
}

/// A repository branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub name: String,
    pub sha: String,
    #[serde(default)]
    pub protected: bool,
}

/// A repository label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: String,
    pub description: Option<String>,
}

/// A repository collaborator who can be requested as a reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub login: String,
    pub avatar_url: Option<String>,
    /// Permission names the collaborator holds (`admin`, `push`, ...).
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Summary of one commit on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub author: String,
}

/// What a branch contains relative to the base branch; input to PR content generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchInfo {
    pub branch: String,
    pub base: String,
    /// Most recent commits, newest first.
    pub commits: Vec<CommitSummary>,
    pub files: Vec<PrFile>,
}

/// An inline or general comment proposed by the AI reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiComment {
    pub body: String,
    pub path: Option<String>,
    pub line: Option<u64>,
}

/// Result of an AI review of a pull request.
///
/// # Examples
///
/// ```
/// use prpilot_core::AiReview;
///
/// let review = AiReview::fallback(4, "Fix parser");
/// assert_eq!(review.summary, "Review of PR #4 - Fix parser");
/// assert_eq!(review.score, 7.0);
/// assert_eq!(review.suggestions.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReview {
    pub summary: String,
    /// Overall quality score, always within `0.0..=10.0`.
    pub score: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub comments: Vec<AiComment>,
}

impl AiReview {
    /// Review returned when the model output for PR `number` cannot be used.
    pub fn fallback(number: u64, title: &str) -> Self {
        Self {
            summary: format!("Review of PR #{number} - {title}"),
            score: 7.0,
            suggestions: vec![
                "Consider adding more documentation".into(),
                "Review for potential edge cases".into(),
            ],
            issues: Vec::new(),
            comments: Vec::new(),
        }
    }
}

/// Generated title, body, and labels for a new pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrContent {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Suggested reviewer logins.
    #[serde(default)]
    pub reviewers: Vec<String>,
}

impl PrContent {
    /// Content used when generation fails for `branch`.
    ///
    /// # Examples
    ///
    /// ```
    /// use prpilot_core::PrContent;
    ///
    /// let content = PrContent::fallback("feature/login");
    /// assert_eq!(content.title, "Update feature/login");
    /// assert_eq!(content.labels, vec!["enhancement".to_string()]);
    /// ```
    pub fn fallback(branch: &str) -> Self {
        Self {
            title: format!("Update {branch}"),
            body: format!("Automated pull request for changes on `{branch}`."),
            labels: vec!["enhancement".into()],
            reviewers: Vec::new(),
        }
    }
}

/// Request to open a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPullRequest {
    pub title: String,
    /// Branch with the changes.
    pub head: String,
    /// Branch to merge into.
    pub base: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub reviewers: Vec<String>,
}

/// One data row of the tracking sheet (columns A through H).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub pr_number: u64,
    pub title: String,
    pub status: String,
    pub created_date: String,
    pub review_status: String,
    pub approvals: String,
    pub comments_count: u64,
    pub last_updated: String,
}

/// Output format for CLI commands.
///
/// # Examples
///
/// ```
/// use prpilot_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
