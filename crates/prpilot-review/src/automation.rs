//! Workflow orchestration over the three remote collaborators.
//!
//! [`Automation`] is what the CLI and the HTTP API call. Every public method
//! returns a serializable result so both surfaces can render it directly.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use prpilot_core::{
    build_submission, is_approved, AiReview, ApprovalSummary, Branch, Collaborator, Label,
    NewPullRequest, PrContent, PrFile, PrPilotConfig, PrPilotError, PrState, PullRequest, Result,
    Review, ReviewIntent, Service,
};
use serde::{Deserialize, Serialize};

use crate::collaborators::{AiReviewer, PrFilter, SourceControl, TrackingSheet};
use crate::github::GitHubClient;
use crate::llm::LlmReviewer;
use crate::sheets::{self, SheetStatistics, SheetsClient};
use crate::store::{ReviewStatistics, ReviewStore, SaveMeta, StoredReview};

/// Settings the orchestrator reads from configuration.
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub base_branch: String,
    pub auto_merge: bool,
    pub auto_comment: bool,
    /// Pause after a failed workflow run before the next attempt.
    pub retry_delay: Duration,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            base_branch: "main".into(),
            auto_merge: false,
            auto_comment: true,
            retry_delay: Duration::from_secs(60),
        }
    }
}

impl AutomationSettings {
    pub fn from_config(config: &PrPilotConfig) -> Self {
        Self {
            base_branch: config.github.base_branch.clone(),
            auto_merge: config.github.auto_merge,
            auto_comment: config.workflow.auto_comment,
            retry_delay: Duration::from_secs(config.workflow.retry_delay_secs),
        }
    }
}

/// Input to [`Automation::create_pr`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrRequest {
    pub branch: String,
    pub title: Option<String>,
    /// Extra instructions for content generation.
    pub prompt: Option<String>,
    /// Defaults to the configured base branch.
    pub base: Option<String>,
    #[serde(default)]
    pub auto_merge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrResult {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub body: String,
    pub labels: Vec<String>,
    pub reviewers: Vec<String>,
    /// Whether title or body came from the AI reviewer.
    pub ai_generated: bool,
    pub tracked: bool,
    pub merged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub pr_number: u64,
    pub title: String,
    pub review: AiReview,
    pub comments_posted: u64,
    pub stored: bool,
    pub sheet_updated: bool,
    pub processing_time_ms: u64,
}

/// A per-PR failure inside a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrFailure {
    pub pr_number: u64,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReviewResult {
    pub reviewed: Vec<ReviewOutcome>,
    pub reviewed_count: u64,
    pub comments_count: u64,
    pub failures: Vec<PrFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub pr_number: u64,
    pub title: String,
    pub state: PrState,
    pub approval: ApprovalSummary,
    pub sheet_updated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingResult {
    pub records: Vec<ApprovalRecord>,
    pub tracked_count: u64,
    pub sheets_updated: u64,
    pub failures: Vec<PrFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub reviews: BatchReviewResult,
    pub tracking: TrackingResult,
    pub finished_at: DateTime<Utc>,
}

/// What [`Automation::manage_sheet`] should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetAction {
    /// Write the header row.
    Setup,
    /// Remove all data rows.
    Clear,
    /// Upsert a row per PR and refresh its approvals.
    Sync,
}

impl fmt::Display for SheetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetAction::Setup => write!(f, "setup"),
            SheetAction::Clear => write!(f, "clear"),
            SheetAction::Sync => write!(f, "sync"),
        }
    }
}

impl FromStr for SheetAction {
    type Err = PrPilotError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "setup" => Ok(SheetAction::Setup),
            "clear" => Ok(SheetAction::Clear),
            "sync" => Ok(SheetAction::Sync),
            other => Err(PrPilotError::Validation(format!(
                "unknown sheet action '{other}', expected sync, clear or setup"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetActionResult {
    pub action: SheetAction,
    pub message: String,
    /// Filled for [`SheetAction::Sync`].
    pub tracking: Option<TrackingResult>,
}

/// Failure of one source inside [`Automation::form_options`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Everything the dashboard's "new PR" form needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormOptions {
    pub branches: Vec<Branch>,
    pub labels: Vec<Label>,
    pub collaborators: Vec<Collaborator>,
    pub failures: Vec<SourceFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub repository: String,
    pub open_prs: u64,
    /// Open PRs that are not approved.
    pub pending_reviews: u64,
    pub sheets_connected: bool,
    pub ai_model: String,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Repository-wide approval counts computed from GitHub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStats {
    #[serde(rename = "totalPRs")]
    pub total_prs: u64,
    #[serde(rename = "openPRs")]
    pub open_prs: u64,
    #[serde(rename = "closedPRs")]
    pub closed_prs: u64,
    /// Approved PRs among the open ones.
    #[serde(rename = "approvedPRs")]
    pub approved_prs: u64,
    /// Missing approvals summed over unapproved open PRs.
    pub pending_reviews: u64,
    /// `approved / total` as a percentage, one decimal.
    pub approval_rate: f64,
}

/// Sheet and review-store statistics; either is absent when not configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub sheet: Option<SheetStatistics>,
    pub reviews: Option<ReviewStatistics>,
    pub failures: Vec<SourceFailure>,
}

/// A PR together with its reconciled approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestView {
    #[serde(flatten)]
    pub pull_request: PullRequest,
    pub is_approved: bool,
    pub approval: ApprovalSummary,
}

/// A PR's review history with its reconciled approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsView {
    pub pr_number: u64,
    pub reviews: Vec<Review>,
    pub is_approved: bool,
}

/// Result of probing one collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    pub service: Service,
    pub success: bool,
    pub message: String,
}

type Slot<T> = std::result::Result<Arc<T>, String>;

/// The orchestrator.
///
/// # Examples
///
/// ```no_run
/// use prpilot_core::PrPilotConfig;
/// use prpilot_review::automation::Automation;
///
/// # async fn run() -> prpilot_core::Result<()> {
/// let config = PrPilotConfig::load(None)?;
/// let automation = Automation::from_config(&config)?;
/// let status = automation.status().await?;
/// println!("{} open PRs", status.open_prs);
/// # Ok(())
/// # }
/// ```
pub struct Automation {
    scm: Slot<dyn SourceControl>,
    ai: Slot<dyn AiReviewer>,
    sheet: Option<Arc<dyn TrackingSheet>>,
    store: Option<Arc<ReviewStore>>,
    settings: AutomationSettings,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

fn unconfigured(e: PrPilotError) -> Result<String> {
    match e {
        PrPilotError::ConfigurationMissing(msg) => Ok(msg),
        other => Err(other),
    }
}

impl Automation {
    /// Build from explicit collaborators, with no sheet and no store.
    pub fn new(scm: Arc<dyn SourceControl>, ai: Arc<dyn AiReviewer>) -> Self {
        Self {
            scm: Ok(scm),
            ai: Ok(ai),
            sheet: None,
            store: None,
            settings: AutomationSettings::default(),
            last_sync: Mutex::new(None),
        }
    }

    /// Build the real clients from configuration.
    ///
    /// Missing GitHub or LLM credentials do not fail construction; operations
    /// that need the absent collaborator return
    /// [`PrPilotError::ConfigurationMissing`] instead. The sheet is wired only
    /// when a spreadsheet is configured and the store only when enabled.
    ///
    /// # Errors
    ///
    /// Returns invalid settings (such as a malformed repository or URL), sheet
    /// credentials that are only partly set, and store open failures.
    pub fn from_config(config: &PrPilotConfig) -> Result<Self> {
        let scm: Slot<dyn SourceControl> = match GitHubClient::new(&config.github) {
            Ok(client) => Ok(Arc::new(client)),
            Err(e) => Err(unconfigured(e)?),
        };
        let ai: Slot<dyn AiReviewer> = match LlmReviewer::new(&config.llm) {
            Ok(reviewer) => Ok(Arc::new(reviewer)),
            Err(e) => Err(unconfigured(e)?),
        };
        let sheet: Option<Arc<dyn TrackingSheet>> = if config.sheets.is_configured() {
            Some(Arc::new(SheetsClient::new(&config.sheets)?))
        } else {
            None
        };
        let store = if config.store.enabled {
            Some(Arc::new(ReviewStore::open(&config.store.path)?))
        } else {
            None
        };

        Ok(Self {
            scm,
            ai,
            sheet,
            store,
            settings: AutomationSettings::from_config(config),
            last_sync: Mutex::new(None),
        })
    }

    pub fn with_sheet(mut self, sheet: Arc<dyn TrackingSheet>) -> Self {
        self.sheet = Some(sheet);
        self
    }

    pub fn with_store(mut self, store: Arc<ReviewStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_settings(mut self, settings: AutomationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AutomationSettings {
        &self.settings
    }

    pub fn has_sheet(&self) -> bool {
        self.sheet.is_some()
    }

    /// The source-control collaborator.
    ///
    /// # Errors
    ///
    /// [`PrPilotError::ConfigurationMissing`] when GitHub is not configured.
    pub fn scm(&self) -> Result<&dyn SourceControl> {
        match &self.scm {
            Ok(scm) => Ok(scm.as_ref()),
            Err(msg) => Err(PrPilotError::ConfigurationMissing(msg.clone())),
        }
    }

    fn ai(&self) -> Result<&dyn AiReviewer> {
        match &self.ai {
            Ok(ai) => Ok(ai.as_ref()),
            Err(msg) => Err(PrPilotError::ConfigurationMissing(msg.clone())),
        }
    }

    fn sheet(&self) -> Result<&dyn TrackingSheet> {
        self.sheet.as_deref().ok_or_else(|| {
            PrPilotError::ConfigurationMissing("GOOGLE_SHEETS_SPREADSHEET_ID is not set".into())
        })
    }

    fn store(&self) -> Result<&ReviewStore> {
        self.store.as_deref().ok_or_else(|| {
            PrPilotError::ConfigurationMissing("the review store is disabled".into())
        })
    }

    /// `owner/repo`, or an empty string when GitHub is not configured.
    pub fn repository(&self) -> String {
        self.scm().map(|s| s.repository()).unwrap_or_default()
    }

    /// Model name, or `"not configured"`.
    pub fn ai_model(&self) -> String {
        self.ai()
            .map(|ai| ai.model().to_string())
            .unwrap_or_else(|_| "not configured".into())
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync.lock().ok().and_then(|guard| *guard)
    }

    fn mark_synced(&self) {
        if let Ok(mut guard) = self.last_sync.lock() {
            *guard = Some(Utc::now());
        }
    }

    /// Open a pull request for `request.branch`.
    ///
    /// Content is generated when no title is given or a prompt is supplied; a
    /// generation failure falls back to [`PrContent::fallback`]. Sheet
    /// tracking and auto-merge are best effort and never fail the call once
    /// the PR exists.
    ///
    /// # Errors
    ///
    /// [`PrPilotError::Validation`] for an empty or unknown branch, and any
    /// failure creating the PR itself.
    pub async fn create_pr(&self, request: &CreatePrRequest) -> Result<CreatePrResult> {
        let branch = request.branch.trim();
        if branch.is_empty() {
            return Err(PrPilotError::Validation("branch must not be empty".into()));
        }
        let scm = self.scm()?;
        let base = request
            .base
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(self.settings.base_branch.as_str())
            .to_string();
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let prompt = request
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        tracing::info!(%branch, %base, "creating pull request");

        let (content, ai_generated) = if title.is_none() || prompt.is_some() {
            let info = scm.branch_info(branch, &base).await?;
            let generated = match self.ai() {
                Ok(ai) => ai.generate_pr_content(&info, prompt).await,
                Err(e) => Err(e),
            };
            match generated {
                Ok(content) => (content, true),
                Err(e) => {
                    tracing::warn!(%branch, error = %e, "PR content generation failed, using defaults");
                    (PrContent::fallback(branch), false)
                }
            }
        } else {
            (
                PrContent {
                    title: String::new(),
                    body: String::new(),
                    labels: Vec::new(),
                    reviewers: Vec::new(),
                },
                false,
            )
        };

        let new_pr = NewPullRequest {
            title: title.map(str::to_string).unwrap_or(content.title),
            head: branch.to_string(),
            base,
            body: content.body,
            labels: content.labels,
            reviewers: content.reviewers,
        };
        let pr = scm.create_pull_request(&new_pr).await?;
        tracing::info!(pr = pr.number, url = %pr.html_url, "pull request created");

        let tracked = self.track_new(&pr).await;
        let auto_merge = request.auto_merge || self.settings.auto_merge;
        let merged = self
            .maybe_merge(pr.number, auto_merge, &new_pr.reviewers)
            .await;

        Ok(CreatePrResult {
            number: pr.number,
            title: pr.title,
            url: pr.html_url,
            body: new_pr.body,
            labels: new_pr.labels,
            reviewers: new_pr.reviewers,
            ai_generated,
            tracked,
            merged,
        })
    }

    /// Open a pull request from fully specified content, without generation.
    ///
    /// The PR is tracked in the sheet when one is configured. It is merged
    /// right away when auto-merge is enabled and nobody was asked to review.
    ///
    /// # Errors
    ///
    /// [`PrPilotError::Validation`] for an empty title or head, and any
    /// failure creating the PR.
    pub async fn open_pull_request(&self, request: NewPullRequest) -> Result<CreatePrResult> {
        let mut request = request;
        request.title = request.title.trim().to_string();
        request.head = request.head.trim().to_string();
        if request.title.is_empty() {
            return Err(PrPilotError::Validation("title must not be empty".into()));
        }
        if request.head.is_empty() {
            return Err(PrPilotError::Validation("head branch must not be empty".into()));
        }
        if request.base.trim().is_empty() {
            request.base = self.settings.base_branch.clone();
        }

        let scm = self.scm()?;
        let pr = scm.create_pull_request(&request).await?;
        tracing::info!(pr = pr.number, url = %pr.html_url, "pull request created");

        let tracked = self.track_new(&pr).await;
        let merged = self
            .maybe_merge(pr.number, self.settings.auto_merge, &request.reviewers)
            .await;

        Ok(CreatePrResult {
            number: pr.number,
            title: pr.title,
            url: pr.html_url,
            body: request.body,
            labels: request.labels,
            reviewers: request.reviewers,
            ai_generated: false,
            tracked,
            merged,
        })
    }

    async fn track_new(&self, pr: &PullRequest) -> bool {
        match &self.sheet {
            Some(sheet) => match sheet.add_row(pr).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(pr = pr.number, error = %e, "failed to track PR in sheet");
                    false
                }
            },
            None => false,
        }
    }

    async fn maybe_merge(&self, number: u64, auto_merge: bool, reviewers: &[String]) -> bool {
        if !auto_merge {
            return false;
        }
        if !reviewers.is_empty() {
            tracing::info!(pr = number, "reviewers requested, skipping auto-merge");
            return false;
        }
        match self.scm() {
            Ok(scm) => match scm.merge_pull_request(number).await {
                Ok(()) => {
                    tracing::info!(pr = number, "auto-merged pull request");
                    true
                }
                Err(e) => {
                    tracing::warn!(pr = number, error = %e, "auto-merge failed");
                    false
                }
            },
            Err(_) => false,
        }
    }

    /// Run the AI review of PR `number`.
    ///
    /// The review is persisted when a store is configured. With
    /// `auto_comment`, each AI comment is posted to the PR. The sheet row is
    /// then marked `reviewed`. Store, comment, and sheet failures are logged
    /// and reflected in the outcome, not raised.
    ///
    /// # Errors
    ///
    /// Failures fetching the PR or its files, and AI reviewer failures.
    pub async fn review_pr(&self, number: u64, auto_comment: bool) -> Result<ReviewOutcome> {
        let scm = self.scm()?;
        let ai = self.ai()?;
        tracing::info!(pr = number, "reviewing pull request");

        let pr = scm.get_pull_request(number).await?;
        let files: Vec<PrFile> = scm.list_files(number).await?;

        let started = Instant::now();
        let review = ai.review_pull_request(&pr, &files).await?;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        let stored = match &self.store {
            Some(store) => {
                let meta = SaveMeta {
                    model: ai.model(),
                    processing_time_ms: Some(processing_time_ms),
                };
                match store.save(&pr, &review, meta) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(pr = number, error = %e, "failed to store AI review");
                        false
                    }
                }
            }
            None => false,
        };

        let mut comments_posted = 0;
        if auto_comment {
            for comment in &review.comments {
                match scm.add_comment(number, comment).await {
                    Ok(()) => comments_posted += 1,
                    Err(e) => tracing::warn!(pr = number, error = %e, "failed to post AI comment"),
                }
            }
        }

        let sheet_updated = match &self.sheet {
            Some(sheet) => sheet
                .update_review_status(number, "reviewed", comments_posted)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(pr = number, error = %e, "failed to update sheet review status");
                    false
                }),
            None => false,
        };

        tracing::info!(pr = number, score = review.score, comments_posted, "review finished");
        Ok(ReviewOutcome {
            pr_number: number,
            title: pr.title,
            review,
            comments_posted,
            stored,
            sheet_updated,
            processing_time_ms,
        })
    }

    /// Review every open PR, continuing past per-PR failures.
    ///
    /// # Errors
    ///
    /// Only a failure listing the open PRs.
    pub async fn review_open_prs(&self, auto_comment: bool) -> Result<BatchReviewResult> {
        let open = self.scm()?.list_pull_requests(PrFilter::Open).await?;
        tracing::info!(count = open.len(), "reviewing open pull requests");

        let mut result = BatchReviewResult::default();
        for pr in open {
            match self.review_pr(pr.number, auto_comment).await {
                Ok(outcome) => {
                    result.reviewed_count += 1;
                    result.comments_count += outcome.comments_posted;
                    result.reviewed.push(outcome);
                }
                Err(e) => {
                    tracing::error!(pr = pr.number, error = %e, "review failed");
                    result.failures.push(PrFailure {
                        pr_number: pr.number,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(result)
    }

    async fn required_for(
        &self,
        cache: &mut HashMap<String, u32>,
        base: &str,
    ) -> Result<u32> {
        if let Some(required) = cache.get(base) {
            return Ok(*required);
        }
        let required = self.scm()?.required_approvals(base).await?;
        cache.insert(base.to_string(), required);
        Ok(required)
    }

    async fn upsert_row(&self, sheet: &dyn TrackingSheet, pr: &PullRequest) -> Result<()> {
        if sheet.find_row(pr.number).await?.is_none() {
            sheet.add_row(pr).await?;
        }
        Ok(())
    }

    /// Reconcile approvals for every PR, optionally writing them to the sheet.
    ///
    /// # Errors
    ///
    /// Only a failure listing the PRs; per-PR failures are recorded.
    pub async fn track_approvals(&self, sync_sheet: bool) -> Result<TrackingResult> {
        let scm = self.scm()?;
        let sheet = if sync_sheet { self.sheet.as_deref() } else { None };
        if sync_sheet && sheet.is_none() {
            tracing::warn!("no tracking sheet configured, approvals will not be synced");
        }

        let prs = scm.list_pull_requests(PrFilter::All).await?;
        tracing::info!(count = prs.len(), "tracking approvals");

        let mut required_cache = HashMap::new();
        let mut result = TrackingResult::default();
        for pr in prs {
            let reviews = match scm.list_reviews(pr.number).await {
                Ok(reviews) => reviews,
                Err(e) => {
                    result.failures.push(PrFailure {
                        pr_number: pr.number,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let required = match self.required_for(&mut required_cache, &pr.base_branch).await {
                Ok(required) => required,
                Err(e) => {
                    result.failures.push(PrFailure {
                        pr_number: pr.number,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let approval = ApprovalSummary::reconcile(pr.state, &reviews, required);

            let mut sheet_updated = false;
            if let Some(sheet) = sheet {
                let synced = match self.upsert_row(sheet, &pr).await {
                    Ok(()) => sheet.update_approvals(pr.number, &approval, pr.state).await,
                    Err(e) => Err(e),
                };
                match synced {
                    Ok(updated) => sheet_updated = updated,
                    Err(e) => {
                        tracing::warn!(pr = pr.number, error = %e, "failed to sync approvals to sheet");
                        result.failures.push(PrFailure {
                            pr_number: pr.number,
                            error: e.to_string(),
                        });
                    }
                }
            }
            if sheet_updated {
                result.sheets_updated += 1;
            }

            result.tracked_count += 1;
            result.records.push(ApprovalRecord {
                pr_number: pr.number,
                title: pr.title,
                state: pr.state,
                approval,
                sheet_updated,
            });
        }

        if sheet.is_some() {
            self.mark_synced();
        }
        Ok(result)
    }

    /// Review open PRs with the configured auto-comment setting, then track
    /// approvals, syncing the sheet when one is configured.
    ///
    /// # Errors
    ///
    /// Failures listing PRs in either step.
    pub async fn run_single_workflow(&self) -> Result<WorkflowResult> {
        tracing::info!("running automation workflow");
        let reviews = self.review_open_prs(self.settings.auto_comment).await?;
        let tracking = self.track_approvals(self.sheet.is_some()).await?;
        Ok(WorkflowResult {
            reviews,
            tracking,
            finished_at: Utc::now(),
        })
    }

    /// Run the workflow every `interval` until `shutdown` resolves.
    ///
    /// A failed run is followed by the retry delay instead of the interval.
    /// Returns the number of runs that completed successfully.
    pub async fn run_continuous<F>(&self, interval: Duration, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tracing::info!(interval_secs = interval.as_secs(), "starting continuous workflow");
        tokio::pin!(shutdown);
        let mut completed = 0;
        loop {
            let delay = tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.run_single_workflow() => match outcome {
                    Ok(result) => {
                        completed += 1;
                        tracing::info!(
                            reviewed = result.reviews.reviewed_count,
                            tracked = result.tracking.tracked_count,
                            "workflow run finished"
                        );
                        interval
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "workflow run failed");
                        self.settings.retry_delay
                    }
                },
            };
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!(completed, "continuous workflow stopped");
        completed
    }

    /// # Errors
    ///
    /// [`PrPilotError::ConfigurationMissing`] without a sheet, and sheet failures.
    pub async fn manage_sheet(&self, action: SheetAction) -> Result<SheetActionResult> {
        let sheet = self.sheet()?;
        match action {
            SheetAction::Setup => {
                sheet.setup().await?;
                Ok(SheetActionResult {
                    action,
                    message: "Worksheet initialized with headers".into(),
                    tracking: None,
                })
            }
            SheetAction::Clear => {
                sheet.clear().await?;
                Ok(SheetActionResult {
                    action,
                    message: "All tracking rows removed".into(),
                    tracking: None,
                })
            }
            SheetAction::Sync => {
                let tracking = self.track_approvals(true).await?;
                Ok(SheetActionResult {
                    action,
                    message: format!("Synced {} pull requests", tracking.sheets_updated),
                    tracking: Some(tracking),
                })
            }
        }
    }

    /// Submit a review after checking the PR's approval state.
    ///
    /// Fetches the PR and its reviews, reconciles, and translates `intent`.
    /// Exactly one review is posted when allowed; none when the PR is
    /// already approved and the intent would change that.
    ///
    /// # Errors
    ///
    /// [`PrPilotError::ActionNotPermitted`] from gating, and remote failures.
    pub async fn submit_review(
        &self,
        number: u64,
        intent: ReviewIntent,
        body: Option<&str>,
    ) -> Result<Review> {
        let scm = self.scm()?;
        let pr = scm.get_pull_request(number).await?;
        let reviews = scm.list_reviews(number).await?;
        let approved = is_approved(pr.state, &reviews);
        let submission = build_submission(intent, body, approved)?;
        tracing::info!(pr = number, event = %submission.event, "submitting review");
        scm.submit_review(number, &submission).await
    }

    /// # Errors
    ///
    /// Remote failures, for example deleting a review that is already submitted.
    pub async fn delete_review(&self, number: u64, review_id: u64) -> Result<()> {
        self.scm()?.delete_review(number, review_id).await?;
        tracing::info!(pr = number, review_id, "deleted review");
        Ok(())
    }

    /// Branches, labels, and collaborators, fetched concurrently.
    ///
    /// Each list falls back to empty on its own failure, which is recorded in
    /// `failures`. This never errors.
    pub async fn form_options(&self) -> FormOptions {
        let scm = match self.scm() {
            Ok(scm) => scm,
            Err(e) => {
                let error = e.to_string();
                return FormOptions {
                    failures: ["branches", "labels", "collaborators"]
                        .iter()
                        .map(|source| SourceFailure {
                            source: source.to_string(),
                            error: error.clone(),
                        })
                        .collect(),
                    ..FormOptions::default()
                };
            }
        };

        let (branches, labels, collaborators) = tokio::join!(
            scm.list_branches(),
            scm.list_labels(),
            scm.list_collaborators()
        );

        let mut failures = Vec::new();
        let mut settle = |source: &str, e: PrPilotError| {
            tracing::warn!(%source, error = %e, "form option source failed");
            failures.push(SourceFailure {
                source: source.to_string(),
                error: e.to_string(),
            });
        };
        let branches = branches.unwrap_or_else(|e| {
            settle("branches", e);
            Vec::new()
        });
        let labels = labels.unwrap_or_else(|e| {
            settle("labels", e);
            Vec::new()
        });
        let collaborators = collaborators.unwrap_or_else(|e| {
            settle("collaborators", e);
            Vec::new()
        });

        FormOptions {
            branches,
            labels,
            collaborators,
            failures,
        }
    }

    /// Open PRs that are not approved.
    ///
    /// # Errors
    ///
    /// Remote failures listing PRs or reviews.
    pub async fn pending_reviews(&self) -> Result<Vec<PullRequest>> {
        let scm = self.scm()?;
        let open = scm.list_pull_requests(PrFilter::Open).await?;
        let mut pending = Vec::new();
        for pr in open {
            if self.is_pending(&pr).await? {
                pending.push(pr);
            }
        }
        Ok(pending)
    }

    async fn is_pending(&self, pr: &PullRequest) -> Result<bool> {
        let reviews = self.scm()?.list_reviews(pr.number).await?;
        Ok(!is_approved(pr.state, &reviews))
    }

    /// # Errors
    ///
    /// Remote failures listing PRs or reviews.
    pub async fn status(&self) -> Result<StatusInfo> {
        let scm = self.scm()?;
        let open = scm.list_pull_requests(PrFilter::Open).await?;
        let mut pending_reviews = 0;
        for pr in &open {
            if self.is_pending(pr).await? {
                pending_reviews += 1;
            }
        }
        let sheets_connected = match &self.sheet {
            Some(sheet) => sheet.test_connection().await,
            None => false,
        };
        Ok(StatusInfo {
            repository: scm.repository(),
            open_prs: open.len() as u64,
            pending_reviews,
            sheets_connected,
            ai_model: self.ai_model(),
            last_sync: self.last_sync(),
        })
    }

    /// # Errors
    ///
    /// Remote failures listing PRs, reviews, or branch protection.
    pub async fn repo_stats(&self) -> Result<RepoStats> {
        let scm = self.scm()?;
        let all = scm.list_pull_requests(PrFilter::All).await?;
        let mut stats = RepoStats {
            total_prs: all.len() as u64,
            ..RepoStats::default()
        };

        let mut required_cache = HashMap::new();
        for pr in all.iter().filter(|pr| pr.state == PrState::Open) {
            stats.open_prs += 1;
            let reviews = scm.list_reviews(pr.number).await?;
            let required = self.required_for(&mut required_cache, &pr.base_branch).await?;
            let approval = ApprovalSummary::reconcile(pr.state, &reviews, required);
            if approval.approved {
                stats.approved_prs += 1;
            } else {
                stats.pending_reviews += u64::from(approval.pending_reviews);
            }
        }
        stats.closed_prs = stats.total_prs - stats.open_prs;
        if stats.total_prs > 0 {
            let rate = stats.approved_prs as f64 / stats.total_prs as f64 * 100.0;
            stats.approval_rate = (rate * 10.0).round() / 10.0;
        }
        Ok(stats)
    }

    /// Sheet and store statistics. Missing pieces are skipped; failures are
    /// recorded rather than raised.
    pub async fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        if let Some(sheet) = &self.sheet {
            match sheet.rows().await {
                Ok(rows) => stats.sheet = Some(sheets::statistics(&rows)),
                Err(e) => stats.failures.push(SourceFailure {
                    source: "sheet".into(),
                    error: e.to_string(),
                }),
            }
        }
        if let Some(store) = &self.store {
            match store.statistics() {
                Ok(s) => stats.reviews = Some(s),
                Err(e) => stats.failures.push(SourceFailure {
                    source: "store".into(),
                    error: e.to_string(),
                }),
            }
        }
        stats
    }

    /// PRs matching `filter`, each with its reconciled approval.
    ///
    /// # Errors
    ///
    /// Remote failures listing PRs, reviews, or branch protection.
    pub async fn pull_requests(&self, filter: PrFilter) -> Result<Vec<PullRequestView>> {
        let scm = self.scm()?;
        let mut required_cache = HashMap::new();
        let mut views = Vec::new();
        for pr in scm.list_pull_requests(filter).await? {
            let reviews = scm.list_reviews(pr.number).await?;
            let required = self.required_for(&mut required_cache, &pr.base_branch).await?;
            views.push(view(pr, &reviews, required));
        }
        Ok(views)
    }

    /// # Errors
    ///
    /// Remote failures.
    pub async fn pull_request(&self, number: u64) -> Result<PullRequestView> {
        let scm = self.scm()?;
        let pr = scm.get_pull_request(number).await?;
        let reviews = scm.list_reviews(number).await?;
        let required = scm.required_approvals(&pr.base_branch).await?;
        Ok(view(pr, &reviews, required))
    }

    /// # Errors
    ///
    /// Remote failures.
    pub async fn reviews(&self, number: u64) -> Result<ReviewsView> {
        let scm = self.scm()?;
        let pr = scm.get_pull_request(number).await?;
        let reviews = scm.list_reviews(number).await?;
        Ok(ReviewsView {
            pr_number: number,
            is_approved: is_approved(pr.state, &reviews),
            reviews,
        })
    }

    /// # Errors
    ///
    /// Remote failures.
    pub async fn files(&self, number: u64) -> Result<Vec<PrFile>> {
        self.scm()?.list_files(number).await
    }

    /// # Errors
    ///
    /// [`PrPilotError::ConfigurationMissing`] when the store is disabled.
    pub fn stored_review(&self, number: u64) -> Result<Option<StoredReview>> {
        self.store()?.get(number)
    }

    /// Remove the stored AI review for PR `number`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// [`PrPilotError::ConfigurationMissing`] when the store is disabled.
    pub fn delete_stored_review(&self, number: u64) -> Result<bool> {
        let removed = self.store()?.delete(number)?;
        if removed {
            tracing::info!(pr = number, "deleted stored AI review");
        }
        Ok(removed)
    }

    /// Stored reviews, newest first, optionally filtered by `query`.
    ///
    /// # Errors
    ///
    /// [`PrPilotError::ConfigurationMissing`] when the store is disabled.
    pub fn stored_reviews(&self, query: Option<&str>, limit: usize) -> Result<Vec<StoredReview>> {
        let store = self.store()?;
        match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => store.search(q, limit),
            None => store.list(limit),
        }
    }

    /// Probe one collaborator. Failures are reported in the result.
    pub async fn test_connection(&self, service: Service) -> ConnectionCheck {
        let outcome: Result<String> = match service {
            Service::GitHub => match self.scm() {
                Ok(scm) => scm
                    .list_branches()
                    .await
                    .map(|b| format!("connected to {} ({} branches)", scm.repository(), b.len())),
                Err(e) => Err(e),
            },
            Service::Llm => self
                .ai()
                .map(|ai| format!("model {} configured", ai.model())),
            Service::Sheets => match self.sheet() {
                Ok(sheet) => {
                    if sheet.test_connection().await {
                        Ok("worksheet reachable".into())
                    } else {
                        Err(PrPilotError::remote(
                            Service::Sheets,
                            None,
                            "worksheet is not reachable",
                        ))
                    }
                }
                Err(e) => Err(e),
            },
        };
        match outcome {
            Ok(message) => ConnectionCheck {
                service,
                success: true,
                message,
            },
            Err(e) => ConnectionCheck {
                service,
                success: false,
                message: e.to_string(),
            },
        }
    }
}

fn view(pr: PullRequest, reviews: &[Review], required: u32) -> PullRequestView {
    let approval = ApprovalSummary::reconcile(pr.state, reviews, required);
    PullRequestView {
        is_approved: approval.approved,
        pull_request: pr,
        approval,
    }
}
