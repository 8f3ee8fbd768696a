use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prpilot_core::{
    AiComment, Branch, BranchInfo, Collaborator, CommitSummary, GitHubConfig, Label,
    NewPullRequest, PrFile, PrPilotError, PrState, PullRequest, RepoRef, Result, Review,
    ReviewState, ReviewSubmission, Service,
};
use reqwest::header::{HeaderName, ACCEPT};
use serde::Deserialize;

use crate::collaborators::{PrFilter, SourceControl};
use crate::rest::RestClient;

const COMMITS_IN_BRANCH_INFO: &str = "5";

/// GitHub REST client for one repository.
///
/// # Examples
///
/// ```
/// use prpilot_core::GitHubConfig;
/// use prpilot_review::github::GitHubClient;
///
/// let config = GitHubConfig {
///     token: Some("ghp_xxxx".into()),
///     repository: Some("octocat/hello-world".into()),
///     ..GitHubConfig::default()
/// };
/// let client = GitHubClient::new(&config).unwrap();
/// assert_eq!(client.repo().to_string(), "octocat/hello-world");
/// ```
pub struct GitHubClient {
    rest: RestClient,
    repo: RepoRef,
}

impl GitHubClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::ConfigurationMissing`] if the token or
    /// repository is not set, and [`PrPilotError::Validation`] if either is
    /// malformed.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let token = config.require_token()?;
        let repo = config.repo()?;
        let rest = RestClient::new(Service::GitHub, &config.api_url, 30)?
            .with_bearer(token)?
            .with_header(ACCEPT, "application/vnd.github+json")?
            .with_header(
                HeaderName::from_static("x-github-api-version"),
                "2022-11-28",
            )?;
        Ok(Self { rest, repo })
    }

    /// Repository this client is bound to.
    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    fn path<'a>(&'a self, tail: &[&'a str]) -> Vec<&'a str> {
        let mut segments = vec!["repos", self.repo.owner.as_str(), self.repo.name.as_str()];
        segments.extend_from_slice(tail);
        segments
    }

    async fn raw_pull(&self, number: u64) -> Result<GhPull> {
        let n = number.to_string();
        self.rest.get(&self.path(&["pulls", n.as_str()]), &[]).await
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    fn repository(&self) -> String {
        self.repo.to_string()
    }

    async fn list_pull_requests(&self, filter: PrFilter) -> Result<Vec<PullRequest>> {
        let pulls: Vec<GhPull> = self
            .rest
            .get_paged(
                &self.path(&["pulls"]),
                &[
                    ("state", filter.as_str()),
                    ("sort", "updated"),
                    ("direction", "desc"),
                    ("per_page", "100"),
                ],
            )
            .await?;
        tracing::debug!(count = pulls.len(), %filter, "listed pull requests");
        Ok(pulls.into_iter().map(PullRequest::from).collect())
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        Ok(self.raw_pull(number).await?.into())
    }

    async fn list_reviews(&self, number: u64) -> Result<Vec<Review>> {
        let n = number.to_string();
        let reviews: Vec<GhReview> = self
            .rest
            .get_paged(&self.path(&["pulls", n.as_str(), "reviews"]), &[("per_page", "100")])
            .await?;
        Ok(reviews.into_iter().map(Review::from).collect())
    }

    async fn list_files(&self, number: u64) -> Result<Vec<PrFile>> {
        let n = number.to_string();
        let files: Vec<GhFile> = self
            .rest
            .get_paged(&self.path(&["pulls", n.as_str(), "files"]), &[("per_page", "100")])
            .await?;
        Ok(files.into_iter().map(PrFile::from).collect())
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        if request.title.trim().is_empty() {
            return Err(PrPilotError::Validation("pull request title is empty".into()));
        }
        if request.head == request.base {
            return Err(PrPilotError::Validation(format!(
                "head and base are both '{}'",
                request.head
            )));
        }

        let body = serde_json::json!({
            "title": request.title,
            "head": request.head,
            "base": request.base,
            "body": request.body,
        });
        let created: GhPull = self.rest.post(&self.path(&["pulls"]), &[], &body).await?;
        let mut pr = PullRequest::from(created);
        tracing::info!(pr = pr.number, head = %request.head, "created pull request");

        let n = pr.number.to_string();
        if !request.labels.is_empty() {
            let labels = serde_json::json!({ "labels": request.labels });
            match self
                .rest
                .post::<_, serde_json::Value>(
                    &self.path(&["issues", n.as_str(), "labels"]),
                    &[],
                    &labels,
                )
                .await
            {
                Ok(_) => pr.labels = request.labels.clone(),
                Err(e) => tracing::warn!(pr = pr.number, error = %e, "failed to add labels"),
            }
        }
        if !request.reviewers.is_empty() {
            let reviewers = serde_json::json!({ "reviewers": request.reviewers });
            match self
                .rest
                .post::<_, serde_json::Value>(
                    &self.path(&["pulls", n.as_str(), "requested_reviewers"]),
                    &[],
                    &reviewers,
                )
                .await
            {
                Ok(_) => pr.reviewers = request.reviewers.clone(),
                Err(e) => tracing::warn!(pr = pr.number, error = %e, "failed to request reviewers"),
            }
        }
        Ok(pr)
    }

    async fn submit_review(&self, number: u64, submission: &ReviewSubmission) -> Result<Review> {
        let n = number.to_string();
        let review: GhReview = self
            .rest
            .post(&self.path(&["pulls", n.as_str(), "reviews"]), &[], submission)
            .await?;
        tracing::info!(pr = number, event = %submission.event, "submitted review");
        Ok(review.into())
    }

    async fn delete_review(&self, number: u64, review_id: u64) -> Result<()> {
        let n = number.to_string();
        let id = review_id.to_string();
        let _deleted: serde_json::Value = self
            .rest
            .delete(&self.path(&["pulls", n.as_str(), "reviews", id.as_str()]))
            .await?;
        Ok(())
    }

    async fn add_comment(&self, number: u64, comment: &AiComment) -> Result<()> {
        let n = number.to_string();
        match (&comment.path, comment.line) {
            (Some(path), Some(line)) => {
                let head = self.raw_pull(number).await?.head.sha;
                let body = serde_json::json!({
                    "body": comment.body,
                    "commit_id": head,
                    "path": path,
                    "line": line,
                    "side": "RIGHT",
                });
                let _: serde_json::Value = self
                    .rest
                    .post(&self.path(&["pulls", n.as_str(), "comments"]), &[], &body)
                    .await?;
            }
            _ => {
                let body = serde_json::json!({ "body": comment.body });
                let _: serde_json::Value = self
                    .rest
                    .post(&self.path(&["issues", n.as_str(), "comments"]), &[], &body)
                    .await?;
            }
        }
        Ok(())
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        let branches: Vec<GhBranch> = self
            .rest
            .get_paged(&self.path(&["branches"]), &[("per_page", "100")])
            .await?;
        Ok(branches.into_iter().map(Branch::from).collect())
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        let labels: Vec<GhLabel> = self
            .rest
            .get_paged(&self.path(&["labels"]), &[("per_page", "100")])
            .await?;
        Ok(labels.into_iter().map(Label::from).collect())
    }

    async fn list_collaborators(&self) -> Result<Vec<Collaborator>> {
        let people: Vec<GhCollaborator> = self
            .rest
            .get_paged(&self.path(&["collaborators"]), &[("per_page", "100")])
            .await?;
        Ok(people.into_iter().map(Collaborator::from).collect())
    }

    async fn branch_info(&self, branch: &str, base: &str) -> Result<BranchInfo> {
        let _branch: GhBranch = self
            .rest
            .get(&self.path(&["branches", branch]), &[])
            .await
            .map_err(|e| match e.status() {
                Some(404) => PrPilotError::Validation(format!("branch '{branch}' does not exist")),
                _ => e,
            })?;

        let commits: Vec<GhCommit> = self
            .rest
            .get(
                &self.path(&["commits"]),
                &[("sha", branch), ("per_page", COMMITS_IN_BRANCH_INFO)],
            )
            .await?;

        let range = format!("{base}...{branch}");
        let compare: GhCompare = self
            .rest
            .get(&self.path(&["compare", range.as_str()]), &[])
            .await?;

        Ok(BranchInfo {
            branch: branch.to_string(),
            base: base.to_string(),
            commits: commits.into_iter().map(CommitSummary::from).collect(),
            files: compare.files.into_iter().map(PrFile::from).collect(),
        })
    }

    async fn required_approvals(&self, base_branch: &str) -> Result<u32> {
        let protection: std::result::Result<GhProtection, PrPilotError> = self
            .rest
            .get(&self.path(&["branches", base_branch, "protection"]), &[])
            .await;
        match protection {
            Ok(p) => Ok(p
                .required_pull_request_reviews
                .and_then(|r| r.required_approving_review_count)
                .unwrap_or(1)),
            // Unprotected branches answer 404; tokens without admin scope get 403.
            Err(e) if matches!(e.status(), Some(403) | Some(404)) => Ok(1),
            Err(e) => Err(e),
        }
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        let n = number.to_string();
        let body = serde_json::json!({ "merge_method": "squash" });
        let _: serde_json::Value = self
            .rest
            .put(&self.path(&["pulls", n.as_str(), "merge"]), &[], &body)
            .await?;
        tracing::info!(pr = number, "merged pull request");
        Ok(())
    }
}

#[derive(Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Deserialize)]
struct GhRef {
    #[serde(rename = "ref")]
    name: String,
    sha: String,
}

#[derive(Deserialize)]
struct GhLabel {
    name: String,
    #[serde(default)]
    color: String,
    description: Option<String>,
}

impl From<GhLabel> for Label {
    fn from(l: GhLabel) -> Self {
        Label {
            name: l.name,
            color: l.color,
            description: l.description,
        }
    }
}

#[derive(Deserialize)]
struct GhPull {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    html_url: String,
    head: GhRef,
    base: GhRef,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    merged: bool,
    user: Option<GhUser>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default)]
    requested_reviewers: Vec<GhUser>,
}

impl From<GhPull> for PullRequest {
    fn from(p: GhPull) -> Self {
        let state = if p.merged || p.merged_at.is_some() {
            PrState::Merged
        } else if p.state == "open" {
            PrState::Open
        } else {
            PrState::Closed
        };
        PullRequest {
            number: p.number,
            title: p.title,
            body: p.body.unwrap_or_default(),
            state,
            html_url: p.html_url,
            head_branch: p.head.name,
            base_branch: p.base.name,
            created_at: p.created_at,
            updated_at: p.updated_at,
            author: p.user.map(|u| u.login).unwrap_or_default(),
            labels: p.labels.into_iter().map(|l| l.name).collect(),
            reviewers: p.requested_reviewers.into_iter().map(|u| u.login).collect(),
        }
    }
}

#[derive(Deserialize)]
struct GhReview {
    id: u64,
    user: Option<GhUser>,
    body: Option<String>,
    state: ReviewState,
    submitted_at: Option<DateTime<Utc>>,
    commit_id: Option<String>,
}

impl From<GhReview> for Review {
    fn from(r: GhReview) -> Self {
        Review {
            id: r.id,
            user: r.user.map(|u| u.login).unwrap_or_default(),
            body: r.body.unwrap_or_default(),
            state: r.state,
            submitted_at: r.submitted_at,
            commit_id: r.commit_id,
        }
    }
}

#[derive(Deserialize)]
struct GhFile {
    filename: String,
    status: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changes: u64,
    patch: Option<String>,
}

impl From<GhFile> for PrFile {
    fn from(f: GhFile) -> Self {
        PrFile {
            filename: f.filename,
            status: f.status,
            additions: f.additions,
            deletions: f.deletions,
            changes: f.changes,
            patch: f.patch,
        }
    }
}

#[derive(Deserialize)]
struct GhCommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct GhBranch {
    name: String,
    commit: GhCommitRef,
    #[serde(default)]
    protected: bool,
}

impl From<GhBranch> for Branch {
    fn from(b: GhBranch) -> Self {
        Branch {
            name: b.name,
            sha: b.commit.sha,
            protected: b.protected,
        }
    }
}

#[derive(Deserialize)]
struct GhCollaborator {
    login: String,
    avatar_url: Option<String>,
    #[serde(default)]
    permissions: BTreeMap<String, bool>,
}

impl From<GhCollaborator> for Collaborator {
    fn from(c: GhCollaborator) -> Self {
        Collaborator {
            login: c.login,
            avatar_url: c.avatar_url,
            permissions: c
                .permissions
                .into_iter()
                .filter_map(|(name, granted)| granted.then_some(name))
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct GhGitAuthor {
    name: String,
}

#[derive(Deserialize)]
struct GhCommitDetail {
    message: String,
    author: Option<GhGitAuthor>,
}

#[derive(Deserialize)]
struct GhCommit {
    sha: String,
    commit: GhCommitDetail,
    author: Option<GhUser>,
}

impl From<GhCommit> for CommitSummary {
    fn from(c: GhCommit) -> Self {
        let author = c
            .author
            .map(|u| u.login)
            .or(c.commit.author.map(|a| a.name))
            .unwrap_or_default();
        CommitSummary {
            sha: c.sha,
            message: c.commit.message,
            author,
        }
    }
}

#[derive(Deserialize)]
struct GhCompare {
    #[serde(default)]
    files: Vec<GhFile>,
}

#[derive(Deserialize)]
struct GhRequiredReviews {
    required_approving_review_count: Option<u32>,
}

#[derive(Deserialize)]
struct GhProtection {
    required_pull_request_reviews: Option<GhRequiredReviews>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull_json(state: &str, merged_at: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "number": 12,
            "title": "Add login",
            "body": null,
            "state": state,
            "html_url": "https://github.com/o/r/pull/12",
            "head": { "ref": "feature/login", "sha": "abc" },
            "base": { "ref": "main", "sha": "def" },
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-02T10:00:00Z",
            "merged_at": merged_at,
            "user": { "login": "alice", "avatar_url": null },
            "labels": [{ "name": "bug", "color": "d73a4a", "description": null }],
            "requested_reviewers": [{ "login": "bob", "avatar_url": null }]
        })
    }

    #[test]
    fn open_pull_converts() {
        let raw: GhPull = serde_json::from_value(pull_json("open", None)).unwrap();
        let pr = PullRequest::from(raw);
        assert_eq!(pr.state, PrState::Open);
        assert_eq!(pr.head_branch, "feature/login");
        assert_eq!(pr.author, "alice");
        assert_eq!(pr.labels, vec!["bug".to_string()]);
        assert_eq!(pr.reviewers, vec!["bob".to_string()]);
        assert_eq!(pr.body, "");
    }

    #[test]
    fn closed_with_merge_time_is_merged() {
        let raw: GhPull =
            serde_json::from_value(pull_json("closed", Some("2024-05-03T10:00:00Z"))).unwrap();
        assert_eq!(PullRequest::from(raw).state, PrState::Merged);

        let raw: GhPull = serde_json::from_value(pull_json("closed", None)).unwrap();
        assert_eq!(PullRequest::from(raw).state, PrState::Closed);
    }

    #[test]
    fn review_with_unknown_state_converts() {
        let raw: GhReview = serde_json::from_value(serde_json::json!({
            "id": 1,
            "user": { "login": "carol" },
            "body": "",
            "state": "BRAND_NEW_STATE",
            "submitted_at": "2024-05-01T10:00:00Z",
            "commit_id": "abc"
        }))
        .unwrap();
        let review = Review::from(raw);
        assert_eq!(review.state, ReviewState::Unknown);
        assert_eq!(review.user, "carol");
    }

    #[test]
    fn collaborator_keeps_granted_permissions() {
        let raw: GhCollaborator = serde_json::from_value(serde_json::json!({
            "login": "dave",
            "avatar_url": "https://avatars/dave",
            "permissions": { "admin": false, "push": true, "pull": true }
        }))
        .unwrap();
        let c = Collaborator::from(raw);
        assert_eq!(c.permissions, vec!["pull".to_string(), "push".to_string()]);
    }

    #[test]
    fn missing_token_fails_before_any_request() {
        let config = GitHubConfig {
            repository: Some("o/r".into()),
            ..GitHubConfig::default()
        };
        assert!(matches!(
            GitHubClient::new(&config),
            Err(PrPilotError::ConfigurationMissing(_))
        ));
    }
}
