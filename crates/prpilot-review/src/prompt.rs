use prpilot_core::{AiComment, AiReview, BranchInfo, PrContent, PrFile, PullRequest};
use serde::Deserialize;

/// Characters of each file patch included in a review prompt.
const MAX_PATCH_CHARS: usize = 1000;

const REVIEW_SYSTEM_PROMPT: &str = "\
You are an expert code reviewer. Provide thorough, constructive feedback \
focusing on code quality, security, and best practices.

Respond with a JSON object only:
{
  \"summary\": \"Overall review summary\",
  \"score\": 0-10,
  \"comments\": [
    { \"body\": \"Comment text\", \"path\": \"file/path.rs\", \"line\": 42 }
  ],
  \"suggestions\": [\"suggestion\"],
  \"issues\": [\"issue\"]
}

Only attach a path and line to a comment when the line appears in the diff.";

const CONTENT_SYSTEM_PROMPT: &str = "\
You are an expert software developer helping to create pull requests. \
Provide clear, professional, and helpful PR content.

Respond with a JSON object only:
{
  \"title\": \"Concise, descriptive title\",
  \"description\": \"What changed and why, in Markdown\",
  \"labels\": [\"enhancement\"],
  \"reviewers\": [\"github-login\"]
}";

/// System prompt for pull request reviews.
///
/// # Examples
///
/// ```
/// use prpilot_review::prompt::build_review_system_prompt;
///
/// assert!(build_review_system_prompt().contains("\"score\""));
/// ```
pub fn build_review_system_prompt() -> String {
    REVIEW_SYSTEM_PROMPT.to_string()
}

/// User prompt describing `pr` and its changed files.
///
/// Each patch is cut to its first thousand characters.
pub fn build_review_prompt(pr: &PullRequest, files: &[PrFile]) -> String {
    let mut prompt = format!(
        "Please review this pull request.\n\n\
         Pull Request: #{} - {}\n\
         Author: {}\n\
         Description: {}\n\
         Files Changed: {} files\n",
        pr.number,
        pr.title,
        pr.author,
        if pr.body.trim().is_empty() { "(none)" } else { pr.body.trim() },
        files.len()
    );

    for file in files {
        prompt.push_str(&format!(
            "\nFile: {}\nStatus: {}\nChanges: +{} -{}\n",
            file.filename, file.status, file.additions, file.deletions
        ));
        if let Some(patch) = &file.patch {
            let (cut, truncated) = truncate_chars(patch, MAX_PATCH_CHARS);
            prompt.push_str("```diff\n");
            prompt.push_str(cut);
            if truncated {
                prompt.push_str("\n... (truncated)");
            }
            prompt.push_str("\n```\n");
        }
    }

    prompt.push_str(
        "\nCover the overall assessment and score, specific improvements, \
         potential bugs, better practices, and security considerations.\n",
    );
    prompt
}

/// System prompt for generating pull request content.
pub fn build_content_system_prompt() -> String {
    CONTENT_SYSTEM_PROMPT.to_string()
}

/// User prompt describing a branch, optionally led by the user's own instructions.
///
/// # Examples
///
/// ```
/// use prpilot_core::BranchInfo;
/// use prpilot_review::prompt::build_content_prompt;
///
/// let info = BranchInfo {
///     branch: "feature/login".into(),
///     base: "main".into(),
///     commits: vec![],
///     files: vec![],
/// };
/// let prompt = build_content_prompt(&info, Some("Mention the ticket ABC-1"));
/// assert!(prompt.starts_with("Mention the ticket ABC-1"));
/// assert!(prompt.contains("feature/login"));
/// ```
pub fn build_content_prompt(info: &BranchInfo, custom_prompt: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(custom) = custom_prompt.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(custom);
        prompt.push_str("\n\n");
    }

    let additions: u64 = info.files.iter().map(|f| f.additions).sum();
    let deletions: u64 = info.files.iter().map(|f| f.deletions).sum();
    prompt.push_str(&format!(
        "Generate a pull request for the following branch.\n\n\
         Branch: {} (into {})\n\
         Additions: {additions}\n\
         Deletions: {deletions}\n",
        info.branch, info.base
    ));

    if !info.commits.is_empty() {
        prompt.push_str("\nRecent commits:\n");
        for commit in &info.commits {
            let headline = commit.message.lines().next().unwrap_or_default();
            prompt.push_str(&format!("- {headline} ({})\n", commit.author));
        }
    }
    if !info.files.is_empty() {
        prompt.push_str("\nFiles changed:\n");
        for file in &info.files {
            prompt.push_str(&format!(
                "- {} ({}, +{} -{})\n",
                file.filename, file.status, file.additions, file.deletions
            ));
        }
    }
    prompt
}

#[derive(Deserialize)]
struct LlmReview {
    summary: Option<String>,
    score: Option<serde_json::Value>,
    #[serde(default)]
    comments: Vec<LlmComment>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    issues: Vec<String>,
}

#[derive(Deserialize)]
struct LlmComment {
    #[serde(default)]
    body: String,
    path: Option<String>,
    line: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct LlmContent {
    title: Option<String>,
    #[serde(alias = "body")]
    description: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    reviewers: Vec<String>,
}

/// Parse the model's review of `pr`.
///
/// Handles code fences and prose around the JSON object. Output that is not
/// a review yields [`AiReview::fallback`]; the score is clamped to `0..=10`.
///
/// # Examples
///
/// ```
/// # use chrono::Utc;
/// # use prpilot_core::{PrState, PullRequest};
/// use prpilot_review::prompt::parse_review_response;
///
/// # let pr = PullRequest {
/// #     number: 3, title: "Fix".into(), body: String::new(), state: PrState::Open,
/// #     html_url: String::new(), head_branch: "fix".into(), base_branch: "main".into(),
/// #     created_at: Utc::now(), updated_at: Utc::now(), author: "a".into(),
/// #     labels: vec![], reviewers: vec![],
/// # };
/// let review = parse_review_response(r#"{"summary":"ok","score":12}"#, &pr);
/// assert_eq!(review.score, 10.0);
///
/// let fallback = parse_review_response("not json", &pr);
/// assert_eq!(fallback.score, 7.0);
/// ```
pub fn parse_review_response(response: &str, pr: &PullRequest) -> AiReview {
    let parsed: LlmReview = match serde_json::from_str(extract_json(response)) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(pr = pr.number, error = %e, "unusable review from model, using fallback");
            return AiReview::fallback(pr.number, &pr.title);
        }
    };

    let score = match &parsed.score {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(7.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(7.0),
        _ => 7.0,
    };
    let score = if score.is_finite() { score.clamp(0.0, 10.0) } else { 7.0 };

    let comments = parsed
        .comments
        .into_iter()
        .filter(|c| !c.body.trim().is_empty())
        .map(|c| {
            let line = match &c.line {
                Some(serde_json::Value::Number(n)) => n.as_u64().filter(|l| *l > 0),
                Some(serde_json::Value::String(s)) => s.trim().parse().ok().filter(|l| *l > 0),
                _ => None,
            };
            let path = c.path.filter(|p| !p.trim().is_empty());
            AiComment {
                body: c.body.trim().to_string(),
                path,
                line,
            }
        })
        .collect();

    AiReview {
        summary: parsed
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "AI review completed".to_string()),
        score,
        suggestions: parsed.suggestions,
        issues: parsed.issues,
        comments,
    }
}

/// Parse generated PR content for `branch`, falling back to
/// [`PrContent::fallback`] when the output is unusable.
pub fn parse_content_response(response: &str, branch: &str) -> PrContent {
    let parsed: LlmContent = match serde_json::from_str(extract_json(response)) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(%branch, error = %e, "unusable PR content from model, using fallback");
            return PrContent::fallback(branch);
        }
    };

    let fallback = PrContent::fallback(branch);
    PrContent {
        title: parsed
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or(fallback.title),
        body: parsed
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Changes from branch {branch}")),
        labels: clean_list(parsed.labels),
        reviewers: clean_list(parsed.reviewers),
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim().trim_start_matches('@').to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn extract_json(s: &str) -> &str {
    let stripped = strip_code_fences(s);
    if stripped.starts_with('{') {
        return stripped;
    }
    match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if start < end => &stripped[start..=end],
        _ => stripped,
    }
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}

fn truncate_chars(s: &str, max: usize) -> (&str, bool) {
    match s.char_indices().nth(max) {
        Some((idx, _)) => (&s[..idx], true),
        None => (s, false),
    }
}
