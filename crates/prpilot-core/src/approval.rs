//! Approval reconciliation and review-action gating.
//!
//! Everything here is a pure function over data the caller already fetched.
//! Nothing in this module talks to a remote service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PrPilotError;
use crate::types::{PrState, Review, ReviewState};

/// Whether a pull request counts as approved.
///
/// A merged pull request is always approved. Otherwise any review in the
/// history with state `APPROVED` is enough, even if the same reviewer later
/// requested changes. Unknown review states never approve.
///
/// # Examples
///
/// ```
/// use prpilot_core::{is_approved, PrState};
///
/// assert!(!is_approved(PrState::Open, &[]));
/// assert!(is_approved(PrState::Merged, &[]));
/// ```
pub fn is_approved(state: PrState, reviews: &[Review]) -> bool {
    state == PrState::Merged || reviews.iter().any(|r| r.state == ReviewState::Approved)
}

/// Approval bookkeeping for one pull request, as written to the tracking sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSummary {
    /// Result of [`is_approved`].
    pub approved: bool,
    /// Distinct logins that submitted an approving review, in first-approval order.
    pub approved_by: Vec<String>,
    /// Number of distinct approvers.
    pub approved_reviews: u32,
    /// Approvals required by branch protection.
    pub required_reviews: u32,
    /// Approvals still missing to reach `required_reviews`.
    pub pending_reviews: u32,
}

impl ApprovalSummary {
    /// Reconcile a review history against the required approval count.
    ///
    /// # Examples
    ///
    /// ```
    /// use prpilot_core::{ApprovalSummary, PrState};
    ///
    /// let summary = ApprovalSummary::reconcile(PrState::Open, &[], 2);
    /// assert!(!summary.approved);
    /// assert_eq!(summary.pending_reviews, 2);
    /// assert_eq!(summary.approvals_cell(), "0/2");
    /// ```
    pub fn reconcile(state: PrState, reviews: &[Review], required_reviews: u32) -> Self {
        let mut approved_by: Vec<String> = Vec::new();
        for review in reviews {
            if review.state == ReviewState::Approved && !approved_by.contains(&review.user) {
                approved_by.push(review.user.clone());
            }
        }
        let approved_reviews = approved_by.len() as u32;
        Self {
            approved: is_approved(state, reviews),
            approved_by,
            approved_reviews,
            required_reviews,
            pending_reviews: required_reviews.saturating_sub(approved_reviews),
        }
    }

    /// Whether the number of distinct approvers meets branch protection.
    pub fn meets_requirement(&self) -> bool {
        self.approved_reviews >= self.required_reviews
    }

    /// Text for the sheet's Approvals column, e.g. `1/1 ✅`.
    pub fn approvals_cell(&self) -> String {
        let mut cell = format!("{}/{}", self.approved_reviews, self.required_reviews);
        if self.approved {
            cell.push_str(" \u{2705}");
        }
        cell
    }
}

/// What the user wants to do with a review.
///
/// # Examples
///
/// ```
/// use prpilot_core::ReviewIntent;
///
/// let intent: ReviewIntent = "request-changes".parse().unwrap();
/// assert_eq!(intent, ReviewIntent::RequestChanges);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewIntent {
    Comment,
    Approve,
    RequestChanges,
}

impl ReviewIntent {
    /// Event sent to the source-control service for this intent.
    pub fn event(self) -> ReviewEvent {
        match self {
            ReviewIntent::Comment => ReviewEvent::Comment,
            ReviewIntent::Approve => ReviewEvent::Approve,
            ReviewIntent::RequestChanges => ReviewEvent::RequestChanges,
        }
    }

    /// Whether this intent changes the pull request's approval state.
    pub fn changes_approval(self) -> bool {
        !matches!(self, ReviewIntent::Comment)
    }
}

impl fmt::Display for ReviewIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewIntent::Comment => write!(f, "comment"),
            ReviewIntent::Approve => write!(f, "approve"),
            ReviewIntent::RequestChanges => write!(f, "request_changes"),
        }
    }
}

impl FromStr for ReviewIntent {
    type Err = PrPilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "comment" => Ok(ReviewIntent::Comment),
            "approve" => Ok(ReviewIntent::Approve),
            "request_changes" => Ok(ReviewIntent::RequestChanges),
            other => Err(PrPilotError::Validation(format!(
                "unknown review action '{other}', expected comment, approve or request_changes"
            ))),
        }
    }
}

/// Review event in the source-control service's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
    Comment,
    Approve,
    RequestChanges,
}

impl fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewEvent::Comment => write!(f, "COMMENT"),
            ReviewEvent::Approve => write!(f, "APPROVE"),
            ReviewEvent::RequestChanges => write!(f, "REQUEST_CHANGES"),
        }
    }
}

/// An inline comment attached to a review submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewLineComment {
    pub path: String,
    pub line: u64,
    pub body: String,
}

/// A review ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub event: ReviewEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<ReviewLineComment>,
}

/// Translate a review intent into a submission, refusing approval changes on
/// an approved pull request.
///
/// The body is trimmed. An empty body is replaced by `"Approved"` or
/// `"Changes requested"` for the approval-changing events and dropped for
/// comments.
///
/// # Errors
///
/// Returns [`PrPilotError::ActionNotPermitted`] when `already_approved` is
/// true and the intent is approve or request changes.
///
/// # Examples
///
/// ```
/// use prpilot_core::{build_submission, ReviewEvent, ReviewIntent};
///
/// let sub = build_submission(ReviewIntent::Approve, None, false).unwrap();
/// assert_eq!(sub.event, ReviewEvent::Approve);
/// assert_eq!(sub.body.as_deref(), Some("Approved"));
///
/// assert!(build_submission(ReviewIntent::Approve, None, true).is_err());
/// ```
pub fn build_submission(
    intent: ReviewIntent,
    body: Option<&str>,
    already_approved: bool,
) -> Result<ReviewSubmission, PrPilotError> {
    if already_approved && intent.changes_approval() {
        return Err(PrPilotError::ActionNotPermitted(format!(
            "pull request is already approved; only comments can be added (requested: {intent})"
        )));
    }

    let text = body.map(str::trim).filter(|b| !b.is_empty());
    let body = match (intent, text) {
        (_, Some(text)) => Some(text.to_string()),
        (ReviewIntent::Approve, None) => Some("Approved".to_string()),
        (ReviewIntent::RequestChanges, None) => Some("Changes requested".to_string()),
        (ReviewIntent::Comment, None) => None,
    };

    Ok(ReviewSubmission {
        event: intent.event(),
        body,
        comments: Vec::new(),
    })
}
