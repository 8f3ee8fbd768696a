//! Core types, configuration, and approval logic for prpilot.
//!
//! This crate is the shared foundation of the other prpilot crates:
//! - [`PrPilotError`]: the error type, with miette diagnostics
//! - [`PrPilotConfig`]: configuration loaded from `.prpilot.toml` and the environment
//! - [`is_approved`] and [`build_submission`]: approval reconciliation and review gating
//! - Shared types mirroring the remote services: [`PullRequest`], [`Review`], [`AiReview`], ...

mod approval;
mod config;
mod error;
mod types;

pub use approval::{
    build_submission, is_approved, ApprovalSummary, ReviewEvent, ReviewIntent, ReviewLineComment,
    ReviewSubmission,
};
pub use config::{
    ConfigSummary, GitHubConfig, GitHubSummary, LlmConfig, LlmSummary, PrPilotConfig, RepoRef,
    ServerConfig, SheetsConfig, SheetsSummary, StoreConfig, WorkflowConfig, CONFIG_FILE_NAME,
};
pub use error::{PrPilotError, Service};
pub use types::{
    AiComment, AiReview, Branch, BranchInfo, Collaborator, CommitSummary, Label, NewPullRequest,
    OutputFormat, PrContent, PrFile, PrState, PullRequest, Review, ReviewState, SheetRow,
};

/// A convenience `Result` type for prpilot operations.
pub type Result<T> = std::result::Result<T, PrPilotError>;
