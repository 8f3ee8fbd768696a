//! Remote collaborators and workflow orchestration for prpilot.
//!
//! Provides the GitHub, LLM, and Google Sheets clients behind the traits in
//! [`collaborators`], the local review history [`store`], and the
//! [`automation::Automation`] orchestrator used by the CLI and the server.

pub mod automation;
pub mod collaborators;
pub mod github;
pub mod llm;
pub mod prompt;
pub mod rest;
pub mod sheets;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use automation::{Automation, AutomationSettings, CreatePrRequest, SheetAction};
pub use collaborators::{AiReviewer, PrFilter, SourceControl, TrackingSheet};
pub use github::GitHubClient;
pub use llm::LlmReviewer;
pub use sheets::SheetsClient;
pub use store::ReviewStore;
