use std::sync::Arc;

use prpilot_core::{ConfigSummary, PrPilotConfig};
use prpilot_review::Automation;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub automation: Arc<Automation>,
    /// Non-secret view of the loaded configuration.
    pub config: Arc<ConfigSummary>,
}

impl AppState {
    pub fn new(automation: Automation, config: ConfigSummary) -> Self {
        Self {
            automation: Arc::new(automation),
            config: Arc::new(config),
        }
    }

    /// Wire the real collaborators from `config`.
    ///
    /// # Errors
    ///
    /// See [`Automation::from_config`].
    pub fn from_config(config: &PrPilotConfig) -> prpilot_core::Result<Self> {
        Ok(Self::new(Automation::from_config(config)?, config.summary()))
    }
}
