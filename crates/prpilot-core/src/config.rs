use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PrPilotError;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".prpilot.toml";

/// Top-level configuration loaded from `.prpilot.toml`.
///
/// Resolution order: CLI flags > env vars > config file > defaults. Every
/// collaborator receives the section it needs at construction time.
///
/// # Examples
///
/// ```
/// use prpilot_core::PrPilotConfig;
///
/// let config = PrPilotConfig::default();
/// assert_eq!(config.github.base_branch, "main");
/// assert_eq!(config.sheets.worksheet_name, "PR Tracking");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrPilotConfig {
    /// Source-control settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// AI review settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Tracking sheet settings.
    #[serde(default)]
    pub sheets: SheetsConfig,
    /// Local AI review history.
    #[serde(default)]
    pub store: StoreConfig,
    /// HTTP API settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Scheduled workflow settings.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl PrPilotConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Io`] if the file cannot be read, or
    /// [`PrPilotError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, PrPilotError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use prpilot_core::PrPilotConfig;
    ///
    /// let toml = r#"
    /// [github]
    /// repository = "octocat/hello-world"
    /// auto_merge = true
    /// "#;
    /// let config = PrPilotConfig::from_toml(toml).unwrap();
    /// assert!(config.github.auto_merge);
    /// assert_eq!(config.github.base_branch, "main");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, PrPilotError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load the explicit file, or `.prpilot.toml` when present, then overlay
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Propagates file, TOML, and environment value errors.
    pub fn load(explicit: Option<&Path>) -> Result<Self, PrPilotError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay values from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Validation`] if a numeric variable does not parse.
    pub fn apply_env(&mut self) -> Result<(), PrPilotError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values supplied by `lookup`, which maps a variable name to its value.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Validation`] if a numeric variable does not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use prpilot_core::PrPilotConfig;
    ///
    /// let mut config = PrPilotConfig::default();
    /// config
    ///     .apply_env_with(|key| match key {
    ///         "GITHUB_REPO" => Some("https://github.com/octocat/hello-world".into()),
    ///         "GROQ_MAX_TOKENS" => Some("1024".into()),
    ///         _ => None,
    ///     })
    ///     .unwrap();
    /// assert_eq!(config.llm.max_tokens, 1024);
    /// assert_eq!(config.github.repo().unwrap().to_string(), "octocat/hello-world");
    /// ```
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), PrPilotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GITHUB_TOKEN") {
            self.github.token = Some(v);
        }
        if let Some(v) = get("GITHUB_REPO") {
            self.github.repository = Some(v);
        }
        if let Some(v) = get("GITHUB_BASE_BRANCH") {
            self.github.base_branch = v;
        }
        if let Some(v) = get("GITHUB_AUTO_MERGE") {
            self.github.auto_merge = parse_flag(&v);
        }
        if let Some(v) = get("GITHUB_REQUIRE_REVIEWS") {
            self.github.require_reviews = parse_flag(&v);
        }
        if let Some(v) = get("GITHUB_API_URL") {
            self.github.api_url = v;
        }

        if let Some(v) = get("GROQ_API_KEY").or_else(|| get("LLM_API_KEY")) {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("GROQ_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("GROQ_MAX_TOKENS") {
            self.llm.max_tokens = parse_number("GROQ_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("GROQ_TEMPERATURE") {
            self.llm.temperature = parse_number("GROQ_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("LLM_BASE_URL") {
            self.llm.base_url = v;
        }

        if let Some(v) = get("GOOGLE_SHEETS_ACCESS_TOKEN") {
            self.sheets.access_token = Some(v);
        }
        if let Some(v) = get("GOOGLE_SHEETS_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_SHEETS_WORKSHEET_NAME") {
            self.sheets.worksheet_name = v;
        }
        if let Some(v) = get("GOOGLE_SHEETS_AUTO_SYNC") {
            self.sheets.auto_sync = parse_flag(&v);
        }
        if let Some(v) = get("GOOGLE_SHEETS_SYNC_INTERVAL") {
            self.sheets.sync_interval_secs = parse_number("GOOGLE_SHEETS_SYNC_INTERVAL", &v)?;
        }

        if let Some(v) = get("PRPILOT_DB_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = get("PRPILOT_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PRPILOT_PORT") {
            self.server.port = parse_number("PRPILOT_PORT", &v)?;
        }
        Ok(())
    }

    /// List every problem that would stop a full workflow from running.
    ///
    /// The tracking sheet is optional, so a sheet without a spreadsheet id is
    /// not reported; a spreadsheet id without a token is.
    ///
    /// # Examples
    ///
    /// ```
    /// use prpilot_core::PrPilotConfig;
    ///
    /// let problems = PrPilotConfig::default().validate();
    /// assert!(problems.iter().any(|p| p.contains("GITHUB_TOKEN")));
    /// ```
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.github.token.is_none() {
            problems.push("GITHUB_TOKEN is required".to_string());
        }
        match &self.github.repository {
            None => problems.push("GITHUB_REPO is required".to_string()),
            Some(repo) => {
                if let Err(e) = repo.parse::<RepoRef>() {
                    problems.push(e.to_string());
                }
            }
        }
        if self.llm.api_key.is_none() {
            problems.push("GROQ_API_KEY is required".to_string());
        }
        if self.sheets.spreadsheet_id.is_some() && self.sheets.access_token.is_none() {
            problems.push(
                "GOOGLE_SHEETS_ACCESS_TOKEN is required when a spreadsheet is configured"
                    .to_string(),
            );
        }
        problems
    }

    /// Non-secret view of the configuration.
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            github: GitHubSummary {
                repository: self.github.repository.clone(),
                base_branch: self.github.base_branch.clone(),
                auto_merge: self.github.auto_merge,
                require_reviews: self.github.require_reviews,
                token_configured: self.github.token.is_some(),
            },
            llm: LlmSummary {
                model: self.llm.model.clone(),
                max_tokens: self.llm.max_tokens,
                temperature: self.llm.temperature,
                api_key_configured: self.llm.api_key.is_some(),
            },
            sheets: SheetsSummary {
                worksheet_name: self.sheets.worksheet_name.clone(),
                auto_sync: self.sheets.auto_sync,
                sync_interval_secs: self.sheets.sync_interval_secs,
                spreadsheet_configured: self.sheets.spreadsheet_id.is_some(),
                credentials_configured: self.sheets.access_token.is_some(),
            },
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, PrPilotError> {
    value
        .trim()
        .parse()
        .map_err(|_| PrPilotError::Validation(format!("{key} has invalid value '{value}'")))
}

/// Source-control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token.
    pub token: Option<String>,
    /// `owner/repo` or a `https://github.com/owner/repo` URL.
    pub repository: Option<String>,
    /// Branch pull requests target by default (default: `main`).
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Squash-merge created pull requests that request no reviewers.
    #[serde(default)]
    pub auto_merge: bool,
    /// Whether reviews are expected before merging (default: true).
    #[serde(default = "default_true")]
    pub require_reviews: bool,
    /// REST API root (default: `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

fn default_base_branch() -> String {
    "main".into()
}

fn default_true() -> bool {
    true
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            repository: None,
            base_branch: default_base_branch(),
            auto_merge: false,
            require_reviews: true,
            api_url: default_github_api_url(),
        }
    }
}

impl GitHubConfig {
    /// The configured token.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::ConfigurationMissing`] if no token is set.
    pub fn require_token(&self) -> Result<&str, PrPilotError> {
        self.token
            .as_deref()
            .ok_or_else(|| PrPilotError::ConfigurationMissing("GITHUB_TOKEN is not set".into()))
    }

    /// The configured repository.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::ConfigurationMissing`] if none is set, or
    /// [`PrPilotError::Validation`] if it is not `owner/repo`.
    pub fn repo(&self) -> Result<RepoRef, PrPilotError> {
        self.repository
            .as_deref()
            .ok_or_else(|| PrPilotError::ConfigurationMissing("GITHUB_REPO is not set".into()))?
            .parse()
    }
}

/// A GitHub repository coordinate.
///
/// # Examples
///
/// ```
/// use prpilot_core::RepoRef;
///
/// let repo: RepoRef = "https://github.com/rust-lang/rust.git".parse().unwrap();
/// assert_eq!(repo.owner, "rust-lang");
/// assert_eq!(repo.name, "rust");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = PrPilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('/');
        let path = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .or_else(|| trimmed.strip_prefix("github.com/"))
            .unwrap_or(trimmed);
        let path = path.strip_suffix(".git").unwrap_or(path);

        let invalid = || {
            PrPilotError::Validation(format!(
                "GITHUB_REPO '{s}' must be in the form owner/repository"
            ))
        };
        let (owner, name) = path.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

/// Chat-completion provider configuration.
///
/// # Examples
///
/// ```
/// use prpilot_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "llama-3.1-8b-instant");
/// assert_eq!(config.max_tokens, 2048);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI-compatible API root, without the `/chat/completions` suffix.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "llama-3.1-8b-instant".into()
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_llm_base_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Google Sheets tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// OAuth bearer token with the spreadsheets scope.
    pub access_token: Option<String>,
    pub spreadsheet_id: Option<String>,
    #[serde(default = "default_worksheet_name")]
    pub worksheet_name: String,
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// Sheets API root (default: `https://sheets.googleapis.com`).
    #[serde(default = "default_sheets_api_url")]
    pub api_url: String,
}

fn default_worksheet_name() -> String {
    "PR Tracking".into()
}

fn default_sync_interval() -> u64 {
    300
}

fn default_sheets_api_url() -> String {
    "https://sheets.googleapis.com".into()
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            spreadsheet_id: None,
            worksheet_name: default_worksheet_name(),
            auto_sync: true,
            sync_interval_secs: default_sync_interval(),
            api_url: default_sheets_api_url(),
        }
    }
}

impl SheetsConfig {
    /// Whether a spreadsheet has been configured at all.
    pub fn is_configured(&self) -> bool {
        self.spreadsheet_id.is_some()
    }
}

/// AI review history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Persist AI reviews locally (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SQLite database file (default: `.prpilot/reviews.db`).
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".prpilot/reviews.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_store_path(),
        }
    }
}

/// HTTP API listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Scheduled workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Seconds between continuous runs (default: 3600).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Seconds to wait after a failed run (default: 60).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Post AI comments during scheduled runs (default: true).
    #[serde(default = "default_true")]
    pub auto_comment: bool,
}

fn default_interval() -> u64 {
    3600
}

fn default_retry_delay() -> u64 {
    60
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            retry_delay_secs: default_retry_delay(),
            auto_comment: true,
        }
    }
}

/// Configuration with secrets reduced to presence flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub github: GitHubSummary,
    pub llm: LlmSummary,
    pub sheets: SheetsSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubSummary {
    pub repository: Option<String>,
    pub base_branch: String,
    pub auto_merge: bool,
    pub require_reviews: bool,
    pub token_configured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSummary {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub api_key_configured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetsSummary {
    pub worksheet_name: String,
    pub auto_sync: bool,
    pub sync_interval_secs: u64,
    pub spreadsheet_configured: bool,
    pub credentials_configured: bool,
}
