use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Remote system a [`PrPilotError::RemoteCollaborator`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// GitHub REST API.
    GitHub,
    /// Chat-completion endpoint used for AI review.
    Llm,
    /// Google Sheets values API.
    Sheets,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::GitHub => write!(f, "GitHub"),
            Service::Llm => write!(f, "LLM"),
            Service::Sheets => write!(f, "Google Sheets"),
        }
    }
}

impl FromStr for Service {
    type Err = PrPilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(Service::GitHub),
            "llm" | "groq" | "ai" => Ok(Service::Llm),
            "sheets" | "google-sheets" => Ok(Service::Sheets),
            other => Err(PrPilotError::Validation(format!("unknown service: {other}"))),
        }
    }
}

/// Errors that can occur across prpilot.
///
/// Library crates return this type directly; the binary renders it through
/// miette, so the `help` hint on remote failures reaches the terminal.
///
/// # Examples
///
/// ```
/// use prpilot_core::PrPilotError;
///
/// let err = PrPilotError::ConfigurationMissing("GITHUB_TOKEN".into());
/// assert!(err.to_string().contains("GITHUB_TOKEN"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PrPilotError {
    /// A required credential or setting is absent.
    #[error("configuration missing: {0}")]
    #[diagnostic(help("set it in .prpilot.toml or the environment, see `prpilot setup`"))]
    ConfigurationMissing(String),

    /// A remote service answered with a non-2xx status or could not be reached.
    #[error("{service} error{}: {message}", status_suffix(.status))]
    RemoteCollaborator {
        /// Which service failed.
        service: Service,
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Upstream message, verbatim.
        message: String,
        /// Extra guidance for well-known failures.
        #[help]
        hint: Option<String>,
    },

    /// The review action is not allowed given the PR's current approval state.
    #[error("action not permitted: {0}")]
    ActionNotPermitted(String),

    /// Malformed user input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Review store failure.
    #[error("database error: {0}")]
    Database(String),
}

impl PrPilotError {
    /// Build a remote error, attaching a hint for failures users commonly hit.
    ///
    /// # Examples
    ///
    /// ```
    /// use prpilot_core::{PrPilotError, Service};
    ///
    /// let err = PrPilotError::remote(Service::GitHub, Some(403), "Resource not accessible");
    /// assert_eq!(err.status(), Some(403));
    /// assert!(err.hint().unwrap().contains("token"));
    /// ```
    pub fn remote(service: Service, status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let hint = remote_hint(service, status, &message);
        PrPilotError::RemoteCollaborator {
            service,
            status,
            message,
            hint,
        }
    }

    /// HTTP status of a remote failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            PrPilotError::RemoteCollaborator { status, .. } => *status,
            _ => None,
        }
    }

    /// Guidance attached to a remote failure.
    pub fn hint(&self) -> Option<&str> {
        match self {
            PrPilotError::RemoteCollaborator { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" {s}")).unwrap_or_default()
}

fn remote_hint(service: Service, status: Option<u16>, message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    if lower.contains("approve your own pull request") {
        return Some(
            "GitHub does not let the author of a pull request approve it. \
             Ask another collaborator to approve, or submit a comment instead."
                .into(),
        );
    }
    match status {
        Some(403) => Some(format!(
            "the {service} credential was rejected; check token scope and repository access"
        )),
        Some(401) => Some(format!("the {service} credential is invalid or expired")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PrPilotError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn service_parses_aliases() {
        assert_eq!("GitHub".parse::<Service>().unwrap(), Service::GitHub);
        assert_eq!("groq".parse::<Service>().unwrap(), Service::Llm);
        assert_eq!("sheets".parse::<Service>().unwrap(), Service::Sheets);
        assert!(matches!(
            "jira".parse::<Service>(),
            Err(PrPilotError::Validation(_))
        ));
    }

    #[test]
    fn remote_error_displays_service_and_status() {
        let err = PrPilotError::remote(Service::GitHub, Some(422), "Validation Failed");
        assert_eq!(err.to_string(), "GitHub error 422: Validation Failed");
    }

    #[test]
    fn remote_error_without_status() {
        let err = PrPilotError::remote(Service::Llm, None, "connection refused");
        assert_eq!(err.to_string(), "LLM error: connection refused");
        assert!(err.hint().is_none());
    }

    #[test]
    fn forbidden_gets_token_scope_hint() {
        let err = PrPilotError::remote(Service::GitHub, Some(403), "Forbidden");
        assert!(err.hint().unwrap().contains("check token scope"));
    }

    #[test]
    fn self_approval_gets_explanation() {
        let err = PrPilotError::remote(
            Service::GitHub,
            Some(422),
            "Unprocessable Entity: Can not approve your own pull request",
        );
        let hint = err.hint().unwrap();
        assert!(hint.contains("author"));
        assert!(err.to_string().contains("Can not approve your own pull request"));
    }

    #[test]
    fn action_not_permitted_displays_reason() {
        let err = PrPilotError::ActionNotPermitted("already approved".into());
        assert_eq!(err.to_string(), "action not permitted: already approved");
    }
}
