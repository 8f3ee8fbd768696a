use async_trait::async_trait;
use prpilot_core::{
    AiReview, BranchInfo, LlmConfig, PrContent, PrFile, PrPilotError, PullRequest, Service,
};
use serde::{Deserialize, Serialize};

use crate::collaborators::AiReviewer;
use crate::prompt;
use crate::rest::RestClient;

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use prpilot_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Review this code");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use prpilot_review::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// OpenAI-compatible chat completions reviewer.
///
/// Defaults to Groq, but works with any provider exposing
/// `{base_url}/chat/completions`.
///
/// # Examples
///
/// ```
/// use prpilot_core::LlmConfig;
/// use prpilot_review::llm::LlmReviewer;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let reviewer = LlmReviewer::new(&config).unwrap();
/// assert_eq!(reviewer.model_name(), "llama-3.1-8b-instant");
/// ```
pub struct LlmReviewer {
    rest: RestClient,
    config: LlmConfig,
}

impl LlmReviewer {
    /// Create a reviewer from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::ConfigurationMissing`] without an API key, and
    /// [`PrPilotError::Validation`] for an unusable base URL.
    pub fn new(config: &LlmConfig) -> Result<Self, PrPilotError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PrPilotError::ConfigurationMissing("GROQ_API_KEY is not set".into()))?;
        let rest = RestClient::new(Service::Llm, &config.base_url, 120)?.with_bearer(api_key)?;
        Ok(Self {
            rest,
            config: config.clone(),
        })
    }

    /// Return the model name from the configuration.
    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    /// Send a chat completion request and return the text response.
    ///
    /// Requests a JSON object response using the configured token limit and
    /// temperature.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::RemoteCollaborator`] on HTTP errors or when
    /// the response carries no message content.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, PrPilotError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response: serde_json::Value =
            self.rest.post(&["chat", "completions"], &[], &request).await?;

        let content = response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                PrPilotError::remote(
                    Service::Llm,
                    None,
                    format!("unexpected response structure: {response}"),
                )
            })?;

        if let Some(usage) = response.get("usage") {
            tracing::debug!(model = %self.config.model, %usage, "chat completion finished");
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl AiReviewer for LlmReviewer {
    fn model(&self) -> &str {
        self.model_name()
    }

    async fn review_pull_request(
        &self,
        pr: &PullRequest,
        files: &[PrFile],
    ) -> Result<AiReview, PrPilotError> {
        let messages = vec![
            ChatMessage::system(prompt::build_review_system_prompt()),
            ChatMessage::user(prompt::build_review_prompt(pr, files)),
        ];
        let text = self.chat(messages).await?;
        Ok(prompt::parse_review_response(&text, pr))
    }

    async fn generate_pr_content(
        &self,
        info: &BranchInfo,
        custom_prompt: Option<&str>,
    ) -> Result<PrContent, PrPilotError> {
        let messages = vec![
            ChatMessage::system(prompt::build_content_system_prompt()),
            ChatMessage::user(prompt::build_content_prompt(info, custom_prompt)),
        ];
        let text = self.chat(messages).await?;
        Ok(prompt::parse_content_response(&text, &info.branch))
    }
}
