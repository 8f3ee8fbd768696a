//! Typed JSON-over-HTTP helper shared by every remote collaborator.
//!
//! Each client wraps a [`RestClient`] and exposes thin typed methods per
//! endpoint. Status checking and upstream error-message extraction live here
//! and nowhere else.

use std::time::Duration;

use prpilot_core::{PrPilotError, Service};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, LINK};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Upper bound on pages fetched by [`RestClient::get_paged`].
pub const MAX_PAGES: usize = 50;

/// A JSON REST client bound to one service and base URL.
///
/// # Examples
///
/// ```
/// use prpilot_core::Service;
/// use prpilot_review::rest::RestClient;
///
/// let client = RestClient::new(Service::GitHub, "https://api.github.com", 30).unwrap();
/// let url = client.endpoint(&["repos", "octocat", "hello", "pulls"]).unwrap();
/// assert_eq!(url.as_str(), "https://api.github.com/repos/octocat/hello/pulls");
/// ```
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    service: Service,
    headers: HeaderMap,
}

impl RestClient {
    /// Create a client for `service` rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Validation`] if `base_url` is not an absolute
    /// URL, or [`PrPilotError::RemoteCollaborator`] if the HTTP client cannot
    /// be built.
    pub fn new(service: Service, base_url: &str, timeout_secs: u64) -> Result<Self, PrPilotError> {
        let base = Url::parse(base_url)
            .map_err(|e| PrPilotError::Validation(format!("invalid {service} URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(PrPilotError::Validation(format!(
                "invalid {service} URL '{base_url}'"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("prpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                PrPilotError::remote(service, None, format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self {
            http,
            base,
            service,
            headers: HeaderMap::new(),
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Validation`] if the token contains characters
    /// not allowed in a header.
    pub fn with_bearer(self, token: &str) -> Result<Self, PrPilotError> {
        let value = format!("Bearer {token}");
        self.with_header(AUTHORIZATION, &value)
    }

    /// Send an extra header with every request.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Validation`] if `value` is not a valid header value.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self, PrPilotError> {
        let mut value = HeaderValue::from_str(value).map_err(|_| {
            PrPilotError::Validation(format!("invalid characters in {} header", name.as_str()))
        })?;
        if name == AUTHORIZATION {
            value.set_sensitive(true);
        }
        self.headers.insert(name, value);
        Ok(self)
    }

    /// The service errors from this client are attributed to.
    pub fn service(&self) -> Service {
        self.service
    }

    /// Append percent-encoded path segments to the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::Validation`] if the base URL cannot take a path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, PrPilotError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PrPilotError::Validation(format!("invalid {} URL", self.service)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `GET` a JSON resource.
    ///
    /// # Errors
    ///
    /// Returns [`PrPilotError::RemoteCollaborator`] on transport failures,
    /// non-2xx statuses, and bodies that do not decode as `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, PrPilotError> {
        self.send(Method::GET, path, query, None).await
    }

    /// `GET` a JSON array, following `Link: <...>; rel="next"` headers and
    /// concatenating the pages. Stops after [`MAX_PAGES`] pages.
    ///
    /// Next links pointing at a different origin than the base URL are not
    /// followed, so credentials never leave the configured host.
    ///
    /// # Errors
    ///
    /// See [`RestClient::get`]. A failure on any page fails the whole listing.
    pub async fn get_paged<T: DeserializeOwned>(
        &self,
        path: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, PrPilotError> {
        let mut url = self.endpoint(path)?;
        let mut query = query;
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let reply = self.execute(Method::GET, url, query, None).await?;
            let batch: Vec<T> = self.decode(reply.status, &reply.text)?;
            items.extend(batch);
            match reply.next {
                Some(next) if next.origin() == self.base.origin() => {
                    // The next link already carries the query string.
                    url = next;
                    query = &[];
                }
                Some(next) => {
                    tracing::warn!(service = %self.service, %next, "ignoring cross-origin next page");
                    return Ok(items);
                }
                None => {
                    tracing::debug!(service = %self.service, pages = page, count = items.len(), "fetched all pages");
                    return Ok(items);
                }
            }
        }
        tracing::warn!(service = %self.service, pages = MAX_PAGES, "stopped following pagination");
        Ok(items)
    }

    /// `POST` a JSON body.
    ///
    /// # Errors
    ///
    /// See [`RestClient::get`].
    pub async fn post<B, T>(
        &self,
        path: &[&str],
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, PrPilotError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, query, Some(body)).await
    }

    /// `PUT` a JSON body.
    ///
    /// # Errors
    ///
    /// See [`RestClient::get`].
    pub async fn put<B, T>(
        &self,
        path: &[&str],
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, PrPilotError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, path, query, Some(body)).await
    }

    /// `DELETE` a resource.
    ///
    /// # Errors
    ///
    /// See [`RestClient::get`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T, PrPilotError> {
        self.send(Method::DELETE, path, &[], None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &[&str],
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<T, PrPilotError> {
        let url = self.endpoint(path)?;
        let reply = self.execute(method, url, query, body.as_ref()).await?;
        self.decode(reply.status, &reply.text)
    }

    /// Send one request and return the body of a 2xx response.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Reply, PrPilotError> {
        tracing::debug!(service = %self.service, %method, %url, "sending request");

        let mut request = self
            .http
            .request(method, url)
            .headers(self.headers.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            PrPilotError::remote(
                self.service,
                e.status().map(|s| s.as_u16()),
                format!("request failed: {e}"),
            )
        })?;

        let status = response.status().as_u16();
        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);
        let text = response.text().await.map_err(|e| {
            PrPilotError::remote(
                self.service,
                Some(status),
                format!("failed to read response: {e}"),
            )
        })?;

        if !(200..300).contains(&status) {
            tracing::debug!(service = %self.service, status, "request rejected");
            let message = error_message(&text).unwrap_or_else(|| {
                reqwest::StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("request failed")
                    .to_string()
            });
            return Err(PrPilotError::remote(self.service, Some(status), message));
        }

        Ok(Reply { status, next, text })
    }

    fn decode<T: DeserializeOwned>(&self, status: u16, text: &str) -> Result<T, PrPilotError> {
        let payload = if text.trim().is_empty() { "null" } else { text };
        serde_json::from_str(payload).map_err(|e| {
            PrPilotError::remote(
                self.service,
                Some(status),
                format!("unexpected response body: {e}"),
            )
        })
    }
}

struct Reply {
    status: u16,
    next: Option<Url>,
    text: String,
}

/// The `rel="next"` target of an RFC 8288 `Link` header, if any.
fn next_link(header: &str) -> Option<Url> {
    header.split(',').find_map(|part| {
        let (target, params) = part.trim().split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| matches!(p.trim(), "rel=\"next\"" | "rel=next"));
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

/// Pull a human-readable message out of an error body.
///
/// Understands GitHub (`message` plus `errors`), Google and OpenAI style
/// (`error.message`), and bare `error` strings. Non-JSON bodies are returned
/// trimmed.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(trimmed.to_string());
    };

    let mut message = json
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
        })
        .or_else(|| json.get("error").and_then(|e| e.as_str()))
        .map(str::to_string);

    let details: Vec<String> = json
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| {
                    e.as_str()
                        .or_else(|| e.get("message").and_then(|m| m.as_str()))
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();

    if !details.is_empty() {
        let joined = details.join("; ");
        message = Some(match message {
            Some(m) => format!("{m}: {joined}"),
            None => joined,
        });
    }

    message.or_else(|| Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let client = RestClient::new(Service::Llm, "https://api.groq.com/openai/v1", 5).unwrap();
        let url = client.endpoint(&["chat", "completions"]).unwrap();
        assert_eq!(url.as_str(), "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn endpoint_encodes_segments() {
        let client = RestClient::new(Service::GitHub, "https://api.github.com/", 5).unwrap();
        let url = client.endpoint(&["repos", "o", "r", "branches", "feature/x y"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/o/r/branches/feature%2Fx%20y"
        );
    }

    #[test]
    fn relative_base_is_rejected() {
        let result = RestClient::new(Service::Sheets, "not a url", 5);
        assert!(matches!(result, Err(PrPilotError::Validation(_))));
    }

    #[test]
    fn github_error_message_includes_details() {
        let body = r#"{"message":"Unprocessable Entity","errors":["Can not approve your own pull request"]}"#;
        assert_eq!(
            error_message(body).unwrap(),
            "Unprocessable Entity: Can not approve your own pull request"
        );
    }

    #[test]
    fn github_object_errors_are_read() {
        let body = r#"{"message":"Validation Failed","errors":[{"resource":"PullRequest","message":"No commits between main and feat"}]}"#;
        assert_eq!(
            error_message(body).unwrap(),
            "Validation Failed: No commits between main and feat"
        );
    }

    #[test]
    fn google_style_error_is_read() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#;
        assert_eq!(error_message(body).unwrap(), "Requested entity was not found.");
    }

    #[test]
    fn plain_text_error_is_kept() {
        assert_eq!(error_message("  bad gateway \n").unwrap(), "bad gateway");
        assert!(error_message("").is_none());
    }

    #[test]
    fn next_link_is_found_among_relations() {
        let header = r#"<https://api.github.com/repositories/1/pulls?page=1>; rel="prev", <https://api.github.com/repositories/1/pulls?page=3>; rel="next", <https://api.github.com/repositories/1/pulls?page=5>; rel="last""#;
        assert_eq!(
            next_link(header).unwrap().as_str(),
            "https://api.github.com/repositories/1/pulls?page=3"
        );
    }

    #[test]
    fn last_page_has_no_next_link() {
        let header = r#"<https://api.github.com/x?page=1>; rel="first", <https://api.github.com/x?page=4>; rel="prev""#;
        assert!(next_link(header).is_none());
        assert!(next_link("").is_none());
    }

    #[test]
    fn bearer_header_is_set() {
        let client = RestClient::new(Service::GitHub, "https://api.github.com", 5)
            .unwrap()
            .with_bearer("abc")
            .unwrap();
        assert_eq!(client.headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
    }
}
