use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use prpilot_core::PrPilotError;

/// Carries an explicit 404 for resources that live outside the remote
/// services, such as stored reviews.
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 404 Not Found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }
}

fn status_for(err: &PrPilotError) -> StatusCode {
    match err {
        PrPilotError::Validation(_) => StatusCode::BAD_REQUEST,
        PrPilotError::ActionNotPermitted(_) => StatusCode::CONFLICT,
        PrPilotError::ConfigurationMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
        PrPilotError::RemoteCollaborator {
            status: Some(404), ..
        } => StatusCode::NOT_FOUND,
        PrPilotError::RemoteCollaborator { .. } => StatusCode::BAD_GATEWAY,
        PrPilotError::Io(_)
        | PrPilotError::Serialization(_)
        | PrPilotError::Toml(_)
        | PrPilotError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(n) = self.0.downcast_ref::<NotFoundError>() {
            let body = serde_json::json!({ "error": n.0.clone() });
            return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
        }

        let (status, hint) = match self.0.downcast_ref::<PrPilotError>() {
            Some(e) => (status_for(e), e.hint().map(str::to_string)),
            None => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }

        let body = match hint {
            Some(hint) => serde_json::json!({ "error": self.0.to_string(), "hint": hint }),
            None => serde_json::json!({ "error": self.0.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prpilot_core::Service;

    #[test]
    fn validation_maps_to_400() {
        let err = AppError(PrPilotError::Validation("bad branch".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn action_not_permitted_maps_to_409() {
        let err = AppError(PrPilotError::ActionNotPermitted("already approved".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn configuration_missing_maps_to_503() {
        let err = AppError(PrPilotError::ConfigurationMissing("GITHUB_TOKEN".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn upstream_404_maps_to_404() {
        let err = AppError(PrPilotError::remote(Service::GitHub, Some(404), "Not Found").into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn other_upstream_failures_map_to_502() {
        let err = AppError(PrPilotError::remote(Service::Llm, Some(500), "boom").into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);

        let err = AppError(PrPilotError::remote(Service::Sheets, None, "timeout").into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn database_error_maps_to_500() {
        let err = AppError(PrPilotError::Database("locked".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn non_prpilot_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_constructor_maps_to_404() {
        let err = AppError::not_found("no stored review for PR #3");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn response_body_is_json() {
        let err = AppError(PrPilotError::Validation("bad".into()).into());
        let response = err.into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
