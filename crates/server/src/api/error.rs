//! HTTP error responses.

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use bracketeer_core::orchestrator::UploadError;
use bracketeer_core::{AuthError, OrchestratorError, ProviderError};

/// Error body: `{error, message?, errors?}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<UploadError>>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.to_string(),
                message: Some(message.into()),
                errors: None,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        let message = e.to_string();
        match e {
            OrchestratorError::Validation(_) => Self::bad_request(message),
            OrchestratorError::NotFound(_) => Self::not_found(message),
            OrchestratorError::InvalidState(_) => {
                Self::new(StatusCode::CONFLICT, "invalid_state", message)
            }
            OrchestratorError::Provider(ProviderError::Api { status, body }) => {
                error!(status, body = %body, "Provider rejected request");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "provider_error",
                    format!("provider returned HTTP {}: {}", status, body),
                )
            }
            OrchestratorError::Provider(_) => {
                error!(error = %message, "Provider call failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "provider_error", message)
            }
            OrchestratorError::Storage(_) => {
                error!(error = %message, "Object store call failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message)
            }
            OrchestratorError::Store(_) => {
                error!(error = %message, "Database call failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "database_error", message)
            }
            OrchestratorError::UploadFailed(errors) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: ErrorBody {
                    error: "upload_failed".to_string(),
                    message: Some(message),
                    errors: Some(errors),
                },
            },
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::NotAuthenticated => Self::unauthorized("authentication required"),
            AuthError::InvalidCredentials(reason) => Self::unauthorized(reason),
            AuthError::ConfigurationError(reason) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "auth_configuration_error",
                reason,
            ),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::bad_request(format!("invalid multipart body: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bracketeer_core::orchestrator::UploadStage;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (OrchestratorError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (OrchestratorError::NotFound("order".into()), StatusCode::NOT_FOUND),
            (OrchestratorError::InvalidState("x".into()), StatusCode::CONFLICT),
            (
                OrchestratorError::Provider(ProviderError::Timeout),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn test_provider_api_error_carries_status_and_body() {
        let api = ApiError::from(OrchestratorError::Provider(ProviderError::Api {
            status: 422,
            body: "bad brackets".to_string(),
        }));
        assert_eq!(api.body.error, "provider_error");
        let message = api.body.message.unwrap();
        assert!(message.contains("422"));
        assert!(message.contains("bad brackets"));
    }

    #[test]
    fn test_upload_failed_lists_errors() {
        let api = ApiError::from(OrchestratorError::UploadFailed(vec![UploadError {
            filename: "1.jpg".to_string(),
            stage: UploadStage::Upload,
            message: "HTTP 500".to_string(),
        }]));
        let json = serde_json::to_value(&api.body).unwrap();
        assert_eq!(json["error"], "upload_failed");
        assert_eq!(json["errors"][0]["stage"], "upload");
    }
}
