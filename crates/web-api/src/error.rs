use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    /// 原样重试可能成功时为 true
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
                retryable: false,
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn retryable(mut self) -> Self {
        self.body.retryable = true;
        self
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match &error {
            ApplicationError::Validation(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", error.to_string())
            }
            ApplicationError::Permission(_) => {
                ApiError::new(StatusCode::FORBIDDEN, "PERMISSION_DENIED", error.to_string())
            }
            ApplicationError::NotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", error.to_string())
            }
            ApplicationError::Authentication => ApiError::unauthorized(error.to_string()),
            ApplicationError::TransientFailure { .. } => {
                tracing::warn!(error = %error, "请求在重试预算内未能完成");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "TEMPORARILY_UNAVAILABLE",
                    error.to_string(),
                )
                .retryable()
            }
            ApplicationError::Storage(_) => {
                tracing::error!(error = %error, "存储错误");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "internal storage error",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DomainError, RepositoryError};

    #[test]
    fn application_errors_map_to_status_codes() {
        let cases = [
            (
                ApplicationError::from(DomainError::EmptyMessageBody),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApplicationError::not_found("conversation"),
                StatusCode::NOT_FOUND,
            ),
            (ApplicationError::Authentication, StatusCode::UNAUTHORIZED),
            (
                ApplicationError::from(RepositoryError::unavailable("down")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApplicationError::from(RepositoryError::storage("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }

    #[test]
    fn only_transient_failures_are_marked_retryable() {
        let transient = ApiError::from(ApplicationError::from(RepositoryError::unavailable("down")));
        assert!(transient.body.retryable);

        let validation = ApiError::from(ApplicationError::from(DomainError::EmptyMessageBody));
        assert!(!validation.body.retryable);
        let json = serde_json::to_value(&validation.body).expect("serialize body");
        assert!(json.get("retryable").is_none());
    }
}
