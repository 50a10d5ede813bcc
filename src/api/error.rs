use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::PlanningError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Lifecycle conflict; `kind` names the guard that refused the change.
    #[error("Conflict: {message}")]
    Conflict { kind: &'static str, message: String },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::Conflict { kind, .. } => *kind,
            ApiError::ServiceUnavailable(_) => "ServiceUnavailable",
            ApiError::InternalError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let (message, details) = match &self {
            ApiError::InternalError(_) => {
                tracing::error!(error = %self, "API error occurred");
                ("An internal error occurred".to_string(), None)
            }
            ApiError::ServiceUnavailable(reason) => {
                tracing::warn!(error = %self, "Service unavailable");
                (
                    "Service temporarily unavailable".to_string(),
                    Some(reason.clone()),
                )
            }
            ApiError::Conflict { message, .. } => {
                tracing::info!(error = %self, "Request conflicts with plan state");
                (message.clone(), None)
            }
            _ => {
                tracing::debug!(error = %self, "Client error");
                (self.to_string(), None)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<PlanningError> for ApiError {
    fn from(error: PlanningError) -> Self {
        let message = error.to_string();
        match error {
            PlanningError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            PlanningError::NotFound(id) => ApiError::NotFound(format!("Plan {id}")),
            PlanningError::InvalidState { .. } => ApiError::Conflict {
                kind: "InvalidState",
                message,
            },
            PlanningError::OverlapConflict { .. } => ApiError::Conflict {
                kind: "OverlapConflict",
                message,
            },
            PlanningError::StaleData { .. } => ApiError::Conflict {
                kind: "StaleData",
                message,
            },
            PlanningError::DataUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            PlanningError::Storage(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlanState;
    use rstest::rstest;
    use uuid::Uuid;

    #[rstest]
    #[case(PlanningError::InvalidRequest("bad window".into()), StatusCode::BAD_REQUEST, "BadRequest")]
    #[case(PlanningError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND, "NotFound")]
    #[case(
        PlanningError::InvalidState { plan_id: Uuid::nil(), state: PlanState::Rejected, expected: PlanState::Proposed },
        StatusCode::CONFLICT,
        "InvalidState"
    )]
    #[case(
        PlanningError::OverlapConflict { plan_id: Uuid::nil(), conflicting_id: Uuid::nil() },
        StatusCode::CONFLICT,
        "OverlapConflict"
    )]
    #[case(
        PlanningError::StaleData { plan_id: Uuid::nil(), age_secs: 600, limit_secs: 300 },
        StatusCode::CONFLICT,
        "StaleData"
    )]
    #[case(PlanningError::DataUnavailable("grid_snapshot: timed out".into()), StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable")]
    #[case(PlanningError::Storage("disk full".into()), StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError")]
    fn test_planning_error_mapping(
        #[case] error: PlanningError,
        #[case] status: StatusCode,
        #[case] error_type: &str,
    ) {
        let api: ApiError = error.into();
        assert_eq!(api.status_code(), status);
        assert_eq!(api.error_type(), error_type);
    }

    #[test]
    fn test_error_display() {
        let error = ApiError::NotFound("Plan 123".to_string());
        assert_eq!(error.to_string(), "Resource not found: Plan 123");
    }
}
