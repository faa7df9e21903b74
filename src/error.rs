//! Errors returned by handlers, rendered as `{status: "error", message, code, errors?}`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::database::StoreError;
use crate::filter::FilterError;
use crate::scope::ScopeError;

/// Field name -> messages, in the shape clients already parse
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    ValidationError { message: String, field_errors: FieldErrors },
    /// A unique column already holds the submitted value
    #[error("{message}")]
    Conflict { field: String, message: String },
    #[error("{0}")]
    InternalServerError(String),
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError { .. } | ApiError::Conflict { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable `code` of the error body
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            ApiError::ValidationError { field_errors, .. } if !field_errors.is_empty() => Some(field_errors.clone()),
            ApiError::Conflict { field, message } => Some(FieldErrors::from([(field.clone(), vec![message.clone()])])),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "status": "error",
            "message": self.to_string(),
            "code": self.error_code(),
        });
        if let Some(errors) = self.field_errors() {
            body["errors"] = json!(errors);
        }
        body
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    /// The message every permission gate returns
    pub fn permission_denied() -> Self {
        ApiError::Forbidden("Permission Denied.".to_string())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: FieldErrors) -> Self {
        ApiError::ValidationError { message: message.into(), field_errors }
    }

    /// Single-field validation failure
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let field_errors = FieldErrors::from([(field.into(), vec![message.clone()])]);
        ApiError::ValidationError { message, field_errors }
    }

    pub fn conflict(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Conflict { field: field.into(), message: message.into() }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::InvalidValue { field, message } => ApiError::invalid_field(field, message),
            other => {
                tracing::error!("Filter compilation error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Filter(e) => e.into(),
            StoreError::ConfigMissing(_) | StoreError::InvalidDatabaseUrl => {
                tracing::error!("Database misconfigured: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            StoreError::Sqlx(sqlx::Error::PoolTimedOut) | StoreError::Sqlx(sqlx::Error::PoolClosed) => {
                tracing::error!("Database pool unavailable: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            StoreError::Query(msg) => {
                tracing::error!("query failed: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            StoreError::Sqlx(sqlx_err) => {
                tracing::error!("database error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<ScopeError> for ApiError {
    fn from(err: ScopeError) -> Self {
        tracing::error!("Permission check failed: {}", err);
        ApiError::service_unavailable("Permission service temporarily unavailable")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_reported_as_field_error() {
        let err = ApiError::conflict("organization_email", "The organization email has already been taken.");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = err.to_json();
        assert_eq!(body["status"], "error");
        assert_eq!(
            body["errors"]["organization_email"][0],
            "The organization email has already been taken."
        );
    }

    #[test]
    fn bad_filter_values_are_validation_errors() {
        let err: ApiError = FilterError::InvalidValue {
            field: "created_at_from".into(),
            message: "'soon' is not a valid date".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err: ApiError = StoreError::Query("relation \"deals\" does not exist".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("relation"));
    }
}
