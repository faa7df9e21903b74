use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Success envelope: `{status: "success", message?, data?, ...extra}`
#[derive(Debug)]
pub struct ApiResponse {
    pub body: Map<String, Value>,
    pub status_code: StatusCode,
}

impl ApiResponse {
    fn envelope() -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("status".into(), json!("success"));
        body
    }

    /// Create a successful API response with default 200 status
    pub fn success<T: Serialize>(data: T) -> Self {
        let mut body = Self::envelope();
        body.insert("data".into(), to_value(data));
        Self { body, status_code: StatusCode::OK }
    }

    /// Create a 201 Created response
    pub fn created<T: Serialize>(data: T) -> Self {
        Self::success(data).with_status(StatusCode::CREATED)
    }

    /// Message-only response
    pub fn message(message: impl Into<String>) -> Self {
        let mut body = Self::envelope();
        body.insert("message".into(), Value::String(message.into()));
        Self { body, status_code: StatusCode::OK }
    }

    /// Prebuilt body, e.g. a listing envelope
    pub fn raw(body: Map<String, Value>) -> Self {
        Self { body, status_code: StatusCode::OK }
    }

    pub fn with_status(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.body.insert("message".into(), Value::String(message.into()));
        self
    }

    /// Extra top-level key next to `data`
    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.body.insert(key.to_string(), to_value(value));
        self
    }
}

fn to_value<T: Serialize>(data: T) -> Value {
    serde_json::to_value(data).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize response data: {}", e);
        Value::Null
    })
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(Value::Object(self.body))).into_response()
    }
}

pub type ApiResult = Result<ApiResponse, crate::error::ApiError>;
