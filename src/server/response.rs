use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::Error;

/// Standard success wrapper: `{"data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self { data }
    }
}

/// Success without a payload: `{"message": ...}`.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "message": self.message, "details": details }),
            None => json!({ "message": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Unauthorized => Self::new(StatusCode::UNAUTHORIZED, "Invalid credentials"),
            Error::Forbidden(m) => Self::new(StatusCode::FORBIDDEN, m),
            Error::NotFound(m) => Self::new(StatusCode::NOT_FOUND, m),
            Error::Conflict(m) => Self::new(StatusCode::CONFLICT, m),
            Error::BadRequest(m) => Self::bad_request(m),
            Error::Upstream(m) => {
                tracing::warn!(error = %m, "engine error");
                Self::new(StatusCode::BAD_GATEWAY, "Database engine error")
            }
            Error::Timeout(m) => {
                tracing::warn!(error = %m, "engine timeout");
                Self::new(StatusCode::GATEWAY_TIMEOUT, "Database engine timed out")
            }
            other => {
                tracing::error!(error = %other, "request failed");
                Self::internal("Internal server error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), "Invalid request body")
            .with_details(Value::String(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request("Invalid query parameters")
            .with_details(Value::String(rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::Unauthorized, StatusCode::UNAUTHORIZED),
            (Error::forbidden("x"), StatusCode::FORBIDDEN),
            (Error::not_found("x"), StatusCode::NOT_FOUND),
            (Error::conflict("x"), StatusCode::CONFLICT),
            (Error::bad_request("x"), StatusCode::BAD_REQUEST),
            (Error::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (Error::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn test_engine_detail_not_exposed() {
        let err = ApiError::from(Error::Upstream(
            "login failed for tenant_x at 10.0.0.4:1433".into(),
        ));
        assert!(!err.message.contains("10.0.0.4"));

        let err = ApiError::from(Error::Internal("disk path /srv/data".into()));
        assert_eq!(err.message, "Internal server error");
    }
}
