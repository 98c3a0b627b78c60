use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// Machine-readable error codes carried in [`ApiError::code`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ServiceUnavailable,
    NotFound,
}

impl From<ErrorCode> for StatusCode {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

/// Standard API response wrapper
///
/// Provides a consistent response format for all endpoints.
///
/// # Example
/// ```
/// use keelson::common::{ApiResponse, ErrorCode};
///
/// let ok = ApiResponse::success("pong");
/// assert!(ok.success);
///
/// let failed: ApiResponse<()> = ApiResponse::error(ErrorCode::ServiceUnavailable, "broker down");
/// assert_eq!(failed.error.unwrap().code, "SERVICE_UNAVAILABLE");
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    pub success: bool,

    #[serde(skip)]
    pub http_status: StatusCode,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful response with data
    ///
    /// Defaults to HTTP 200 OK.
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            success: true,
            http_status: StatusCode::OK,
        }
    }

    /// Create an error response whose HTTP status follows `code`
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.into(),
            }),
            success: false,
            http_status: code.into(),
        }
    }

    /// Keep the payload but report `code` as the outcome
    ///
    /// Used when the body is still meaningful on failure, such as a health
    /// report listing which check failed.
    pub fn with_error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
        self.error = Some(ApiError {
            code: code.to_string(),
            message: message.into(),
        });
        self.success = false;
        self.http_status = code.into();
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.http_status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_maps_status() {
        let response: ApiResponse<()> = ApiResponse::error(ErrorCode::NotFound, "no such route");
        assert_eq!(response.http_status, StatusCode::NOT_FOUND);
        assert!(!response.success);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert!(json.get("data").is_none());
        assert!(json.get("http_status").is_none());
    }

    #[test]
    fn test_with_error_keeps_payload() {
        let response = ApiResponse::success(vec![1, 2])
            .with_error(ErrorCode::ServiceUnavailable, "1 check failing");
        assert!(!response.success);
        assert_eq!(response.http_status, StatusCode::SERVICE_UNAVAILABLE);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
        assert_eq!(json["success"], false);
    }
}
