//! # Error Handling
//!
//! Domain error taxonomy of the bridge and its problem+json rendering with
//! trace id propagation.

use std::fmt;

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::connectors::{ErpError, VendorError};
use crate::telemetry;

/// Seconds clients are asked to wait after a 503.
pub const SERVICE_UNAVAILABLE_RETRY_AFTER_SECS: u64 = 30;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Trace id of the current request, or a generated correlation id outside one
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Bad Request")]
    BadRequest,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not Found")]
    NotFound,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code string for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::Unauthorized => "UNAUTHORIZED",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Operation and target an error refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationContext {
    pub operation: &'static str,
    /// GUID, ERP reference or cluster id the operation was acting on
    pub target: String,
}

impl OperationContext {
    pub fn new(operation: &'static str, target: impl Into<String>) -> Self {
        Self {
            operation,
            target: target.into(),
        }
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target.is_empty() {
            f.write_str(self.operation)
        } else {
            write!(f, "{} [{}]", self.operation, self.target)
        }
    }
}

/// Orchestrator failure taxonomy.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("device {guid} not found")]
    NotFound { guid: String },

    #[error("{context}: service unavailable: {cause}")]
    ServiceUnavailable {
        context: OperationContext,
        cause: String,
    },

    #[error("{context}: vendor request timed out")]
    UpstreamTimeout { context: OperationContext },

    #[error("{context}: vendor call failed: {source}")]
    Upstream {
        context: OperationContext,
        source: VendorError,
    },

    #[error("{context}: vendor rejected cluster write: {source}")]
    WriteConflict {
        context: OperationContext,
        source: VendorError,
    },

    #[error("{context}: ERP call failed: {source}")]
    Erp {
        context: OperationContext,
        source: ErpError,
    },

    #[error("{context}: {details}")]
    Internal {
        context: OperationContext,
        details: String,
    },
}

impl BridgeError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BridgeError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Classify a failed vendor read.
    pub fn from_vendor_read(context: OperationContext, source: VendorError) -> Self {
        if source.is_timeout() {
            BridgeError::UpstreamTimeout { context }
        } else {
            BridgeError::Upstream { context, source }
        }
    }

    /// Classify a failed vendor write.
    pub fn from_vendor_write(context: OperationContext, source: VendorError) -> Self {
        if source.is_timeout() {
            BridgeError::UpstreamTimeout { context }
        } else {
            BridgeError::WriteConflict { context, source }
        }
    }

    fn context(&self) -> Option<&OperationContext> {
        match self {
            BridgeError::Validation { .. } | BridgeError::NotFound { .. } => None,
            BridgeError::ServiceUnavailable { context, .. }
            | BridgeError::UpstreamTimeout { context }
            | BridgeError::Upstream { context, .. }
            | BridgeError::WriteConflict { context, .. }
            | BridgeError::Erp { context, .. }
            | BridgeError::Internal { context, .. } => Some(context),
        }
    }

    /// Coarse failure class surfaced to callers.
    pub fn cause_class(&self) -> &'static str {
        match self {
            BridgeError::Validation { .. } => "validation",
            BridgeError::NotFound { .. } => "not_found",
            BridgeError::ServiceUnavailable { .. } => "service_unavailable",
            BridgeError::UpstreamTimeout { .. } => "upstream_timeout",
            BridgeError::Upstream { .. } => "upstream_error",
            BridgeError::WriteConflict { .. } => "write_conflict",
            BridgeError::Erp { .. } => "erp_error",
            BridgeError::Internal { .. } => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            &error_type.to_string(),
        )
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        let mut details = json!({ "cause_class": error.cause_class() });
        if let Some(context) = error.context() {
            details["operation"] = json!(context.operation);
            details["target"] = json!(context.target);
        }

        let api_error = match &error {
            BridgeError::Validation { field, .. } => {
                details["field"] = json!(field);
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &error.to_string())
            }
            BridgeError::NotFound { guid } => {
                details["target"] = json!(guid);
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", &error.to_string())
            }
            BridgeError::ServiceUnavailable { .. } => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                &error.to_string(),
            )
            .with_retry_after(SERVICE_UNAVAILABLE_RETRY_AFTER_SECS),
            BridgeError::UpstreamTimeout { .. } => ApiError::new(
                StatusCode::GATEWAY_TIMEOUT,
                "UPSTREAM_TIMEOUT",
                &error.to_string(),
            ),
            BridgeError::Upstream { source, .. } => {
                attach_vendor_details(&mut details, source);
                ApiError::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", &error.to_string())
            }
            BridgeError::WriteConflict { source, .. } => {
                attach_vendor_details(&mut details, source);
                ApiError::new(StatusCode::BAD_GATEWAY, "WRITE_CONFLICT", &error.to_string())
            }
            BridgeError::Erp { .. } => {
                ApiError::new(StatusCode::BAD_GATEWAY, "ERP_ERROR", &error.to_string())
            }
            BridgeError::Internal { .. } => {
                tracing::error!(error = %error, "Internal bridge error");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    &error.to_string(),
                )
            }
        };

        api_error.with_details(details)
    }
}

fn attach_vendor_details(details: &mut serde_json::Value, source: &VendorError) {
    if let VendorError::Http { status, body, .. } = source {
        details["upstream_status"] = json!(status);
        details["body_snippet"] = json!(body);
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> OperationContext {
        OperationContext::new("update_device", "erp-device-123")
    }

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
    }

    #[test]
    fn test_content_type_and_retry_after_headers() {
        let error: ApiError = BridgeError::ServiceUnavailable {
            context: OperationContext::new("list_devices", ""),
            cause: "vendor unreachable".to_string(),
        }
        .into();

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        assert_eq!(response.headers().get("retry-after").unwrap(), "30");
    }

    #[test]
    fn test_bridge_error_status_mapping() {
        let cases: Vec<(BridgeError, StatusCode, &str)> = vec![
            (
                BridgeError::validation("erp_reference", "must match [A-Za-z0-9_]{3,50}"),
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
            ),
            (
                BridgeError::NotFound {
                    guid: "erp-device-1".into(),
                },
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                BridgeError::UpstreamTimeout { context: context() },
                StatusCode::GATEWAY_TIMEOUT,
                "UPSTREAM_TIMEOUT",
            ),
            (
                BridgeError::Upstream {
                    context: context(),
                    source: VendorError::Unauthorized { status: 401 },
                },
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
            ),
            (
                BridgeError::WriteConflict {
                    context: context(),
                    source: VendorError::Http {
                        status: 500,
                        body: "boom".into(),
                        retry_after: None,
                    },
                },
                StatusCode::BAD_GATEWAY,
                "WRITE_CONFLICT",
            ),
            (
                BridgeError::Internal {
                    context: context(),
                    details: "task aborted".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
            ),
        ];

        for (error, status, code) in cases {
            let api_error: ApiError = error.into();
            assert_eq!(api_error.status, status);
            assert_eq!(api_error.code.as_ref(), code);
            assert!(api_error.trace_id.is_some());
        }
    }

    #[test]
    fn test_error_details_name_operation_and_target() {
        let api_error: ApiError = BridgeError::WriteConflict {
            context: context(),
            source: VendorError::Http {
                status: 409,
                body: "version mismatch".into(),
                retry_after: None,
            },
        }
        .into();

        let details = api_error.details.unwrap();
        assert_eq!(details["operation"], "update_device");
        assert_eq!(details["target"], "erp-device-123");
        assert_eq!(details["cause_class"], "write_conflict");
        assert_eq!(details["upstream_status"], 409);
        assert!(api_error.message.contains("update_device [erp-device-123]"));
    }

    #[test]
    fn test_vendor_timeouts_classify_as_upstream_timeout() {
        let read = BridgeError::from_vendor_read(context(), VendorError::Timeout { timeout_ms: 5000 });
        assert!(matches!(read, BridgeError::UpstreamTimeout { .. }));

        let write = BridgeError::from_vendor_write(
            context(),
            VendorError::MalformedResponse {
                details: "x".into(),
            },
        );
        assert!(matches!(write, BridgeError::WriteConflict { .. }));
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );

        assert!(error.trace_id.is_some());
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }

    #[test]
    fn test_auth_and_validation_helpers() {
        let auth_error = unauthorized(None);
        assert_eq!(auth_error.status, StatusCode::UNAUTHORIZED);
        assert_eq!(auth_error.message, Box::from("Authentication required"));

        let field_errors = json!({"guid": "must not be empty"});
        let validation = validation_error("Validation failed", field_errors.clone());
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.details, Some(Box::new(field_errors)));

        let not_found: ApiError = ErrorType::NotFound.into();
        assert_eq!(not_found.code, Box::from("NOT_FOUND"));
    }
}
