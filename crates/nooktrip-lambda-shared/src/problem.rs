//! RFC 9457 Problem Details for HTTP APIs.
//!
//! Provides structured error responses following the Problem Details standard.
//! Every body additionally carries `error` (the error kind) and `message`
//! members so clients can branch on a stable name.
//! See: <https://www.rfc-editor.org/rfc/rfc9457.html>

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::dispatch::RouteKey;
use crate::error::HandlerError;

/// Problem type URI for malformed or missing input.
pub const PROBLEM_INVALID_REQUEST: &str = "/problems/invalid-request";

/// Problem type URI for requests that match no registered route.
pub const PROBLEM_ROUTE_NOT_FOUND: &str = "/problems/route-not-found";

/// Problem type URI for credentials missing from the secret bundle.
pub const PROBLEM_SECRET_NOT_FOUND: &str = "/problems/secret-not-found";

/// Problem type URI for an unreachable secret store.
pub const PROBLEM_SECRET_STORE_UNAVAILABLE: &str = "/problems/secret-store-unavailable";

/// Problem type URI for mail transport rejections.
pub const PROBLEM_DELIVERY_FAILED: &str = "/problems/delivery-failed";

/// Problem type URI for unreachable data sources.
pub const PROBLEM_SERVICE_UNAVAILABLE: &str = "/problems/service-unavailable";

/// Problem type URI for invocations that exceeded their time budget.
pub const PROBLEM_TIMEOUT: &str = "/problems/timeout";

/// Problem type URI for internal server errors.
pub const PROBLEM_INTERNAL_ERROR: &str = "/problems/internal-error";

const REDACTED_INTERNAL_MESSAGE: &str = "An internal error occurred";

/// RFC 9457 Problem Details response structure.
///
/// # Example
///
/// ```
/// use nooktrip_lambda_shared::{ProblemDetails, PROBLEM_INVALID_REQUEST};
/// use http::StatusCode;
///
/// let problem = ProblemDetails::new(
///     PROBLEM_INVALID_REQUEST,
///     "Invalid Request",
///     StatusCode::BAD_REQUEST,
///     "ValidationError",
/// )
/// .with_message("The 'startDate' field is required")
/// .with_request_id("req-12345");
/// assert_eq!(problem.status, 400);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI reference identifying the problem type (relative).
    #[serde(rename = "type")]
    pub type_uri: String,

    /// Short, human-readable summary of the problem.
    pub title: String,

    /// HTTP status code for this problem.
    pub status: u16,

    /// Error kind, e.g. `ValidationError`.
    pub error: String,

    /// Human-readable explanation specific to this occurrence.
    pub message: String,

    /// Request identifier of the failing invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    /// Create a new ProblemDetails with required fields.
    pub fn new(
        type_uri: impl Into<String>,
        title: impl Into<String>,
        status: StatusCode,
        error: impl Into<String>,
    ) -> Self {
        Self {
            type_uri: type_uri.into(),
            title: title.into(),
            status: status.as_u16(),
            error: error.into(),
            message: String::new(),
            instance: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add the request identifier for tracing.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.instance = Some(request_id.into());
        self
    }

    /// Create a 400 Bad Request problem for invalid input.
    pub fn bad_request(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INVALID_REQUEST,
            "Invalid Request",
            StatusCode::BAD_REQUEST,
            "ValidationError",
        )
        .with_message(message)
        .with_request_id(request_id)
    }

    /// Create a 404 Not Found problem for an unregistered route.
    pub fn route_not_found(route: &RouteKey, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_ROUTE_NOT_FOUND,
            "Route Not Found",
            StatusCode::NOT_FOUND,
            "RouteNotFound",
        )
        .with_message(format!("No handler is registered for {}", route))
        .with_request_id(request_id)
    }

    /// Create a 500 Internal Server Error problem.
    ///
    /// The message is fixed; callers log the underlying detail themselves.
    pub fn internal_error(request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INTERNAL_ERROR,
            "Internal Error",
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalError",
        )
        .with_message(REDACTED_INTERNAL_MESSAGE)
        .with_request_id(request_id)
    }

    /// Convert a handler error into its response representation.
    pub fn from_handler_error(error: &HandlerError, request_id: &str) -> Self {
        let (type_uri, title, status, message) = match error {
            HandlerError::Validation(e) => (
                PROBLEM_INVALID_REQUEST,
                "Invalid Request",
                StatusCode::BAD_REQUEST,
                e.message.clone(),
            ),
            HandlerError::SecretNotFound { .. } => (
                PROBLEM_SECRET_NOT_FOUND,
                "Configuration Error",
                StatusCode::INTERNAL_SERVER_ERROR,
                "A required service credential is not configured".to_string(),
            ),
            HandlerError::SecretStoreUnavailable(_) => (
                PROBLEM_SECRET_STORE_UNAVAILABLE,
                "Service Unavailable",
                StatusCode::SERVICE_UNAVAILABLE,
                "Service credentials are temporarily unavailable".to_string(),
            ),
            HandlerError::Delivery(_) => (
                PROBLEM_DELIVERY_FAILED,
                "Delivery Failed",
                StatusCode::BAD_GATEWAY,
                "The mail transport did not accept the message".to_string(),
            ),
            HandlerError::ServiceUnavailable(_) => (
                PROBLEM_SERVICE_UNAVAILABLE,
                "Service Unavailable",
                StatusCode::SERVICE_UNAVAILABLE,
                "The data source is temporarily unavailable".to_string(),
            ),
            HandlerError::Timeout { elapsed_ms } => (
                PROBLEM_TIMEOUT,
                "Gateway Timeout",
                StatusCode::GATEWAY_TIMEOUT,
                format!("The request did not complete within {} ms", elapsed_ms),
            ),
            HandlerError::Internal(_) => return Self::internal_error(request_id),
        };

        Self::new(type_uri, title, status, error.kind())
            .with_message(message)
            .with_request_id(request_id)
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl std::fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

impl std::error::Error for ProblemDetails {}
