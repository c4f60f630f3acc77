//! Response envelope returned to API Gateway.

use std::collections::BTreeMap;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::problem::ProblemDetails;

const FALLBACK_PROBLEM_BODY: &str =
    r#"{"type":"/problems/internal-error","title":"Internal Error","status":500,"error":"InternalError","message":"An internal error occurred"}"#;

/// API Gateway proxy response.
///
/// Terminal value: built once by the dispatcher and never mutated after it
/// is returned to the runtime.
///
/// # Example
///
/// ```
/// use nooktrip_lambda_shared::OutboundResponse;
/// use http::StatusCode;
/// use serde_json::json;
///
/// let response = OutboundResponse::json(StatusCode::OK, &json!({"status": "sent"}));
/// assert_eq!(response.status_code, 200);
/// assert_eq!(response.headers["content-type"], "application/json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl OutboundResponse {
    /// Create a JSON response with the given status.
    pub fn json(status: StatusCode, body: &Value) -> Self {
        Self::with_content_type(status, body.to_string(), "application/json")
    }

    /// Create an `application/problem+json` response from a problem.
    pub fn problem(problem: &ProblemDetails) -> Self {
        let body = serde_json::to_string(problem)
            .unwrap_or_else(|_| FALLBACK_PROBLEM_BODY.to_string());
        Self::with_content_type(problem.status_code(), body, "application/problem+json")
    }

    fn with_content_type(status: StatusCode, body: String, content_type: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        Self {
            status_code: status.as_u16(),
            headers,
            body,
            is_base64_encoded: false,
        }
    }

    /// Add a header unless one with the same (case-insensitive) name exists.
    pub fn with_default_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.to_string());
        self
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Parse the body back into JSON.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_response_serialization() {
        let response = OutboundResponse::json(StatusCode::OK, &json!({"itineraryId": "abc"}));
        let wire = serde_json::to_value(&response).unwrap();

        assert_eq!(wire["statusCode"], 200);
        assert_eq!(wire["isBase64Encoded"], false);
        assert_eq!(wire["headers"]["content-type"], "application/json");
        assert_eq!(wire["body"], "{\"itineraryId\":\"abc\"}");
    }

    #[test]
    fn test_problem_response() {
        let problem = ProblemDetails::bad_request("missing destination", "req-1");
        let response = OutboundResponse::problem(&problem);

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers["content-type"],
            "application/problem+json"
        );
        let body = response.body_json().unwrap();
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(body["message"], "missing destination");
    }

    #[test]
    fn test_default_header_does_not_override() {
        let response = OutboundResponse::json(StatusCode::OK, &json!([]))
            .with_default_header("Content-Type", "text/plain")
            .with_default_header("Access-Control-Allow-Origin", "*");

        assert_eq!(response.headers["content-type"], "application/json");
        assert_eq!(response.headers["access-control-allow-origin"], "*");
    }

    #[test]
    fn test_fallback_body_is_valid_json() {
        let parsed: Value = serde_json::from_str(FALLBACK_PROBLEM_BODY).unwrap();
        assert_eq!(parsed["status"], 500);
    }
}
