//! Inbound request model and API Gateway proxy event decoding.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::Method;
use serde_json::Value;
use thiserror::Error;

use crate::dispatch::RouteKey;

/// Error decoding an API Gateway event into an [`InboundRequest`].
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event does not carry an HTTP method")]
    MissingMethod,

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("event does not carry a request path")]
    MissingPath,

    #[error("request body is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("request body is not valid UTF-8")]
    NonUtf8Body,
}

/// HTTP-shaped request for one invocation.
///
/// Header names are stored lowercased. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    method: Method,
    path: String,
    headers: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
    body: Option<String>,
}

impl InboundRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: normalize_path(path),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(self.method.clone(), &self.path)
    }

    /// Decode an API Gateway proxy event (REST v1 or HTTP API v2).
    pub fn from_gateway_event(event: &Value) -> Result<Self, EventError> {
        let method = event
            .get("httpMethod")
            .and_then(Value::as_str)
            .or_else(|| {
                event
                    .pointer("/requestContext/http/method")
                    .and_then(Value::as_str)
            })
            .ok_or(EventError::MissingMethod)?;
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| EventError::InvalidMethod(method.to_string()))?;

        let path = event
            .get("rawPath")
            .and_then(Value::as_str)
            .or_else(|| event.get("path").and_then(Value::as_str))
            .ok_or(EventError::MissingPath)?;

        let mut request = Self::new(method, path);
        request.headers = string_map(event.get("headers"))
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        request.query = string_map(event.get("queryStringParameters"));

        if let Some(body) = event.get("body").and_then(Value::as_str) {
            let encoded = event
                .get("isBase64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            request.body = Some(if encoded {
                let bytes = BASE64.decode(body)?;
                String::from_utf8(bytes).map_err(|_| EventError::NonUtf8Body)?
            } else {
                body.to_string()
            });
        }

        Ok(request)
    }
}

/// Collect a JSON object of scalar values, dropping nulls.
fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };

    map.iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k.clone(), s.clone())),
            Value::Null => None,
            other => Some((k.clone(), other.to_string())),
        })
        .collect()
}

/// Strip query strings and trailing slashes; always start with `/`.
pub(crate) fn normalize_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default().trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
