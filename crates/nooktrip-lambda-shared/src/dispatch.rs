//! Request dispatcher: an immutable `(method, path)` routing table.
//!
//! The table is assembled once at cold start through [`RouterBuilder`] and
//! queried on every invocation. Dispatch is single-shot and stateless:
//!
//! ```text
//! InboundRequest ─► route lookup ─► payload schema check ─► secret bundle
//!                      │ miss             │ invalid             │
//!                      ▼                  ▼                     ▼
//!                     404                400          handler.execute (timeout)
//!                                                              │
//!                                     OutboundResponse ◄───────┘
//! ```
//!
//! Validation runs before the secret bundle is requested, so a rejected
//! payload never causes I/O.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::HandlerError;
use crate::event::{normalize_path, InboundRequest};
use crate::problem::ProblemDetails;
use crate::requests::Validate;
use crate::response::OutboundResponse;
use crate::secrets::{SecretBundle, SecretResolver};

/// Default upper bound on a single handler execution.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

/// `(method, path)` pair identifying exactly one handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    method: Method,
    path: String,
}

impl RouteKey {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: normalize_path(path),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Raised when a route key is registered twice.
#[derive(Debug, Error)]
#[error("route {route} is already registered")]
pub struct DuplicateRouteError {
    pub route: RouteKey,
}

/// Accepted spellings of one payload member, canonical name first.
pub type FieldNames = &'static [&'static str];

/// A unit of domain logic bound to one route.
///
/// The dispatcher deserializes the payload into [`Handler::Input`], checks
/// [`Handler::required_fields`] and [`Validate`] first, and only then
/// resolves the secret bundle and calls [`Handler::execute`].
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    type Input: DeserializeOwned + Validate + Send + 'static;
    type Output: Serialize + Send;

    /// Top-level payload members that must be present and non-null.
    ///
    /// Each entry lists the accepted spellings of one member; the first is
    /// the name reported when it is missing.
    fn required_fields(&self) -> &'static [FieldNames] {
        &[]
    }

    async fn execute(
        &self,
        input: Self::Input,
        secrets: &SecretBundle,
    ) -> Result<Self::Output, HandlerError>;
}

/// Type-erased handler stored in the routing table.
#[async_trait]
trait Route: Send + Sync {
    async fn call(&self, payload: Value, resolver: &SecretResolver) -> Result<Value, HandlerError>;
}

#[async_trait]
impl<H> Route for H
where
    H: Handler,
{
    async fn call(&self, payload: Value, resolver: &SecretResolver) -> Result<Value, HandlerError> {
        let input: H::Input = parse_payload(payload, self.required_fields())?;
        let secrets = resolver.bundle().await?;
        let output = self.execute(input, &secrets).await?;
        serde_json::to_value(output).map_err(|e| HandlerError::Internal(e.into()))
    }
}

/// Check required members, deserialize and validate a payload.
fn parse_payload<T>(payload: Value, required: &[FieldNames]) -> Result<T, HandlerError>
where
    T: DeserializeOwned + Validate,
{
    if !required.is_empty() {
        let object = match &payload {
            Value::Object(object) => object,
            Value::Null => return Err(HandlerError::validation("A request body is required")),
            _ => {
                return Err(HandlerError::validation(
                    "The request body must be a JSON object",
                ))
            }
        };

        let missing: Vec<&str> = required
            .iter()
            .filter(|names| {
                !names
                    .iter()
                    .any(|name| object.get(*name).is_some_and(|v| !v.is_null()))
            })
            .filter_map(|names| names.first().copied())
            .collect();
        if !missing.is_empty() {
            return Err(HandlerError::validation(format!(
                "Missing required field(s): {}",
                missing.join(", ")
            )));
        }
    }

    let input: T = serde_json::from_value(payload)
        .map_err(|e| HandlerError::validation(format!("Malformed request body: {}", e)))?;
    input.validate()?;
    Ok(input)
}

/// Build the handler payload: query parameters for reads, JSON body otherwise.
fn request_payload(request: &InboundRequest) -> Result<Value, HandlerError> {
    if matches!(*request.method(), Method::GET | Method::HEAD) {
        let query: Map<String, Value> = request
            .query()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        return Ok(Value::Object(query));
    }

    match request.body().map(str::trim) {
        None | Some("") => Ok(Value::Null),
        Some(body) => serde_json::from_str(body).map_err(|e| {
            HandlerError::validation(format!("The request body is not valid JSON: {}", e))
        }),
    }
}

/// Assembles the routing table. Consumed by [`RouterBuilder::build`].
pub struct RouterBuilder {
    routes: HashMap<RouteKey, Arc<dyn Route>>,
    resolver: Arc<SecretResolver>,
    timeout: Duration,
    default_headers: BTreeMap<String, String>,
}

impl RouterBuilder {
    pub fn new(resolver: Arc<SecretResolver>) -> Self {
        Self {
            routes: HashMap::new(),
            resolver,
            timeout: DEFAULT_HANDLER_TIMEOUT,
            default_headers: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Header added to every response that does not already set it.
    pub fn with_default_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.default_headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Bind `handler` to `key`.
    pub fn register<H: Handler>(
        &mut self,
        key: RouteKey,
        handler: H,
    ) -> Result<&mut Self, DuplicateRouteError> {
        if self.routes.contains_key(&key) {
            return Err(DuplicateRouteError { route: key });
        }
        self.routes.insert(key, Arc::new(handler));
        Ok(self)
    }

    pub fn build(self) -> Dispatcher {
        let mut routes: Vec<String> = self.routes.keys().map(ToString::to_string).collect();
        routes.sort();
        info!(routes = ?routes, timeout_ms = self.timeout.as_millis() as u64, "routing table built");

        Dispatcher {
            routes: self.routes,
            resolver: self.resolver,
            timeout: self.timeout,
            default_headers: self.default_headers,
        }
    }
}

/// Maps inbound requests to handlers and normalizes every outcome into an
/// [`OutboundResponse`].
pub struct Dispatcher {
    routes: HashMap<RouteKey, Arc<dyn Route>>,
    resolver: Arc<SecretResolver>,
    timeout: Duration,
    default_headers: BTreeMap<String, String>,
}

impl Dispatcher {
    pub fn builder(resolver: Arc<SecretResolver>) -> RouterBuilder {
        RouterBuilder::new(resolver)
    }

    /// Registered routes in sorted order.
    pub fn routes(&self) -> Vec<RouteKey> {
        let mut keys: Vec<RouteKey> = self.routes.keys().cloned().collect();
        keys.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        keys
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn secret_resolver(&self) -> &Arc<SecretResolver> {
        &self.resolver
    }

    /// Dispatch one request. Always produces a well-formed response.
    ///
    /// The handler runs on its own task so that a panic is contained and a
    /// timeout can abandon it; side effects already performed are not rolled
    /// back.
    pub async fn dispatch(&self, request: InboundRequest, request_id: &str) -> OutboundResponse {
        let started = Instant::now();
        let key = request.route_key();

        let Some(route) = self.routes.get(&key).cloned() else {
            warn!(request_id = %request_id, route = %key, "no handler registered for route");
            return self.problem_response(&ProblemDetails::route_not_found(&key, request_id));
        };

        let outcome = match request_payload(&request) {
            Ok(payload) => self.run_handler(route, payload, &key, request_id).await,
            Err(e) => Err(e),
        };

        let response = match outcome {
            Ok(body) => OutboundResponse::json(StatusCode::OK, &body),
            Err(err) => {
                log_failure(&err, &key, request_id);
                OutboundResponse::problem(&ProblemDetails::from_handler_error(&err, request_id))
            }
        };

        info!(
            request_id = %request_id,
            route = %key,
            status = response.status_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        self.finish(response)
    }

    async fn run_handler(
        &self,
        route: Arc<dyn Route>,
        payload: Value,
        key: &RouteKey,
        request_id: &str,
    ) -> Result<Value, HandlerError> {
        let resolver = Arc::clone(&self.resolver);
        let span = info_span!("handler", request_id = %request_id, route = %key);
        let started = Instant::now();

        let mut task =
            tokio::spawn(async move { route.call(payload, &resolver).await }.instrument(span));

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(HandlerError::Internal(anyhow::anyhow!(
                "handler task failed: {}",
                join_error
            ))),
            Err(_) => {
                task.abort();
                Err(HandlerError::Timeout {
                    elapsed_ms: started.elapsed().as_millis(),
                })
            }
        }
    }

    /// Wrap a problem with the dispatcher's default headers.
    pub fn problem_response(&self, problem: &ProblemDetails) -> OutboundResponse {
        self.finish(OutboundResponse::problem(problem))
    }

    fn finish(&self, response: OutboundResponse) -> OutboundResponse {
        self.default_headers
            .iter()
            .fold(response, |response, (name, value)| {
                response.with_default_header(name, value)
            })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn log_failure(err: &HandlerError, key: &RouteKey, request_id: &str) {
    match err {
        HandlerError::Validation(e) => {
            warn!(request_id = %request_id, route = %key, field = ?e.field, error = %e, "request rejected");
        }
        HandlerError::Timeout { elapsed_ms } => {
            warn!(request_id = %request_id, route = %key, elapsed_ms = *elapsed_ms as u64, "handler timed out");
        }
        HandlerError::Internal(e) => {
            error!(request_id = %request_id, route = %key, error = %format!("{:#}", e), "internal error");
        }
        other => {
            error!(request_id = %request_id, route = %key, kind = other.kind(), error = %other, "handler failed");
        }
    }
}
