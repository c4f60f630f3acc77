//! Error taxonomy shared by every handler.

use std::fmt;

use thiserror::Error;

use crate::mail::MailError;
use crate::secrets::SecretError;
use crate::store::StoreError;

/// Client-caused input problem, detected before any domain logic runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Offending field, when the problem is attributable to one.
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Errors a handler (or the dispatcher on its behalf) can surface.
///
/// Each variant maps to exactly one HTTP status via
/// [`ProblemDetails::from_handler_error`](crate::ProblemDetails::from_handler_error).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Malformed or missing input (400).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A credential the handler needs is absent from the bundle (500).
    #[error("secret '{key}' is not present in the secret bundle")]
    SecretNotFound { key: String },

    /// The secret store could not be reached on first fetch (503).
    #[error("secret store unavailable: {0}")]
    SecretStoreUnavailable(String),

    /// The mail transport rejected or could not accept the message (502).
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// A downstream data source is unreachable (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The invocation exceeded its time budget (504).
    #[error("operation timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u128 },

    /// Anything unclassified (500). Detail is logged, never returned.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    /// Shorthand for a validation failure without a specific field.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(message))
    }

    /// Stable kind name placed in the `error` member of response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::SecretNotFound { .. } => "SecretNotFoundError",
            Self::SecretStoreUnavailable(_) => "SecretStoreUnavailableError",
            Self::Delivery(_) => "DeliveryError",
            Self::ServiceUnavailable(_) => "ServiceUnavailableError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Whether the failure was caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<SecretError> for HandlerError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::NotFound { key } => Self::SecretNotFound { key },
            SecretError::Unavailable(reason) => Self::SecretStoreUnavailable(reason),
            SecretError::Timeout(after) => Self::Timeout {
                elapsed_ms: after.as_millis(),
            },
            SecretError::Malformed(reason) => {
                Self::Internal(anyhow::anyhow!("secret bundle is malformed: {reason}"))
            }
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => Self::ServiceUnavailable(reason),
            StoreError::NotFound { what } => {
                Self::Validation(ValidationError::new(format!("{what} does not exist")))
            }
            StoreError::Query(reason) => Self::Internal(anyhow::anyhow!("query failed: {reason}")),
        }
    }
}

impl From<MailError> for HandlerError {
    fn from(err: MailError) -> Self {
        Self::Delivery(err.to_string())
    }
}
