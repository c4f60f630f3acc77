//! Shared infrastructure for NookTrip AWS Lambda functions.
//!
//! This crate provides common functionality used across all Lambda handlers:
//!
//! - [`SecretResolver`]: Process-wide secret bundle, fetched once and cached
//! - [`Dispatcher`]: Immutable `(method, path)` routing table with payload
//!   validation, timeouts and a uniform response envelope
//! - [`ProblemDetails`]: RFC 9457 Problem Details for consistent error responses
//! - [`OutboundResponse`] / [`InboundRequest`]: API Gateway proxy event shapes
//! - [`init_tracing`]: JSON-formatted tracing for CloudWatch Logs
//! - Request types with validation for each endpoint
//! - Persistence ([`SqliteStore`]) and mail ([`MailTransport`]) collaborators
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides in-memory collaborators and sample
//! payloads for handler testing. Enable the `test-utils` feature to access it
//! from dependent crates.

pub mod config;
mod dispatch;
mod error;
mod event;
pub mod mail;
pub mod maps;
mod problem;
mod requests;
mod response;
mod runtime;
pub mod secrets;
pub mod store;
mod tracing_init;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConfigError, LambdaConfig};
pub use dispatch::{
    Dispatcher, DuplicateRouteError, FieldNames, Handler, RouteKey, RouterBuilder,
    DEFAULT_HANDLER_TIMEOUT,
};
pub use error::{HandlerError, ValidationError};
pub use event::{EventError, InboundRequest};
pub use mail::{
    compose_itinerary_email, DeliveryReceipt, DryRunTransport, EmailMessage, HttpMailTransport,
    MailError, MailTransport, ITINERARY_EMAIL_SUBJECT,
};
pub use problem::{
    ProblemDetails, PROBLEM_DELIVERY_FAILED, PROBLEM_INTERNAL_ERROR, PROBLEM_INVALID_REQUEST,
    PROBLEM_ROUTE_NOT_FOUND, PROBLEM_SECRET_NOT_FOUND, PROBLEM_SECRET_STORE_UNAVAILABLE,
    PROBLEM_SERVICE_UNAVAILABLE, PROBLEM_TIMEOUT,
};
pub use requests::{
    is_valid_email, parse_coordinates, EmailRequest, FeedbackQuery, FeedbackSubmission, ItineraryDocument,
    ItineraryRequest, Stop, Validate,
};
pub use response::OutboundResponse;
pub use runtime::{dispatcher_builder, handle_event, init_aws_secret_resolver, serve};
pub use secrets::{
    init_secret_resolver, secret_resolver, AwsSecretStore, EnvSecretStore, SecretBundle,
    SecretError, SecretResolver, SecretStore, StaticSecretStore,
};
pub use store::{
    FeedbackEntry, FeedbackKind, FeedbackStore, ItineraryRecord, ItineraryStore, SqliteStore,
    StoreError,
};
pub use tracing_init::init_tracing;
