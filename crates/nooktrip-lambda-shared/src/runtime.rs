//! Lambda runtime wiring shared by every function binary.
//!
//! Each function's `run()` follows the same cold-start sequence:
//!
//! 1. [`init_tracing`](crate::init_tracing)
//! 2. [`LambdaConfig::from_env`]
//! 3. [`init_aws_secret_resolver`] (no network I/O until the first request)
//! 4. [`dispatcher_builder`], register handlers, `build()`
//! 5. [`serve`]

use std::sync::Arc;
use std::time::Instant;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::LambdaConfig;
use crate::dispatch::{Dispatcher, RouterBuilder};
use crate::event::InboundRequest;
use crate::problem::ProblemDetails;
use crate::response::OutboundResponse;
use crate::secrets::{init_secret_resolver, AwsSecretStore, SecretResolver};

/// Install the process-wide resolver backed by AWS Secrets Manager.
pub async fn init_aws_secret_resolver(config: &LambdaConfig) -> Arc<SecretResolver> {
    let started = Instant::now();
    let store = AwsSecretStore::from_env(config.secret_id.clone()).await;
    let resolver = init_secret_resolver(Arc::new(store), config.secret_fetch_timeout);

    info!(
        secret_id = %config.secret_id,
        aws_config_ms = started.elapsed().as_millis(),
        "secret resolver initialized"
    );
    resolver
}

/// Router builder pre-configured from the function configuration.
pub fn dispatcher_builder(config: &LambdaConfig, resolver: Arc<SecretResolver>) -> RouterBuilder {
    let builder = Dispatcher::builder(resolver).with_timeout(config.handler_timeout);
    match &config.cors_allow_origin {
        Some(origin) => builder.with_default_header("Access-Control-Allow-Origin", origin.clone()),
        None => builder,
    }
}

/// Decode one API Gateway event and dispatch it.
pub async fn handle_event(dispatcher: &Dispatcher, event: LambdaEvent<Value>) -> OutboundResponse {
    let request_id = event.context.request_id.clone();

    match InboundRequest::from_gateway_event(&event.payload) {
        Ok(request) => dispatcher.dispatch(request, &request_id).await,
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "failed to decode gateway event");
            dispatcher.problem_response(&ProblemDetails::bad_request(
                format!("Invalid request: {}", e),
                request_id,
            ))
        }
    }
}

/// Run the Lambda event loop until the runtime shuts down.
pub async fn serve(dispatcher: Dispatcher) -> Result<(), Error> {
    let dispatcher = Arc::new(dispatcher);
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { Ok::<_, Error>(handle_event(&dispatcher, event).await) }
    }))
    .await
}
