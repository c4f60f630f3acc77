//! Local wiring for running the Lambda handlers against a SQLite file.
//!
//! Every function's routes are registered on a single dispatcher whose secret
//! bundle points `DB_CONNECTION` at the given database. Mail is never sent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use http::Method;

use nooktrip_lambda_shared::secrets::keys;
use nooktrip_lambda_shared::{
    Dispatcher, DryRunTransport, InboundRequest, LambdaConfig, SecretBundle, SecretResolver,
    SqliteStore, StaticSecretStore,
};

/// Dispatcher serving every NookTrip route from `db_path`.
pub fn local_dispatcher(db_path: &Path, handler_timeout: Duration) -> Result<Dispatcher> {
    let mut bundle = SecretBundle::new();
    bundle.insert(
        keys::DB_CONNECTION,
        format!("sqlite://{}", db_path.display()),
    );

    let config = LambdaConfig {
        handler_timeout,
        ..LambdaConfig::default()
    };
    let resolver = Arc::new(SecretResolver::new(
        Arc::new(StaticSecretStore::new(bundle)),
        config.secret_fetch_timeout,
    ));

    let store = Arc::new(SqliteStore::new());
    let mut builder = nooktrip_lambda_shared::dispatcher_builder(&config, resolver);
    nooktrip_lambda_itineraries::register(&mut builder, store.clone(), None)?;
    nooktrip_lambda_emails::register(
        &mut builder,
        store.clone(),
        Arc::new(DryRunTransport),
        config.mail_sender.clone(),
    )?;
    nooktrip_lambda_feedback::register(&mut builder, store)?;

    Ok(builder.build())
}

/// Build a request from command-line pieces. Query pairs are `key=value`.
pub fn build_request(
    method: &str,
    path: &str,
    body: Option<String>,
    query: &[String],
) -> Result<InboundRequest> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method '{}'", method))?;

    let mut request = InboundRequest::new(method, path);
    for pair in query {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("query parameter '{}' must be key=value", pair);
        };
        request = request.with_query(key, value);
    }
    if let Some(body) = body {
        request = request
            .with_header("content-type", "application/json")
            .with_body(body);
    }
    Ok(request)
}
