//! Feedback handlers.
//!
//! - `GET /feedback[?itineraryId=...]` lists recorded reactions, newest first.
//! - `POST /feedback` records a `like` or `dislike` for a saved itinerary.

use std::sync::Arc;

use async_trait::async_trait;
use lambda_runtime::Error;
use tracing::info;

use nooktrip_lambda_shared::secrets::keys;
use nooktrip_lambda_shared::{
    dispatcher_builder, init_aws_secret_resolver, init_tracing, serve, DuplicateRouteError,
    FeedbackEntry, FeedbackQuery, FeedbackStore, FeedbackSubmission, FieldNames, Handler,
    HandlerError, LambdaConfig, RouteKey, RouterBuilder, SecretBundle, SqliteStore,
};

pub const ROUTE_PATH: &str = "/feedback";

pub struct ListFeedbackHandler {
    store: Arc<dyn FeedbackStore>,
}

impl ListFeedbackHandler {
    pub fn new(store: Arc<dyn FeedbackStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler for ListFeedbackHandler {
    type Input = FeedbackQuery;
    type Output = Vec<FeedbackEntry>;

    async fn execute(
        &self,
        input: FeedbackQuery,
        secrets: &SecretBundle,
    ) -> Result<Vec<FeedbackEntry>, HandlerError> {
        let connection = secrets.get(keys::DB_CONNECTION)?;
        let filter = input.itinerary_id.as_deref().map(str::trim);
        let entries = self.store.list_feedback(connection, filter).await?;
        info!(count = entries.len(), filtered = filter.is_some(), "feedback listed");
        Ok(entries)
    }
}

pub struct RecordFeedbackHandler {
    store: Arc<dyn FeedbackStore>,
}

impl RecordFeedbackHandler {
    pub fn new(store: Arc<dyn FeedbackStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler for RecordFeedbackHandler {
    type Input = FeedbackSubmission;
    type Output = FeedbackEntry;

    fn required_fields(&self) -> &'static [FieldNames] {
        &[&["itineraryId", "itinerary_id"], &["feedback"]]
    }

    async fn execute(
        &self,
        input: FeedbackSubmission,
        secrets: &SecretBundle,
    ) -> Result<FeedbackEntry, HandlerError> {
        let connection = secrets.get(keys::DB_CONNECTION)?;
        let entry = FeedbackEntry::new(input.itinerary_id.trim(), input.kind()?);
        self.store.record_feedback(connection, &entry).await?;
        info!(
            itinerary_id = %entry.itinerary_id,
            feedback = %entry.feedback,
            "feedback recorded"
        );
        Ok(entry)
    }
}

/// Register both feedback routes on `builder`.
pub fn register(
    builder: &mut RouterBuilder,
    store: Arc<dyn FeedbackStore>,
) -> Result<(), DuplicateRouteError> {
    builder
        .register(
            RouteKey::get(ROUTE_PATH),
            ListFeedbackHandler::new(Arc::clone(&store)),
        )?
        .register(RouteKey::post(ROUTE_PATH), RecordFeedbackHandler::new(store))?;
    Ok(())
}

/// Entry point used by the Lambda runtime.
pub async fn run() -> Result<(), Error> {
    init_tracing();

    let config = LambdaConfig::from_env()?;
    let resolver = init_aws_secret_resolver(&config).await;

    let mut builder = dispatcher_builder(&config, resolver);
    register(&mut builder, Arc::new(SqliteStore::new()))?;

    serve(builder.build()).await
}
