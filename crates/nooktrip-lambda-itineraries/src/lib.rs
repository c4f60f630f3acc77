//! Itinerary submission handler.
//!
//! `POST /itineraries` validates the trip request, normalizes it, persists it
//! as a selected itinerary and echoes it back with its new identifier.

use std::sync::Arc;

use async_trait::async_trait;
use lambda_runtime::Error;
use serde::Serialize;
use tracing::info;

use nooktrip_lambda_shared::secrets::keys;
use nooktrip_lambda_shared::{
    dispatcher_builder, init_aws_secret_resolver, init_tracing, serve, DuplicateRouteError,
    FieldNames, Handler, HandlerError, ItineraryRecord, ItineraryRequest, ItineraryStore,
    LambdaConfig, RouteKey, RouterBuilder, SecretBundle, SqliteStore,
};

pub const ROUTE_PATH: &str = "/itineraries";

/// Successful response: the normalized request plus generated fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryCreated {
    pub itinerary_id: String,

    #[serde(flatten)]
    pub itinerary: ItineraryRequest,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_location: Option<String>,
}

pub struct ItineraryHandler {
    store: Arc<dyn ItineraryStore>,
    assets_location: Option<String>,
}

impl ItineraryHandler {
    pub fn new(store: Arc<dyn ItineraryStore>, assets_location: Option<String>) -> Self {
        Self {
            store,
            assets_location,
        }
    }
}

#[async_trait]
impl Handler for ItineraryHandler {
    type Input = ItineraryRequest;
    type Output = ItineraryCreated;

    fn required_fields(&self) -> &'static [FieldNames] {
        &[
            &["destination"],
            &["startDate", "start_date"],
            &["endDate", "end_date"],
        ]
    }

    async fn execute(
        &self,
        input: ItineraryRequest,
        secrets: &SecretBundle,
    ) -> Result<ItineraryCreated, HandlerError> {
        let connection = secrets.get(keys::DB_CONNECTION)?;
        let itinerary = input.normalized();

        let data = serde_json::to_value(&itinerary).map_err(|e| HandlerError::Internal(e.into()))?;
        let record = ItineraryRecord::new(None, data);
        self.store.save_itinerary(connection, &record).await?;

        info!(
            itinerary_id = %record.id,
            destination = %itinerary.destination,
            stops = itinerary.stops.len(),
            "itinerary created"
        );

        Ok(ItineraryCreated {
            itinerary_id: record.id,
            itinerary,
            assets_location: self.assets_location.clone(),
        })
    }
}

/// Register `POST /itineraries` on `builder`.
pub fn register(
    builder: &mut RouterBuilder,
    store: Arc<dyn ItineraryStore>,
    assets_location: Option<String>,
) -> Result<(), DuplicateRouteError> {
    builder.register(
        RouteKey::post(ROUTE_PATH),
        ItineraryHandler::new(store, assets_location),
    )?;
    Ok(())
}

/// Entry point used by the Lambda runtime.
pub async fn run() -> Result<(), Error> {
    init_tracing();

    let config = LambdaConfig::from_env()?;
    let resolver = init_aws_secret_resolver(&config).await;

    let mut builder = dispatcher_builder(&config, resolver);
    register(
        &mut builder,
        Arc::new(SqliteStore::new()),
        config.assets_location.clone(),
    )?;

    serve(builder.build()).await
}
