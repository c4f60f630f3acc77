//! Email handler.
//!
//! `POST /emails` saves the selected itinerary against the recipient address,
//! renders it as a plain-text message and hands it to the mail transport.
//! Delivery is attempted once; a rejected message surfaces as a 502 and the
//! saved itinerary is kept.

use std::sync::Arc;

use async_trait::async_trait;
use lambda_runtime::Error;
use serde::Serialize;
use tracing::{info, warn};

use nooktrip_lambda_shared::secrets::keys;
use nooktrip_lambda_shared::{
    compose_itinerary_email, dispatcher_builder, init_aws_secret_resolver, init_tracing, serve,
    DryRunTransport, DuplicateRouteError, EmailRequest, FieldNames, Handler, HandlerError,
    HttpMailTransport, ItineraryRecord, ItineraryStore, LambdaConfig, MailTransport, RouteKey,
    RouterBuilder, SecretBundle, SqliteStore,
};

pub const ROUTE_PATH: &str = "/emails";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSent {
    pub status: &'static str,
    pub itinerary_id: String,
    pub message_id: String,
}

pub struct EmailHandler {
    store: Arc<dyn ItineraryStore>,
    transport: Arc<dyn MailTransport>,
    sender: String,
}

impl EmailHandler {
    pub fn new(
        store: Arc<dyn ItineraryStore>,
        transport: Arc<dyn MailTransport>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Handler for EmailHandler {
    type Input = EmailRequest;
    type Output = EmailSent;

    fn required_fields(&self) -> &'static [FieldNames] {
        &[&["itinerary"]]
    }

    async fn execute(
        &self,
        input: EmailRequest,
        secrets: &SecretBundle,
    ) -> Result<EmailSent, HandlerError> {
        let connection = secrets.get(keys::DB_CONNECTION)?;
        let api_key = if self.transport.requires_api_key() {
            Some(secrets.get(keys::MAIL_API_KEY)?)
        } else {
            None
        };

        let data =
            serde_json::to_value(&input.itinerary).map_err(|e| HandlerError::Internal(e.into()))?;
        let record = ItineraryRecord::new(Some(input.to.clone()), data);
        self.store.save_itinerary(connection, &record).await?;

        let message = compose_itinerary_email(&self.sender, &input.to, &input.itinerary);
        let receipt = self
            .transport
            .send(api_key, &message)
            .await
            .inspect_err(|e| {
                warn!(itinerary_id = %record.id, error = %e, "itinerary email not delivered");
            })?;

        info!(
            itinerary_id = %record.id,
            message_id = %receipt.message_id,
            "itinerary email sent"
        );

        Ok(EmailSent {
            status: "sent",
            itinerary_id: record.id,
            message_id: receipt.message_id,
        })
    }
}

/// Register `POST /emails` on `builder`.
pub fn register(
    builder: &mut RouterBuilder,
    store: Arc<dyn ItineraryStore>,
    transport: Arc<dyn MailTransport>,
    sender: impl Into<String>,
) -> Result<(), DuplicateRouteError> {
    builder.register(
        RouteKey::post(ROUTE_PATH),
        EmailHandler::new(store, transport, sender),
    )?;
    Ok(())
}

/// Mail transport selected by configuration.
pub fn transport_from_config(config: &LambdaConfig) -> Result<Arc<dyn MailTransport>, Error> {
    match &config.mail_api_url {
        Some(url) => Ok(Arc::new(HttpMailTransport::new(url.clone())?)),
        None => {
            warn!("MAIL_API_URL is not set; emails will be logged, not sent");
            Ok(Arc::new(DryRunTransport))
        }
    }
}

/// Entry point used by the Lambda runtime.
pub async fn run() -> Result<(), Error> {
    init_tracing();

    let config = LambdaConfig::from_env()?;
    let transport = transport_from_config(&config)?;
    let resolver = init_aws_secret_resolver(&config).await;

    let mut builder = dispatcher_builder(&config, resolver);
    register(
        &mut builder,
        Arc::new(SqliteStore::new()),
        transport,
        config.mail_sender.clone(),
    )?;

    serve(builder.build()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use nooktrip_lambda_shared::test_utils::{
        sample_itinerary_document, test_bundle, MemoryStore, RecordingTransport,
    };

    fn request() -> EmailRequest {
        EmailRequest {
            to: "traveler@example.com".into(),
            itinerary: sample_itinerary_document(),
        }
    }

    #[tokio::test]
    async fn test_execute_saves_then_sends() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let handler = EmailHandler::new(store.clone(), transport.clone(), "no-reply@nooktrip.app");

        let sent = handler.execute(request(), &test_bundle()).await.unwrap();

        assert_eq!(sent.status, "sent");
        let saved = store.itineraries();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, sent.itinerary_id);
        assert_eq!(saved[0].email.as_deref(), Some("traveler@example.com"));

        let messages = transport.sent();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0.as_deref(), Some("test-mail-key"));
        assert_eq!(messages[0].1.from, "no-reply@nooktrip.app");
    }

    #[tokio::test]
    async fn test_missing_mail_key_is_reported() {
        let handler = EmailHandler::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingTransport::new()),
            "no-reply@nooktrip.app",
        );
        let bundle: SecretBundle = [(keys::DB_CONNECTION, "sqlite://x")].into_iter().collect();

        let err = handler.execute(request(), &bundle).await.unwrap_err();
        assert!(matches!(err, HandlerError::SecretNotFound { ref key } if key == keys::MAIL_API_KEY));
    }

    #[tokio::test]
    async fn test_dry_run_needs_no_mail_key() {
        let handler = EmailHandler::new(
            Arc::new(MemoryStore::new()),
            Arc::new(DryRunTransport),
            "no-reply@nooktrip.app",
        );
        let bundle: SecretBundle = [(keys::DB_CONNECTION, "sqlite://x")].into_iter().collect();

        let sent = handler.execute(request(), &bundle).await.unwrap();
        assert!(sent.message_id.starts_with("dry-run-"));
    }

    #[test]
    fn test_transport_from_config() {
        let config = LambdaConfig::default();
        assert!(!transport_from_config(&config).unwrap().requires_api_key());

        let config = LambdaConfig {
            mail_api_url: Some("https://mail.example.com/send".into()),
            ..LambdaConfig::default()
        };
        assert!(transport_from_config(&config).unwrap().requires_api_key());
    }
}
