//! Outbound itinerary email: composition and transports.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::maps::search_url;
use crate::requests::ItineraryDocument;

pub const ITINERARY_EMAIL_SUBJECT: &str = "Your NookTrip Itinerary";

const MAX_REASON_CHARS: usize = 200;
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    /// The transport answered but refused the message.
    #[error("mail transport rejected the message ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// The transport could not be reached.
    #[error("mail transport unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Submit one message. `api_key` is `None` only when
    /// [`MailTransport::requires_api_key`] is false.
    async fn send(
        &self,
        api_key: Option<&str>,
        message: &EmailMessage,
    ) -> Result<DeliveryReceipt, MailError>;

    fn requires_api_key(&self) -> bool {
        true
    }
}

/// Render the plain-text itinerary email.
pub fn compose_itinerary_email(from: &str, to: &str, itinerary: &ItineraryDocument) -> EmailMessage {
    let mut text = String::new();
    let _ = writeln!(text, "Your NookTrip Itinerary:");
    let _ = writeln!(text);
    let _ = writeln!(text, "Package Name: {}", itinerary.package_name);
    let _ = writeln!(text, "Summary: {}", itinerary.summary);
    let _ = writeln!(text, "Total Duration: {}", itinerary.total_duration);
    let _ = writeln!(
        text,
        "Total Cost: {} {}",
        itinerary.total_cost, itinerary.location_currency
    );
    let _ = writeln!(text, "Start: {}", itinerary.start);
    let _ = writeln!(text, "End: {}", itinerary.end);
    let _ = writeln!(text, "Total Distance: {}", itinerary.total_distance);
    let _ = writeln!(text, "Transport Mode: {}", itinerary.transport_mode);
    let _ = writeln!(text);
    let _ = writeln!(text, "Stops:");

    for stop in &itinerary.stops {
        let _ = writeln!(
            text,
            "- {}: Duration: {}, Cost: {} {}",
            stop.location_name, stop.duration, stop.cost, stop.currency
        );
        let _ = writeln!(
            text,
            "  Google Maps: {}",
            search_url(&stop.google_map_coordinates)
        );
        if let Some(next) = stop.path_to_next.as_deref().filter(|p| !p.is_empty()) {
            let _ = writeln!(text, "  Path to next stop: {}", next);
        }
    }

    EmailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: ITINERARY_EMAIL_SUBJECT.to_string(),
        text,
    }
}

/// JSON-over-HTTPS mail API authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpMailTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMailTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| MailError::Unreachable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(
        &self,
        api_key: Option<&str>,
        message: &EmailMessage,
    ) -> Result<DeliveryReceipt, MailError> {
        let mut request = self.client.post(self.endpoint.as_str()).json(message);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason: String = body.chars().take(MAX_REASON_CHARS).collect();
            warn!(status = status.as_u16(), reason = %reason, "mail transport rejected message");
            return Err(MailError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message_id = ["id", "messageId"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

        info!(message_id = %message_id, "itinerary email accepted");
        Ok(DeliveryReceipt { message_id })
    }
}

/// Logs the message instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunTransport;

#[async_trait]
impl MailTransport for DryRunTransport {
    async fn send(
        &self,
        _api_key: Option<&str>,
        message: &EmailMessage,
    ) -> Result<DeliveryReceipt, MailError> {
        let message_id = format!("dry-run-{}", uuid::Uuid::now_v7());
        info!(
            message_id = %message_id,
            subject = %message.subject,
            body_chars = message.text.chars().count(),
            "dry run: email not sent"
        );
        Ok(DeliveryReceipt { message_id })
    }

    fn requires_api_key(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_itinerary_document;

    #[test]
    fn test_compose_itinerary_email() {
        let itinerary = sample_itinerary_document();
        let message = compose_itinerary_email("no-reply@nooktrip.app", "a@b.co", &itinerary);

        assert_eq!(message.subject, ITINERARY_EMAIL_SUBJECT);
        assert_eq!(message.to, "a@b.co");
        assert!(message.text.starts_with("Your NookTrip Itinerary:"));
        assert!(message.text.contains("Package Name: Toronto Highlights"));
        assert!(message.text.contains("Total Cost: 120 CAD"));
        assert!(message.text.contains("- CN Tower: Duration: 1.5 hours, Cost: 43 CAD"));
        assert!(message
            .text
            .contains("Google Maps: https://www.google.com/maps/search/?api=1&query=43.6426,-79.3871"));
        assert_eq!(message.text.matches("Path to next stop:").count(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_transport() {
        let transport = DryRunTransport;
        assert!(!transport.requires_api_key());

        let message = compose_itinerary_email("from@x.io", "to@x.io", &sample_itinerary_document());
        let receipt = transport.send(None, &message).await.unwrap();
        assert!(receipt.message_id.starts_with("dry-run-"));
    }

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn serve_once(status_line: &'static str, body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Drain the request so the client sees a clean response.
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/send", addr)
    }

    #[tokio::test]
    async fn test_http_transport_rejection_carries_status_and_truncated_reason() {
        let endpoint = serve_once("422 Unprocessable Entity", "x".repeat(500)).await;
        let transport = HttpMailTransport::new(endpoint).unwrap();
        let message = compose_itinerary_email("from@x.io", "to@x.io", &sample_itinerary_document());

        let err = transport.send(Some("key"), &message).await.unwrap_err();
        match err {
            MailError::Rejected { status, reason } => {
                assert_eq!(status, 422);
                assert_eq!(reason.chars().count(), MAX_REASON_CHARS);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_transport_accepts_and_reads_message_id() {
        let endpoint = serve_once("202 Accepted", r#"{"id":"msg-42"}"#.to_string()).await;
        let transport = HttpMailTransport::new(endpoint).unwrap();
        let message = compose_itinerary_email("from@x.io", "to@x.io", &sample_itinerary_document());

        let receipt = transport.send(Some("key"), &message).await.unwrap();
        assert_eq!(receipt.message_id, "msg-42");
    }

    #[tokio::test]
    async fn test_http_transport_unreachable() {
        // Port 9 on localhost is the discard service and is closed on CI hosts.
        let transport = HttpMailTransport::new("http://127.0.0.1:9/send").unwrap();
        let message = compose_itinerary_email("from@x.io", "to@x.io", &sample_itinerary_document());

        let err = transport.send(Some("key"), &message).await.unwrap_err();
        assert!(matches!(err, MailError::Unreachable(_)));
    }
}
