//! Test utilities for Lambda handler testing.
//!
//! In-memory collaborators that count and record calls, so tests can assert
//! on side effects (or their absence) without AWS, SQLite or a mail API.
//!
//! # Usage
//!
//! Available in unit tests and, through the `test-utils` feature, to the
//! function crates' integration tests:
//!
//! ```ignore
//! use nooktrip_lambda_shared::test_utils::{mock_request_id, test_resolver, CountingSecretStore};
//!
//! let store = Arc::new(CountingSecretStore::new(test_bundle()));
//! let resolver = test_resolver(store.clone());
//! // ... dispatch a request
//! assert_eq!(store.fetch_count(), 0);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::mail::{DeliveryReceipt, EmailMessage, MailError, MailTransport};
use crate::requests::{ItineraryDocument, Stop};
use crate::secrets::{keys, SecretBundle, SecretError, SecretResolver, SecretStore};
use crate::store::{FeedbackEntry, FeedbackStore, ItineraryRecord, ItineraryStore, StoreError};

/// Connection string placed in [`test_bundle`].
pub const TEST_DB_CONNECTION: &str = "sqlite://memory-test";

/// Bundle with every well-known key populated.
pub fn test_bundle() -> SecretBundle {
    [
        (keys::DB_CONNECTION, TEST_DB_CONNECTION),
        (keys::MAIL_API_KEY, "test-mail-key"),
    ]
    .into_iter()
    .collect()
}

/// Resolver with a generous fetch timeout over `store`.
pub fn test_resolver(store: Arc<dyn SecretStore>) -> Arc<SecretResolver> {
    Arc::new(SecretResolver::new(store, Duration::from_secs(2)))
}

/// Create a mock request ID for testing.
pub fn mock_request_id(suffix: &str) -> String {
    format!("test-request-{}", suffix)
}

/// Secret store that counts fetches, optionally slowly or unsuccessfully.
#[derive(Debug)]
pub struct CountingSecretStore {
    bundle: Option<SecretBundle>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl CountingSecretStore {
    pub fn new(bundle: SecretBundle) -> Self {
        Self::with_delay(bundle, Duration::ZERO)
    }

    pub fn with_delay(bundle: SecretBundle, delay: Duration) -> Self {
        Self {
            bundle: Some(bundle),
            delay,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Every fetch fails with [`SecretError::Unavailable`].
    pub fn failing() -> Self {
        Self {
            bundle: None,
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Every fetch fails after sleeping for `delay`.
    pub fn failing_with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::failing()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for CountingSecretStore {
    async fn fetch_bundle(&self) -> Result<SecretBundle, SecretError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.bundle
            .clone()
            .ok_or_else(|| SecretError::Unavailable("connection refused".to_string()))
    }
}

/// In-memory itinerary and feedback store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    itineraries: Mutex<Vec<ItineraryRecord>>,
    feedback: Mutex<Vec<FeedbackEntry>>,
    connections: Mutex<Vec<String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn itineraries(&self) -> Vec<ItineraryRecord> {
        lock(&self.itineraries).clone()
    }

    pub fn feedback(&self) -> Vec<FeedbackEntry> {
        lock(&self.feedback).clone()
    }

    /// Connection strings passed to the store, one per call.
    pub fn connections(&self) -> Vec<String> {
        lock(&self.connections).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.connections).len()
    }

    fn enter(&self, connection: &str) -> Result<(), StoreError> {
        lock(&self.connections).push(connection.to_string());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ItineraryStore for MemoryStore {
    async fn save_itinerary(
        &self,
        connection: &str,
        record: &ItineraryRecord,
    ) -> Result<(), StoreError> {
        self.enter(connection)?;
        lock(&self.itineraries).push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn list_feedback(
        &self,
        connection: &str,
        itinerary_id: Option<&str>,
    ) -> Result<Vec<FeedbackEntry>, StoreError> {
        self.enter(connection)?;
        let mut entries: Vec<FeedbackEntry> = lock(&self.feedback)
            .iter()
            .filter(|e| itinerary_id.map_or(true, |id| e.itinerary_id == id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| (&b.created_at, &b.id).cmp(&(&a.created_at, &a.id)));
        Ok(entries)
    }

    async fn record_feedback(
        &self,
        connection: &str,
        entry: &FeedbackEntry,
    ) -> Result<(), StoreError> {
        self.enter(connection)?;
        if !lock(&self.itineraries)
            .iter()
            .any(|r| r.id == entry.itinerary_id)
        {
            return Err(StoreError::NotFound {
                what: format!("itinerary '{}'", entry.itinerary_id),
            });
        }
        lock(&self.feedback).push(entry.clone());
        Ok(())
    }
}

/// Mail transport that records messages instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Option<String>, EmailMessage)>>,
    reject: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails with [`MailError::Rejected`] (after being recorded).
    pub fn rejecting() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    /// Messages handed to the transport, with the API key used.
    pub fn sent(&self) -> Vec<(Option<String>, EmailMessage)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(
        &self,
        api_key: Option<&str>,
        message: &EmailMessage,
    ) -> Result<DeliveryReceipt, MailError> {
        let mut sent = lock(&self.sent);
        sent.push((api_key.map(str::to_string), message.clone()));
        if self.reject {
            return Err(MailError::Rejected {
                status: 422,
                reason: "recipient rejected".to_string(),
            });
        }
        Ok(DeliveryReceipt {
            message_id: format!("test-message-{}", sent.len()),
        })
    }
}

/// Two-stop Toronto itinerary with the first stop linked to the second.
pub fn sample_itinerary_document() -> ItineraryDocument {
    ItineraryDocument {
        package_name: "Toronto Highlights".to_string(),
        summary: "A half-day loop through downtown Toronto".to_string(),
        total_duration: "4 hours".to_string(),
        total_cost: 120,
        location_currency: "CAD".to_string(),
        start: "CN Tower".to_string(),
        end: "Royal Ontario Museum".to_string(),
        total_distance: "5 km".to_string(),
        transport_mode: "walking, subway".to_string(),
        stops: vec![
            Stop {
                location_name: "CN Tower".to_string(),
                duration: "1.5 hours".to_string(),
                cost: 43,
                currency: "CAD".to_string(),
                google_map_coordinates: "43.6426,-79.3871".to_string(),
                path_to_next: Some(
                    "https://www.google.com/maps/dir/43.6426,-79.3871/43.6677,-79.3948"
                        .to_string(),
                ),
            },
            Stop {
                location_name: "Royal Ontario Museum".to_string(),
                duration: "2 hours".to_string(),
                cost: 26,
                currency: "CAD".to_string(),
                google_map_coordinates: "43.6677,-79.3948".to_string(),
                path_to_next: None,
            },
        ],
    }
}
