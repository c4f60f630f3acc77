//! Secret resolution with a process-wide cache.
//!
//! The secret bundle is fetched from the backing [`SecretStore`] at most once
//! per execution environment. Concurrent first requests are coalesced behind a
//! single in-flight fetch; later requests are served from memory without I/O.
//!
//! # Cold-Start Performance
//!
//! The resolver logs `fetch_ms` and the number of keys when the bundle is first
//! loaded. A failed fetch is not cached: callers already waiting on it share
//! its error, and the next request retries.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Well-known keys in the secret bundle.
pub mod keys {
    /// Database connection string.
    pub const DB_CONNECTION: &str = "DB_CONNECTION";
    /// Bearer token for the mail transport.
    pub const MAIL_API_KEY: &str = "MAIL_API_KEY";
}

/// Default upper bound on a single fetch from the backing store.
pub const DEFAULT_SECRET_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

static RESOLVER: OnceLock<Arc<SecretResolver>> = OnceLock::new();

#[derive(Debug, Clone, Error)]
pub enum SecretError {
    #[error("secret '{key}' is not present in the secret bundle")]
    NotFound { key: String },

    #[error("secret store unavailable: {0}")]
    Unavailable(String),

    #[error("secret payload is malformed: {0}")]
    Malformed(String),

    #[error("secret fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Flat key/value credentials. Values never appear in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretBundle(HashMap<String, String>);

impl SecretBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object payload as stored in AWS Secrets Manager.
    ///
    /// Scalars are stringified and nulls dropped; nested values are kept as
    /// their JSON text.
    pub fn from_json(raw: &str) -> Result<Self, SecretError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| SecretError::Malformed(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(SecretError::Malformed(
                "expected a JSON object of key/value pairs".to_string(),
            ));
        };

        Ok(map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::Null => None,
                Value::String(s) => Some((k, s)),
                other => Some((k, other.to_string())),
            })
            .collect())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a key, failing with [`SecretError::NotFound`].
    pub fn get(&self, key: &str) -> Result<&str, SecretError> {
        self.0
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SecretError::NotFound {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key names in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SecretBundle {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBundle")
            .field("keys", &self.keys())
            .finish_non_exhaustive()
    }
}

/// Backing store for the secret bundle.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch_bundle(&self) -> Result<SecretBundle, SecretError>;
}

/// Caching, fetch-coalescing front for a [`SecretStore`].
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
    fetch_timeout: Duration,
    cached: RwLock<Option<Arc<SecretBundle>>>,
    /// Number of fetches that have finished, successfully or not.
    completed: AtomicU64,
    /// Outcome of the most recent failed fetch, held under the gate.
    fetch_gate: Mutex<Option<SecretError>>,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn SecretStore>, fetch_timeout: Duration) -> Self {
        Self {
            store,
            fetch_timeout,
            cached: RwLock::new(None),
            completed: AtomicU64::new(0),
            fetch_gate: Mutex::new(None),
        }
    }

    /// Resolve a single secret value by key.
    pub async fn resolve(&self, key: &str) -> Result<String, SecretError> {
        let bundle = self.bundle().await?;
        bundle.get(key).map(str::to_string)
    }

    /// Return the cached bundle, fetching it on first use.
    pub async fn bundle(&self) -> Result<Arc<SecretBundle>, SecretError> {
        if let Some(bundle) = self.cached() {
            return Ok(bundle);
        }

        let observed = self.completed.load(Ordering::Acquire);
        let mut last_error = self.fetch_gate.lock().await;

        // A fetch finished while we waited: share its outcome.
        if self.completed.load(Ordering::Acquire) != observed {
            if let Some(bundle) = self.cached() {
                debug!("secret bundle populated by concurrent fetch");
                return Ok(bundle);
            }
            if let Some(err) = last_error.as_ref() {
                debug!(error = %err, "sharing failure of concurrent secret fetch");
                return Err(err.clone());
            }
        }

        if let Some(bundle) = self.cached() {
            return Ok(bundle);
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.fetch_timeout, self.store.fetch_bundle()).await
        {
            Ok(Ok(bundle)) => Ok(Arc::new(bundle)),
            Ok(Err(e)) => {
                warn!(error = %e, "secret fetch failed");
                Err(e)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "secret fetch timed out"
                );
                Err(SecretError::Timeout(self.fetch_timeout))
            }
        };

        let bundle = match outcome {
            Ok(bundle) => {
                *last_error = None;
                bundle
            }
            Err(e) => {
                *last_error = Some(e.clone());
                self.completed.fetch_add(1, Ordering::AcqRel);
                return Err(e);
            }
        };

        info!(
            fetch_ms = started.elapsed().as_millis(),
            key_count = bundle.len(),
            "secret bundle loaded"
        );

        *self
            .cached
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&bundle));
        self.completed.fetch_add(1, Ordering::AcqRel);
        Ok(bundle)
    }

    /// Drop the cached bundle so the next request refetches.
    pub fn invalidate(&self) {
        *self
            .cached
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        info!("secret cache invalidated");
    }

    pub fn is_cached(&self) -> bool {
        self.cached().is_some()
    }

    fn cached(&self) -> Option<Arc<SecretBundle>> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretResolver")
            .field("fetch_timeout", &self.fetch_timeout)
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// Install the process-wide resolver.
///
/// The first call wins; later calls return the already installed resolver and
/// ignore `store`.
pub fn init_secret_resolver(store: Arc<dyn SecretStore>, fetch_timeout: Duration) -> Arc<SecretResolver> {
    Arc::clone(RESOLVER.get_or_init(|| Arc::new(SecretResolver::new(store, fetch_timeout))))
}

/// The process-wide resolver, if [`init_secret_resolver`] has run.
pub fn secret_resolver() -> Option<Arc<SecretResolver>> {
    RESOLVER.get().cloned()
}

/// AWS Secrets Manager backed store. The secret string must be a JSON object.
#[derive(Debug, Clone)]
pub struct AwsSecretStore {
    client: aws_sdk_secretsmanager::Client,
    secret_id: String,
}

impl AwsSecretStore {
    pub fn new(client: aws_sdk_secretsmanager::Client, secret_id: impl Into<String>) -> Self {
        Self {
            client,
            secret_id: secret_id.into(),
        }
    }

    /// Build a client from the ambient AWS environment (region, credentials).
    pub async fn from_env(secret_id: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(aws_sdk_secretsmanager::Client::new(&config), secret_id)
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn fetch_bundle(&self) -> Result<SecretBundle, SecretError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(&self.secret_id)
            .send()
            .await
            .map_err(|e| SecretError::Unavailable(DisplayErrorContext(&e).to_string()))?;

        let raw = output.secret_string().ok_or_else(|| {
            SecretError::Malformed(format!("secret '{}' has no string value", self.secret_id))
        })?;

        SecretBundle::from_json(raw)
    }
}

/// Reads each named key from the process environment; absent keys are skipped.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    keys: Vec<String>,
}

impl EnvSecretStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch_bundle(&self) -> Result<SecretBundle, SecretError> {
        Ok(self
            .keys
            .iter()
            .filter_map(|key| {
                std::env::var(key)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.clone(), v))
            })
            .collect())
    }
}

/// Fixed in-memory bundle, used by the CLI and tests.
#[derive(Debug, Clone)]
pub struct StaticSecretStore {
    bundle: SecretBundle,
}

impl StaticSecretStore {
    pub fn new(bundle: SecretBundle) -> Self {
        Self { bundle }
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn fetch_bundle(&self) -> Result<SecretBundle, SecretError> {
        Ok(self.bundle.clone())
    }
}
