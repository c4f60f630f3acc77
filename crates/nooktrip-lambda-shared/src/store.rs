//! Persistence for selected itineraries and their feedback.
//!
//! The connection string comes from the `DB_CONNECTION` secret on every call,
//! so store implementations hold no connection state of their own.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS selected_itineraries (
    id TEXT PRIMARY KEY,
    email TEXT,
    itinerary_data TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS itinerary_feedback (
    id TEXT PRIMARY KEY,
    itinerary_id TEXT NOT NULL REFERENCES selected_itineraries(id),
    feedback TEXT NOT NULL CHECK (feedback IN ('like', 'dislike')),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_feedback_itinerary ON itinerary_feedback(itinerary_id);
";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened.
    #[error("data store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    /// A referenced record does not exist.
    #[error("{what} does not exist")]
    NotFound { what: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Query(err.to_string())
    }
}

/// Traveller reaction to an itinerary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Like,
    Dislike,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(Self::Like),
            "dislike" => Ok(Self::Dislike),
            other => Err(format!(
                "Unknown feedback '{}'. Expected 'like' or 'dislike'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub id: String,
    pub itinerary_id: String,
    pub feedback: FeedbackKind,
    pub created_at: String,
}

impl FeedbackEntry {
    /// New entry with a fresh time-ordered id.
    pub fn new(itinerary_id: impl Into<String>, feedback: FeedbackKind) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            itinerary_id: itinerary_id.into(),
            feedback,
            created_at: timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItineraryRecord {
    pub id: String,
    pub email: Option<String>,
    pub data: Value,
    pub created_at: String,
}

impl ItineraryRecord {
    pub fn new(email: Option<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            email,
            data,
            created_at: timestamp(),
        }
    }
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
pub trait ItineraryStore: Send + Sync {
    async fn save_itinerary(&self, connection: &str, record: &ItineraryRecord)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Entries newest first, optionally restricted to one itinerary.
    async fn list_feedback(
        &self,
        connection: &str,
        itinerary_id: Option<&str>,
    ) -> Result<Vec<FeedbackEntry>, StoreError>;

    /// Fails with [`StoreError::NotFound`] when the itinerary is unknown.
    async fn record_feedback(&self, connection: &str, entry: &FeedbackEntry)
        -> Result<(), StoreError>;
}

/// SQLite-backed store. `connection` is a file path, optionally prefixed with
/// `sqlite://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteStore;

impl SqliteStore {
    pub fn new() -> Self {
        Self
    }

    /// Create the database file and schema if they do not exist.
    pub fn initialize(path: &Path) -> Result<(), StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn open(connection: &str) -> Result<Connection, StoreError> {
        let path = connection.strip_prefix("sqlite://").unwrap_or(connection);
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    async fn with_connection<T, F>(connection: &str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let connection = connection.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&connection)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Query(format!("store task failed: {}", e)))?
    }
}

#[async_trait]
impl ItineraryStore for SqliteStore {
    async fn save_itinerary(
        &self,
        connection: &str,
        record: &ItineraryRecord,
    ) -> Result<(), StoreError> {
        let record = record.clone();
        Self::with_connection(connection, move |conn| {
            conn.execute(
                "INSERT INTO selected_itineraries (id, email, itinerary_data, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.email,
                    record.data.to_string(),
                    record.created_at
                ],
            )?;
            debug!(itinerary_id = %record.id, "itinerary saved");
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl FeedbackStore for SqliteStore {
    async fn list_feedback(
        &self,
        connection: &str,
        itinerary_id: Option<&str>,
    ) -> Result<Vec<FeedbackEntry>, StoreError> {
        let itinerary_id = itinerary_id.map(str::to_string);
        Self::with_connection(connection, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, itinerary_id, feedback, created_at
                 FROM itinerary_feedback
                 WHERE ?1 IS NULL OR itinerary_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt.query_map(params![itinerary_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, itinerary_id, feedback, created_at) = row?;
                let feedback = feedback.parse().map_err(StoreError::Query)?;
                entries.push(FeedbackEntry {
                    id,
                    itinerary_id,
                    feedback,
                    created_at,
                });
            }
            Ok(entries)
        })
        .await
    }

    async fn record_feedback(
        &self,
        connection: &str,
        entry: &FeedbackEntry,
    ) -> Result<(), StoreError> {
        let entry = entry.clone();
        Self::with_connection(connection, move |conn| {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM selected_itineraries WHERE id = ?1",
                    params![entry.itinerary_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                return Err(StoreError::NotFound {
                    what: format!("itinerary '{}'", entry.itinerary_id),
                });
            }

            conn.execute(
                "INSERT INTO itinerary_feedback (id, itinerary_id, feedback, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.id,
                    entry.itinerary_id,
                    entry.feedback.as_str(),
                    entry.created_at
                ],
            )?;
            Ok(())
        })
        .await
    }
}
