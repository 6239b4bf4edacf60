//! Document store contracts.
//!
//! # Responsibility
//! - Define the collection/document API the gateway talks to.
//! - Define live watches and the transaction primitive.
//!
//! # Invariants
//! - Documents are JSON objects addressed by `(collection, id)`.
//! - `set_doc` is an upsert; `delete_doc` of a missing document succeeds.
//! - A watch sink receives the full current result set, first on
//!   registration and then after every committed write to its collection.
//! - Work passed to `run_transaction` commits all of its writes or none.

use crate::model::query::QueryParams;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod schema;
mod sqlite_store;

pub use sqlite_store::SqliteDocumentStore;

pub const PUBLISHED_QUESTIONS: &str = "questions";
pub const UNPUBLISHED_QUESTIONS: &str = "unpublished_questions";
pub const BULK_UPLOADS: &str = "bulk_uploads";

pub type StoreResult<T> = Result<T, StoreError>;

/// Error for document persistence, queries and watches.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// The database was written by a newer build.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The `documents` table does not have the expected shape.
    SchemaMismatch(String),
    NotFound { collection: String, id: String },
    InvalidQuery(String),
    InvalidData(String),
    /// A thread panicked while holding a store lock.
    Poisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "document store sqlite error: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "document store schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::SchemaMismatch(message) => write!(f, "document store schema mismatch: {message}"),
            Self::NotFound { collection, id } => {
                write!(f, "document not found: {collection}/{id}")
            }
            Self::InvalidQuery(message) => write!(f, "invalid document query: {message}"),
            Self::InvalidData(message) => write!(f, "invalid document data: {message}"),
            Self::Poisoned => write!(f, "document store lock poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Handle returned by [`DocumentStore::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub u64);

/// Receives result-set snapshots for one watch.
///
/// Sinks run on the writing thread and must not call back into the store.
pub type SnapshotSink = Arc<dyn Fn(StoreResult<Vec<Document>>) + Send + Sync>;

/// Reads and writes available inside [`DocumentStore::run_transaction`].
pub trait Transaction {
    fn get(&mut self, collection: &str, id: &str) -> StoreResult<Option<Document>>;
    fn set(&mut self, collection: &str, id: &str, data: &Value) -> StoreResult<()>;
    fn delete(&mut self, collection: &str, id: &str) -> StoreResult<()>;
}

/// Collection-oriented document database.
pub trait DocumentStore: Send + Sync {
    /// Generates a fresh unique document id without writing anything.
    fn create_id(&self) -> String;
    /// Inserts a document under a store-generated id and returns that id.
    fn create_doc(&self, collection: &str, data: &Value) -> StoreResult<String>;
    fn set_doc(&self, collection: &str, id: &str, data: &Value) -> StoreResult<()>;
    fn get_doc(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;
    fn delete_doc(&self, collection: &str, id: &str) -> StoreResult<()>;
    /// Returns documents matching every condition, in insertion order.
    fn query(&self, collection: &str, params: &QueryParams) -> StoreResult<Vec<Document>>;
    fn watch(
        &self,
        collection: &str,
        params: &QueryParams,
        sink: SnapshotSink,
    ) -> StoreResult<WatchId>;
    /// Cancels a watch. Returns `false` when the id was unknown.
    fn unwatch(&self, id: WatchId) -> bool;
    fn run_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn Transaction) -> StoreResult<()>,
    ) -> StoreResult<()>;
}
