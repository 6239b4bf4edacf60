//! Question gateway core.
//!
//! Mediates between callers and the question backends: a document store with
//! live watches and transactions, a blob store for import files, and the
//! hosted search index.

pub mod blob;
pub mod config;
pub mod logging;
pub mod model;
pub mod search;
pub mod service;
pub mod store;

pub use blob::{BlobError, BlobResult, BlobStore, FsBlobStore};
pub use config::{ConfigError, GatewayConfig, LoggingConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::bulk_upload::{BulkUpload, BulkUploadFileInfo, UploadFile, BULK_STATUS_UNDER_REVIEW};
pub use model::query::{Comparator, QueryParam, QueryParams};
pub use model::question::{
    Answer, Question, QuestionId, QuestionSource, QuestionStatus, QuestionValidationError,
};
pub use model::search::{SearchCriteria, SearchResults, TagCount};
pub use search::{DailyQuestion, HttpSearchIndex, SearchError, SearchIndex, SearchResult};
pub use service::dispatch::{ActionDispatcher, NoopDispatcher, QuestionAction};
pub use service::feed::QuestionFeed;
pub use service::question_gateway::{
    BulkImportReceipt, GatewayError, GatewayResult, QuestionGateway, SaveOutcome,
};
pub use store::{
    Document, DocumentStore, SnapshotSink, SqliteDocumentStore, StoreError, StoreResult,
    Transaction, WatchId, BULK_UPLOADS, PUBLISHED_QUESTIONS, UNPUBLISHED_QUESTIONS,
};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
