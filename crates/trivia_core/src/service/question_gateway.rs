//! Question gateway use-cases.
//!
//! # Responsibility
//! - Translate question operations into document store, blob store and
//!   search index calls.
//! - Surface one result type for every operation.
//! - Notify the injected dispatcher after write-completing operations.
//!
//! # Invariants
//! - New single questions are created with `source = question`.
//! - Every bulk-imported question carries `source = bulk-question`, the shared
//!   batch id and its own fresh id.
//! - Nothing is persisted by a bulk import whose file upload failed.
//! - Approval moves a question between collections inside one transaction.

use crate::blob::{BlobError, BlobStore, FsBlobStore};
use crate::config::GatewayConfig;
use crate::model::bulk_upload::{BulkUpload, BulkUploadFileInfo, BULK_STATUS_UNDER_REVIEW};
use crate::model::query::QueryParams;
use crate::model::question::{
    Question, QuestionId, QuestionSource, QuestionStatus, QuestionValidationError,
};
use crate::model::search::{SearchCriteria, SearchResults};
use crate::search::{DailyQuestion, HttpSearchIndex, SearchError, SearchIndex};
use crate::service::dispatch::{ActionDispatcher, NoopDispatcher, QuestionAction};
use crate::service::feed::QuestionFeed;
use crate::service::now_epoch_ms;
use crate::store::{
    DocumentStore, SqliteDocumentStore, StoreError, BULK_UPLOADS, PUBLISHED_QUESTIONS,
    UNPUBLISHED_QUESTIONS,
};
use log::{error, info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Unified error for gateway operations.
#[derive(Debug)]
pub enum GatewayError {
    /// Target record or remote resource does not exist.
    NotFound(String),
    /// Caller input violates a precondition. Nothing was written.
    Validation(String),
    Store(StoreError),
    Blob(BlobError),
    Search(SearchError),
    /// A stored or remote record could not be mapped to the view model.
    InvalidData(String),
    /// The sequential writer failed part way. `committed` stay persisted.
    BulkWriteIncomplete {
        bulk_upload_id: String,
        committed: Vec<QuestionId>,
        source: StoreError,
    },
    /// Every watch behind a feed was cancelled.
    FeedClosed,
}

impl GatewayError {
    /// Whether the failure came from a backend rather than from the input.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Blob(_) | Self::Search(_) | Self::BulkWriteIncomplete { .. }
        )
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Blob(err) => write!(f, "{err}"),
            Self::Search(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid record: {message}"),
            Self::BulkWriteIncomplete {
                bulk_upload_id,
                committed,
                source,
            } => write!(
                f,
                "bulk upload {bulk_upload_id} stopped after {} committed questions: {source}",
                committed.len()
            ),
            Self::FeedClosed => write!(f, "question feed closed"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Blob(err) => Some(err),
            Self::Search(err) => Some(err),
            Self::BulkWriteIncomplete { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { collection, id } => Self::NotFound(format!("{collection}/{id}")),
            other => Self::Store(other),
        }
    }
}

impl From<SearchError> for GatewayError {
    fn from(value: SearchError) -> Self {
        match value {
            SearchError::NotFound(url) => Self::NotFound(url),
            SearchError::Decode(message) => Self::InvalidData(message),
            other => Self::Search(other),
        }
    }
}

impl From<BlobError> for GatewayError {
    fn from(value: BlobError) -> Self {
        Self::Blob(value)
    }
}

impl From<QuestionValidationError> for GatewayError {
    fn from(value: QuestionValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

/// Result of [`QuestionGateway::save_question`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub id: QuestionId,
    /// `true` when a new document was created, `false` for an overwrite.
    pub created: bool,
}

/// Result of [`QuestionGateway::save_bulk_questions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkImportReceipt {
    pub bulk_upload_id: String,
    pub file_path: String,
    /// Ids of the persisted questions, in import order.
    pub question_ids: Vec<QuestionId>,
}

/// Facade over the document store, blob store and search index.
pub struct QuestionGateway {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    search: Arc<dyn SearchIndex>,
    dispatcher: Arc<dyn ActionDispatcher>,
}

impl QuestionGateway {
    /// Creates a gateway that drops notifications.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        search: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            store,
            blobs,
            search,
            dispatcher: Arc::new(NoopDispatcher),
        }
    }

    /// Wires the SQLite store, filesystem blobs and HTTP search from config.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let store = SqliteDocumentStore::open(&config.database_path)?;
        let search = HttpSearchIndex::new(config.functions_url.trim(), config.search_timeout())?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(FsBlobStore::new(&config.blob_root)),
            Arc::new(search),
        ))
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Fetches the current or next question of the day.
    pub fn question_of_the_day(&self, next: bool) -> GatewayResult<Question> {
        Ok(self
            .search
            .question_of_the_day(DailyQuestion::from_next_flag(next))?)
    }

    /// Runs a paged search. `offset` and `page_size` are caller-supplied.
    pub fn get_questions(
        &self,
        offset: u32,
        page_size: u32,
        criteria: &SearchCriteria,
    ) -> GatewayResult<SearchResults> {
        if page_size == 0 {
            return Err(GatewayError::Validation(
                "page size must be positive".to_string(),
            ));
        }
        Ok(self.search.search(offset, page_size, criteria)?)
    }

    /// Live list of questions owned by `user_id`.
    pub fn user_questions(&self, user_id: &str, published: bool) -> GatewayResult<QuestionFeed> {
        let user_id = require_non_empty(user_id, "user id")?;
        let query = QueryParams::new().where_eq("created_uid", user_id);
        QuestionFeed::subscribe(
            Arc::clone(&self.store),
            "user_questions",
            question_collection(published),
            &[query],
        )
    }

    /// Live list of the questions imported by one bulk upload.
    pub fn bulk_upload_questions(
        &self,
        file_info: &BulkUploadFileInfo,
        published: bool,
    ) -> GatewayResult<QuestionFeed> {
        let owner = require_non_empty(&file_info.created_uid, "bulk upload owner")?;
        let bulk_upload_id = require_non_empty(
            file_info.id.as_deref().unwrap_or_default(),
            "bulk upload id",
        )?;
        let query = QueryParams::new()
            .where_eq("created_uid", owner)
            .where_eq("bulkUploadId", bulk_upload_id);
        QuestionFeed::subscribe(
            Arc::clone(&self.store),
            "bulk_upload_questions",
            question_collection(published),
            &[query],
        )
    }

    /// Live list of unpublished questions from one source.
    ///
    /// With a non-empty `status_filter` one watch is opened per status and
    /// the results are combined in filter order.
    pub fn unpublished_questions(
        &self,
        is_bulk: bool,
        status_filter: &[QuestionStatus],
    ) -> GatewayResult<QuestionFeed> {
        let source = if is_bulk {
            QuestionSource::BulkQuestion
        } else {
            QuestionSource::Question
        };

        let queries: Vec<QueryParams> = if status_filter.is_empty() {
            vec![QueryParams::new().where_eq("source", source.as_str())]
        } else {
            status_filter
                .iter()
                .map(|status| {
                    QueryParams::new()
                        .where_eq("source", source.as_str())
                        .where_eq("status", status.code())
                })
                .collect()
        };

        QuestionFeed::subscribe(
            Arc::clone(&self.store),
            "unpublished_questions",
            UNPUBLISHED_QUESTIONS,
            &queries,
        )
    }

    /// Creates or overwrites one unpublished question.
    ///
    /// Without an id a fresh id is reserved and the document is written with
    /// `source = question`. With an id the document at that id is replaced;
    /// last write wins. Drafts may be incomplete; every other status must
    /// carry question text and a correct answer.
    pub fn save_question(&self, question: &Question) -> GatewayResult<SaveOutcome> {
        if question.status == QuestionStatus::Draft {
            question.validate_owner()?;
        } else {
            question.validate()?;
        }
        if question.status == QuestionStatus::Approved {
            return Err(GatewayError::Validation(
                "approved questions cannot be saved as unpublished".to_string(),
            ));
        }

        let outcome = match question.persisted_id() {
            None => {
                let id = self.store.create_id();
                let mut record = question.clone();
                record.id = Some(id.clone());
                record.source = QuestionSource::Question;
                record.created_on.get_or_insert_with(now_epoch_ms);
                self.store
                    .set_doc(UNPUBLISHED_QUESTIONS, &id, &record.to_document())?;
                SaveOutcome { id, created: true }
            }
            Some(id) => {
                self.store
                    .set_doc(UNPUBLISHED_QUESTIONS, id, &question.to_document())?;
                SaveOutcome {
                    id: id.to_string(),
                    created: false,
                }
            }
        };

        info!(
            "event=question_save module=gateway status=ok created={}",
            outcome.created
        );
        self.dispatcher.dispatch(QuestionAction::AddQuestionSuccess);
        Ok(outcome)
    }

    /// Imports a batch: upload the file, then persist metadata and questions.
    ///
    /// # Failure behavior
    /// - Input validation or upload failure: nothing is persisted.
    /// - Metadata write failure: the uploaded file is deleted (best effort).
    /// - Question write failure: [`GatewayError::BulkWriteIncomplete`] lists
    ///   the questions already committed; they are not rolled back.
    pub fn save_bulk_questions(&self, upload: &BulkUpload) -> GatewayResult<BulkImportReceipt> {
        let owner = require_non_empty(&upload.file_info.created_uid, "bulk upload owner")?;
        let file_name = require_non_empty(&upload.file.name, "file name")?;
        if file_name.contains(['/', '\\']) {
            return Err(GatewayError::Validation(format!(
                "file name `{file_name}` must not contain path separators"
            )));
        }
        if upload.questions.is_empty() {
            return Err(GatewayError::Validation(
                "bulk upload has no questions".to_string(),
            ));
        }
        for (index, question) in upload.questions.iter().enumerate() {
            question.validate_content().map_err(|err| {
                GatewayError::Validation(format!("question #{}: {err}", index + 1))
            })?;
        }

        let bulk_upload_id = self.store.create_id();
        let blob_path = format!("bulk_upload/{owner}/{bulk_upload_id}-{file_name}");
        let file_path = self
            .blobs
            .upload(&blob_path, &upload.file.bytes)
            .map_err(|err| {
                error!(
                    "event=bulk_import module=gateway status=error stage=upload error={err}"
                );
                GatewayError::from(err)
            })?;

        let now = now_epoch_ms();
        let records: Vec<Question> = upload
            .questions
            .iter()
            .map(|question| {
                let mut record = question.clone();
                record.id = Some(self.store.create_id());
                record.bulk_upload_id = Some(bulk_upload_id.clone());
                record.source = QuestionSource::BulkQuestion;
                if record.created_uid.trim().is_empty() {
                    record.created_uid = owner.to_string();
                }
                record.created_on.get_or_insert(now);
                record
            })
            .collect();

        let mut file_info = upload.file_info.clone();
        file_info.id = Some(bulk_upload_id.clone());
        file_info.file_path = Some(file_path.clone());
        file_info.total_questions = u32::try_from(records.len()).unwrap_or(u32::MAX);
        file_info.approved = 0;
        file_info.rejected = 0;
        file_info.status = BULK_STATUS_UNDER_REVIEW.to_string();
        file_info.uploaded_on.get_or_insert(now);

        if let Err(err) = self
            .store
            .set_doc(BULK_UPLOADS, &bulk_upload_id, &file_info.to_document())
        {
            error!("event=bulk_import module=gateway status=error stage=metadata error={err}");
            if let Err(cleanup_err) = self.blobs.delete(&file_path) {
                warn!(
                    "event=bulk_import module=gateway status=error stage=cleanup error={cleanup_err}"
                );
            }
            return Err(err.into());
        }

        let question_ids = self.store_questions(&records)?;
        info!(
            "event=bulk_import module=gateway status=ok questions={}",
            question_ids.len()
        );
        Ok(BulkImportReceipt {
            bulk_upload_id,
            file_path,
            question_ids,
        })
    }

    /// Writes questions one at a time, in order, as bulk questions.
    ///
    /// Each write starts only after the previous one completed. The success
    /// notification is dispatched once, after the last write.
    pub fn store_questions(&self, questions: &[Question]) -> GatewayResult<Vec<QuestionId>> {
        let mut ids = Vec::with_capacity(questions.len());
        for (index, question) in questions.iter().enumerate() {
            match question.persisted_id() {
                Some(id) => ids.push(id.to_string()),
                None => {
                    return Err(GatewayError::Validation(format!(
                        "question #{} has no id",
                        index + 1
                    )));
                }
            }
        }

        for (position, (question, id)) in questions.iter().zip(&ids).enumerate() {
            let mut document = question.to_document();
            document["source"] = Value::from(QuestionSource::BulkQuestion.as_str());

            if let Err(source) = self.store.set_doc(UNPUBLISHED_QUESTIONS, id, &document) {
                error!(
                    "event=bulk_write module=gateway status=error committed={position} total={}",
                    ids.len()
                );
                return Err(GatewayError::BulkWriteIncomplete {
                    bulk_upload_id: question.bulk_upload_id.clone().unwrap_or_default(),
                    committed: ids[..position].to_vec(),
                    source,
                });
            }
        }

        if !ids.is_empty() {
            self.dispatcher.dispatch(QuestionAction::AddQuestionSuccess);
        }
        Ok(ids)
    }

    /// Publishes a question: unpublished copy out, approved copy in, atomically.
    pub fn approve_question(&self, question: &Question) -> GatewayResult<Question> {
        let id = self.require_reviewable(question)?;
        question.validate()?;

        let mut approved = question.clone();
        approved.status = QuestionStatus::Approved;
        let document = approved.to_document();

        self.store.run_transaction(&mut |tx| {
            if tx.get(UNPUBLISHED_QUESTIONS, &id)?.is_none() {
                return Err(StoreError::NotFound {
                    collection: UNPUBLISHED_QUESTIONS.to_string(),
                    id: id.clone(),
                });
            }
            tx.set(PUBLISHED_QUESTIONS, &id, &document)?;
            tx.delete(UNPUBLISHED_QUESTIONS, &id)
        })?;

        info!("event=question_approve module=gateway status=ok");
        self.dispatcher
            .dispatch(QuestionAction::QuestionApproved(id));
        Ok(approved)
    }

    /// Marks an unpublished question as rejected with a reviewer note.
    pub fn reject_question(&self, question: &Question, reason: &str) -> GatewayResult<Question> {
        let id = self.require_reviewable(question)?;

        let mut rejected = question.clone();
        rejected.status = QuestionStatus::Rejected;
        rejected.reason = Some(reason.trim().to_string()).filter(|text| !text.is_empty());
        let document = rejected.to_document();

        self.store.run_transaction(&mut |tx| {
            if tx.get(UNPUBLISHED_QUESTIONS, &id)?.is_none() {
                return Err(StoreError::NotFound {
                    collection: UNPUBLISHED_QUESTIONS.to_string(),
                    id: id.clone(),
                });
            }
            tx.set(UNPUBLISHED_QUESTIONS, &id, &document)
        })?;

        info!("event=question_reject module=gateway status=ok");
        self.dispatcher
            .dispatch(QuestionAction::QuestionRejected(id));
        Ok(rejected)
    }

    /// Loads one unpublished question by id.
    pub fn unpublished_question(&self, id: &str) -> GatewayResult<Question> {
        let id = require_non_empty(id, "question id")?;
        let document = self
            .store
            .get_doc(UNPUBLISHED_QUESTIONS, id)?
            .ok_or_else(|| GatewayError::NotFound(format!("{UNPUBLISHED_QUESTIONS}/{id}")))?;
        Question::from_stored(&document.id, &document.data)
            .map_err(|err| GatewayError::InvalidData(format!("question {id}: {err}")))
    }

    fn require_reviewable(&self, question: &Question) -> GatewayResult<QuestionId> {
        let id = question.persisted_id().ok_or_else(|| {
            GatewayError::Validation("only persisted questions can be reviewed".to_string())
        })?;
        if question.status == QuestionStatus::Approved {
            return Err(GatewayError::Validation(format!(
                "question {id} is already approved"
            )));
        }
        Ok(id.to_string())
    }
}

fn question_collection(published: bool) -> &'static str {
    if published {
        PUBLISHED_QUESTIONS
    } else {
        UNPUBLISHED_QUESTIONS
    }
}

fn require_non_empty<'a>(value: &'a str, what: &str) -> GatewayResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::Validation(format!("{what} cannot be empty")));
    }
    Ok(trimmed)
}
