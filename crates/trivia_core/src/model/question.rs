//! Question and answer records.
//!
//! # Responsibility
//! - Define the view-model shape of a question and its embedded answers.
//! - Map questions to and from stored JSON documents.
//!
//! # Invariants
//! - `id` is `None` (or empty) only before first persistence.
//! - Answers are owned values; persisting a question copies them.
//! - `status` is encoded as an integer code, `source` as a kebab-case string.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Document id of a persisted question.
pub type QuestionId = String;

/// Review lifecycle of a question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum QuestionStatus {
    /// Written but not yet submitted for review.
    #[default]
    Draft,
    /// Waiting for a reviewer.
    UnderReview,
    /// Published. Terminal.
    Approved,
    /// Sent back by a reviewer.
    Rejected,
}

impl QuestionStatus {
    /// Stable integer code used in stored documents and query filters.
    pub fn code(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::UnderReview => 1,
            Self::Approved => 2,
            Self::Rejected => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Draft),
            1 => Some(Self::UnderReview),
            2 => Some(Self::Approved),
            3 => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl From<QuestionStatus> for u8 {
    fn from(value: QuestionStatus) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for QuestionStatus {
    type Error = QuestionValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_code(value).ok_or(QuestionValidationError::UnknownStatusCode(value))
    }
}

/// Where a question record came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionSource {
    /// Authored one at a time.
    #[default]
    Question,
    /// Created by a bulk import.
    BulkQuestion,
}

impl QuestionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::BulkQuestion => "bulk-question",
        }
    }
}

/// Validation failures for question records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionValidationError {
    EmptyQuestionText,
    NoAnswers,
    NoCorrectAnswer,
    EmptyOwner,
    UnknownStatusCode(u8),
}

impl Display for QuestionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyQuestionText => write!(f, "question text cannot be empty"),
            Self::NoAnswers => write!(f, "question must have at least one answer"),
            Self::NoCorrectAnswer => write!(f, "question must have at least one correct answer"),
            Self::EmptyOwner => write!(f, "question owner (created_uid) cannot be empty"),
            Self::UnknownStatusCode(code) => write!(f, "unknown question status code {code}"),
        }
    }
}

impl Error for QuestionValidationError {}

/// One answer option, embedded in its question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub answer_text: String,
    #[serde(default)]
    pub correct: bool,
}

impl Answer {
    pub fn new(answer_text: impl Into<String>, correct: bool) -> Self {
        Self {
            answer_text: answer_text.into(),
            correct,
        }
    }

    fn to_document(&self) -> Value {
        json!({
            "answerText": self.answer_text,
            "correct": self.correct,
        })
    }
}

/// View model of a trivia question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QuestionId>,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
    /// Whether answers must be shown in stored order.
    #[serde(default)]
    pub ordered: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub status: QuestionStatus,
    #[serde(default)]
    pub source: QuestionSource,
    /// Owner user id. Kept in snake case to match stored documents.
    #[serde(rename = "created_uid", default)]
    pub created_uid: String,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub created_on: Option<i64>,
    /// Batch id for bulk-imported questions.
    #[serde(default)]
    pub bulk_upload_id: Option<String>,
    /// Reviewer note attached on rejection.
    #[serde(default)]
    pub reason: Option<String>,
}

impl Question {
    /// Creates an unsaved draft question.
    pub fn new(
        created_uid: impl Into<String>,
        question_text: impl Into<String>,
        answers: Vec<Answer>,
    ) -> Self {
        Self {
            id: None,
            question_text: question_text.into(),
            answers,
            ordered: false,
            tags: Vec::new(),
            category_ids: Vec::new(),
            explanation: None,
            status: QuestionStatus::Draft,
            source: QuestionSource::Question,
            created_uid: created_uid.into(),
            created_on: None,
            bulk_upload_id: None,
            reason: None,
        }
    }

    /// Returns the id when the question has been persisted.
    ///
    /// An empty string is treated the same as a missing id.
    pub fn persisted_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Checks owner and content, as required for anything past draft.
    pub fn validate(&self) -> Result<(), QuestionValidationError> {
        self.validate_owner()?;
        self.validate_content()
    }

    pub fn validate_owner(&self) -> Result<(), QuestionValidationError> {
        if self.created_uid.trim().is_empty() {
            return Err(QuestionValidationError::EmptyOwner);
        }
        Ok(())
    }

    /// Checks text and answers only; the owner may still be assigned later.
    pub fn validate_content(&self) -> Result<(), QuestionValidationError> {
        if self.question_text.trim().is_empty() {
            return Err(QuestionValidationError::EmptyQuestionText);
        }
        if self.answers.is_empty() {
            return Err(QuestionValidationError::NoAnswers);
        }
        if !self.answers.iter().any(|answer| answer.correct) {
            return Err(QuestionValidationError::NoCorrectAnswer);
        }
        Ok(())
    }

    /// Encodes exactly the fields that are persisted for a question.
    pub fn to_document(&self) -> Value {
        json!({
            "id": self.persisted_id(),
            "questionText": self.question_text,
            "answers": self.answers.iter().map(Answer::to_document).collect::<Vec<_>>(),
            "ordered": self.ordered,
            "tags": self.tags,
            "categoryIds": self.category_ids,
            "explanation": self.explanation,
            "status": self.status.code(),
            "source": self.source.as_str(),
            "created_uid": self.created_uid,
            "createdOn": self.created_on,
            "bulkUploadId": self.bulk_upload_id,
            "reason": self.reason,
        })
    }

    /// Maps a stored document to the view model.
    ///
    /// The document key wins over any `id` field inside the payload.
    pub fn from_stored(id: &str, data: &Value) -> Result<Self, serde_json::Error> {
        let mut question: Question = serde_json::from_value(data.clone())?;
        question.id = Some(id.to_string());
        Ok(question)
    }
}
