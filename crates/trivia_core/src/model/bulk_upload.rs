//! Bulk import records.
//!
//! A `BulkUpload` lives only for one import call. Only its
//! `BulkUploadFileInfo` and the cloned questions are persisted.

use crate::model::question::Question;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Status string stored on a freshly imported batch.
pub const BULK_STATUS_UNDER_REVIEW: &str = "Under Review";

/// Metadata describing one batch import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadFileInfo {
    /// Batch id, assigned by the gateway during import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "created_uid")]
    pub created_uid: String,
    /// Original client-side file name.
    pub file_name: String,
    #[serde(default)]
    pub uploaded_on: Option<i64>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default)]
    pub approved: u32,
    #[serde(default)]
    pub rejected: u32,
    #[serde(default)]
    pub status: String,
    /// Blob path of the uploaded file.
    #[serde(default)]
    pub file_path: Option<String>,
}

impl BulkUploadFileInfo {
    pub fn new(created_uid: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id: None,
            created_uid: created_uid.into(),
            file_name: file_name.into(),
            uploaded_on: None,
            categories: Vec::new(),
            tags: Vec::new(),
            total_questions: 0,
            approved: 0,
            rejected: 0,
            status: String::new(),
            file_path: None,
        }
    }

    /// Encodes exactly the fields persisted in `bulk_uploads`.
    pub fn to_document(&self) -> Value {
        json!({
            "id": self.id,
            "created_uid": self.created_uid,
            "fileName": self.file_name,
            "uploadedOn": self.uploaded_on,
            "categories": self.categories,
            "tags": self.tags,
            "totalQuestions": self.total_questions,
            "approved": self.approved,
            "rejected": self.rejected,
            "status": self.status,
            "filePath": self.file_path,
        })
    }

    pub fn from_stored(id: &str, data: &Value) -> Result<Self, serde_json::Error> {
        let mut info: BulkUploadFileInfo = serde_json::from_value(data.clone())?;
        info.id = Some(id.to_string());
        Ok(info)
    }
}

/// Raw file attached to a bulk import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Transient import aggregate: metadata, parsed questions and the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkUpload {
    pub file_info: BulkUploadFileInfo,
    pub questions: Vec<Question>,
    pub file: UploadFile,
}

#[cfg(test)]
mod tests {
    use super::BulkUploadFileInfo;
    use serde_json::json;

    #[test]
    fn file_info_round_trips_through_document_shape() {
        let mut info = BulkUploadFileInfo::new("owner-1", "geo.csv");
        info.total_questions = 12;
        info.status = "Under Review".to_string();

        let doc = info.to_document();
        assert_eq!(doc["fileName"], json!("geo.csv"));
        assert_eq!(doc["created_uid"], json!("owner-1"));

        let loaded = BulkUploadFileInfo::from_stored("batch-9", &doc).unwrap();
        assert_eq!(loaded.id.as_deref(), Some("batch-9"));
        assert_eq!(loaded.total_questions, 12);
        assert_eq!(loaded.file_path, None);
    }
}
