//! Question domain model.
//!
//! # Responsibility
//! - Define question, answer and bulk-upload records shared by the gateway.
//! - Own the explicit document encoding of every persisted record.
//!
//! # Invariants
//! - A persisted question has a non-empty, immutable `id`.
//! - Records created by bulk import carry `QuestionSource::BulkQuestion`.

pub mod bulk_upload;
pub mod query;
pub mod question;
pub mod search;
