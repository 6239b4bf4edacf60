//! Outbound notifications for completed writes.

use crate::model::question::QuestionId;
use std::sync::mpsc::Sender;

/// Event pushed after a write-completing gateway operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionAction {
    /// A single save finished, or a whole bulk batch finished.
    AddQuestionSuccess,
    QuestionApproved(QuestionId),
    QuestionRejected(QuestionId),
}

/// Receiver of [`QuestionAction`]s.
pub trait ActionDispatcher: Send + Sync {
    fn dispatch(&self, action: QuestionAction);
}

/// Drops every action.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

impl ActionDispatcher for NoopDispatcher {
    fn dispatch(&self, _action: QuestionAction) {}
}

impl ActionDispatcher for Sender<QuestionAction> {
    fn dispatch(&self, action: QuestionAction) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.send(action);
    }
}
