//! Live question feeds.
//!
//! # Responsibility
//! - Turn one or more store watches into a single stream of question lists.
//! - Combine constituent watches with latest-of-all semantics.
//!
//! # Invariants
//! - An emission happens only after every constituent delivered a snapshot.
//! - Each emission is the concatenation of the latest snapshot of every
//!   constituent, in constituent order. Records are not deduplicated.
//! - Dropping the feed cancels all of its watches.

use crate::model::query::QueryParams;
use crate::model::question::Question;
use crate::service::question_gateway::{GatewayError, GatewayResult};
use crate::store::{Document, DocumentStore, SnapshotSink, StoreResult, WatchId};
use log::{debug, warn};
use std::fmt::{Debug, Formatter};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

type SlotMessage = (usize, StoreResult<Vec<Document>>);

/// Stream of question lists backed by live store watches.
pub struct QuestionFeed {
    store: Arc<dyn DocumentStore>,
    watch_ids: Vec<WatchId>,
    receiver: Receiver<SlotMessage>,
    latest: Vec<Option<Vec<Question>>>,
    label: &'static str,
}

impl QuestionFeed {
    /// Registers one watch per query on `collection`.
    pub(crate) fn subscribe(
        store: Arc<dyn DocumentStore>,
        label: &'static str,
        collection: &str,
        queries: &[QueryParams],
    ) -> GatewayResult<Self> {
        if queries.is_empty() {
            return Err(GatewayError::Validation(
                "a feed needs at least one query".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel::<SlotMessage>();
        let mut feed = Self {
            store: Arc::clone(&store),
            watch_ids: Vec::with_capacity(queries.len()),
            receiver,
            latest: vec![None; queries.len()],
            label,
        };

        for (slot, params) in queries.iter().enumerate() {
            let sender = sender.clone();
            let sink: SnapshotSink = Arc::new(move |snapshot: StoreResult<Vec<Document>>| {
                let _ = sender.send((slot, snapshot));
            });
            // On error the partially built feed is dropped and unwatches.
            let watch_id = store.watch(collection, params, sink)?;
            feed.watch_ids.push(watch_id);
        }

        debug!(
            "event=feed_open module=gateway status=ok feed={label} watches={}",
            feed.watch_ids.len()
        );
        Ok(feed)
    }

    /// Number of constituent watches.
    pub fn width(&self) -> usize {
        self.watch_ids.len()
    }

    /// Blocks until the next combined emission.
    pub fn next(&mut self) -> GatewayResult<Vec<Question>> {
        loop {
            let message = self
                .receiver
                .recv()
                .map_err(|_| GatewayError::FeedClosed)?;
            if let Some(combined) = self.apply(message)? {
                return Ok(combined);
            }
        }
    }

    /// Like [`next`](Self::next) but gives up after `timeout`.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<GatewayResult<Vec<Question>>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = match self.receiver.recv_timeout(remaining) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => return Some(Err(GatewayError::FeedClosed)),
            };
            match self.apply(message) {
                Ok(Some(combined)) => return Some(Ok(combined)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }

    /// Returns the next pending emission without blocking.
    pub fn try_next(&mut self) -> Option<GatewayResult<Vec<Question>>> {
        loop {
            let message = match self.receiver.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return Some(Err(GatewayError::FeedClosed)),
            };
            match self.apply(message) {
                Ok(Some(combined)) => return Some(Ok(combined)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }

    fn apply(&mut self, (slot, snapshot): SlotMessage) -> GatewayResult<Option<Vec<Question>>> {
        let documents = snapshot.map_err(|err| {
            warn!(
                "event=feed_update module=gateway status=error feed={} slot={slot} error={err}",
                self.label
            );
            GatewayError::from(err)
        })?;

        let questions = documents
            .iter()
            .map(|doc| {
                Question::from_stored(&doc.id, &doc.data).map_err(|err| {
                    GatewayError::InvalidData(format!("question {}: {err}", doc.id))
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        if let Some(entry) = self.latest.get_mut(slot) {
            *entry = Some(questions);
        }
        if self.latest.iter().any(Option::is_none) {
            return Ok(None);
        }

        Ok(Some(self.latest.iter().flatten().flatten().cloned().collect()))
    }
}

impl Debug for QuestionFeed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionFeed")
            .field("label", &self.label)
            .field("width", &self.width())
            .field("filled", &self.latest.iter().filter(|slot| slot.is_some()).count())
            .finish()
    }
}

impl Drop for QuestionFeed {
    fn drop(&mut self) {
        for watch_id in self.watch_ids.drain(..) {
            self.store.unwatch(watch_id);
        }
        debug!(
            "event=feed_close module=gateway status=ok feed={}",
            self.label
        );
    }
}
