//! Question use-case services.
//!
//! # Responsibility
//! - Orchestrate store, blob and search calls into question use-cases.
//! - Keep callers decoupled from storage and transport details.

pub mod dispatch;
pub mod feed;
pub mod question_gateway;

use std::time::{SystemTime, UNIX_EPOCH};

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
