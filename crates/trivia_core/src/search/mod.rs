//! Hosted search index contracts.
//!
//! # Responsibility
//! - Expose question-of-the-day and paged search over the search index.
//! - Keep HTTP details inside [`http_index`].

use crate::model::question::Question;
use crate::model::search::{SearchCriteria, SearchResults};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod http_index;

pub use http_index::HttpSearchIndex;

pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for transport, status and decoding failures.
#[derive(Debug)]
pub enum SearchError {
    /// The endpoint answered 404.
    NotFound(String),
    /// The endpoint answered a non-success status other than 404.
    Status { url: String, status: u16 },
    Transport(reqwest::Error),
    Decode(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(url) => write!(f, "search resource not found: {url}"),
            Self::Status { url, status } => {
                write!(f, "search request to {url} failed with status {status}")
            }
            Self::Transport(err) => write!(f, "search transport error: {err}"),
            Self::Decode(message) => write!(f, "invalid search response: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value)
        }
    }
}

/// Which daily question to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyQuestion {
    Current,
    Next,
}

impl DailyQuestion {
    pub fn from_next_flag(next: bool) -> Self {
        if next {
            Self::Next
        } else {
            Self::Current
        }
    }

    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Next => "next",
        }
    }
}

/// Read-only access to the hosted question index.
pub trait SearchIndex: Send + Sync {
    fn question_of_the_day(&self, which: DailyQuestion) -> SearchResult<Question>;
    /// Fetches `page_size` hits starting at `offset`.
    fn search(
        &self,
        offset: u32,
        page_size: u32,
        criteria: &SearchCriteria,
    ) -> SearchResult<SearchResults>;
}
