//! HTTP client for the hosted search functions.
//!
//! Endpoints, relative to the configured functions URL:
//! - `GET  /app/question/day/{current|next}`
//! - `POST /app/question/{offset}/{pageSize}` with a `SearchCriteria` body

use crate::model::question::Question;
use crate::model::search::{SearchCriteria, SearchResults};
use crate::search::{DailyQuestion, SearchError, SearchIndex, SearchResult};
use log::{info, warn};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

/// `SearchIndex` over the blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpSearchIndex {
    client: Client,
    functions_url: String,
}

impl HttpSearchIndex {
    pub fn new(functions_url: impl Into<String>, timeout: Duration) -> SearchResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, functions_url))
    }

    pub fn with_client(client: Client, functions_url: impl Into<String>) -> Self {
        let functions_url = functions_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            functions_url,
        }
    }

    pub fn daily_question_url(&self, which: DailyQuestion) -> String {
        format!(
            "{}/app/question/day/{}",
            self.functions_url,
            which.path_segment()
        )
    }

    pub fn search_url(&self, offset: u32, page_size: u32) -> String {
        format!("{}/app/question/{offset}/{page_size}", self.functions_url)
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: String,
        request: RequestBuilder,
    ) -> SearchResult<T> {
        let started_at = Instant::now();
        let response = request.send().map_err(|err| {
            warn!(
                "event=search_request module=search status=error endpoint={endpoint} duration_ms={} error_code=transport",
                started_at.elapsed().as_millis()
            );
            SearchError::from(err)
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            info!("event=search_request module=search status=not_found endpoint={endpoint}");
            return Err(SearchError::NotFound(url));
        }
        if !status.is_success() {
            warn!(
                "event=search_request module=search status=error endpoint={endpoint} http_status={}",
                status.as_u16()
            );
            return Err(SearchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.json::<T>()?;
        info!(
            "event=search_request module=search status=ok endpoint={endpoint} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(body)
    }
}

impl SearchIndex for HttpSearchIndex {
    fn question_of_the_day(&self, which: DailyQuestion) -> SearchResult<Question> {
        let url = self.daily_question_url(which);
        let request = self.client.get(&url);
        self.send_json("question_of_the_day", url, request)
    }

    fn search(
        &self,
        offset: u32,
        page_size: u32,
        criteria: &SearchCriteria,
    ) -> SearchResult<SearchResults> {
        let url = self.search_url(offset, page_size);
        let request = self.client.post(&url).json(criteria);
        self.send_json("search", url, request)
    }
}
