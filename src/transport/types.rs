//! Types for JSON transport

use async_trait::async_trait;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

/// Errors raised while fetching or parsing JSON
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from '{url}'")]
    StatusError { url: String, status: u16 },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Request to '{url}' timed out after {millis}ms")]
    Timeout { url: String, millis: u128 },

    #[error("No data returned from '{0}'")]
    NoData(String),

    #[error("A request for '{url}' is already pending for field '{field}'")]
    AlreadyPending { url: String, field: String },
}

/// Something able to fetch a JSON document by URL.
#[async_trait(?Send)]
pub trait JsonTransport {
    /// Fetch and parse the document at `url`.
    async fn fetch_json(&self, url: &str) -> Result<Value, TransportError>;

    /// Name of this transport for logging.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
enum Canned {
    Json(Value),
    Missing,
}

/// In-memory transport answering from a fixed table of documents.
///
/// Unknown URLs fail with `TransportError::NoData`. An optional per-URL delay makes it possible
/// to exercise timeouts and concurrent startup loads.
#[derive(Debug, Default)]
pub struct StaticTransport {
    documents: RefCell<HashMap<String, Canned>>,
    delays: RefCell<HashMap<String, Duration>>,
    requests: RefCell<Vec<String>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `value` for `url`.
    pub fn with_json(self, url: &str, value: Value) -> Self {
        self.insert(url, value);
        self
    }

    /// Make `url` fail.
    pub fn with_failure(self, url: &str) -> Self {
        self.documents
            .borrow_mut()
            .insert(url.to_string(), Canned::Missing);
        self
    }

    /// Delay responses for `url`.
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.borrow_mut().insert(url.to_string(), delay);
        self
    }

    pub fn insert(&self, url: &str, value: Value) {
        self.documents
            .borrow_mut()
            .insert(url.to_string(), Canned::Json(value));
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

#[async_trait(?Send)]
impl JsonTransport for StaticTransport {
    async fn fetch_json(&self, url: &str) -> Result<Value, TransportError> {
        self.requests.borrow_mut().push(url.to_string());

        let delay = self.delays.borrow().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let canned = self.documents.borrow().get(url).cloned();
        match canned {
            Some(Canned::Json(value)) => Ok(value),
            Some(Canned::Missing) | None => Err(TransportError::NoData(url.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
