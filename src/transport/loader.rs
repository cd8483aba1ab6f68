//! Caching JSON loader.
//!
//! Every load is registered with the shared `PendingWorkTracker` for its whole lifetime and
//! removed again on success, failure and timeout alike, so the form host can wait for startup
//! data without special-casing errors. Successful results are cached under a caller-chosen key.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{JsonTransport, TransportError};
use crate::pending::PendingWorkTracker;

/// Loads JSON documents through a transport, with caching and pending-work tracking
pub struct JsonLoader {
    transport: Rc<dyn JsonTransport>,
    tracker: PendingWorkTracker,
    cache: RefCell<HashMap<String, Value>>,
    timeout: Duration,
}

impl JsonLoader {
    pub fn new(
        transport: Rc<dyn JsonTransport>,
        tracker: PendingWorkTracker,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            tracker,
            cache: RefCell::new(HashMap::new()),
            timeout,
        }
    }

    pub fn tracker(&self) -> &PendingWorkTracker {
        &self.tracker
    }

    pub fn cached(&self, cache_index: &str) -> Option<Value> {
        self.cache.borrow().get(cache_index).cloned()
    }

    /// Fetch `url`, caching the result under the URL itself.
    pub async fn load_json(&self, url: &str) -> Result<Value, TransportError> {
        self.get_json(url, url, false, None).await
    }

    /// Fetch `url` on behalf of an optional field.
    ///
    /// A cached document under `cache_index` is returned without a request unless `skip_cache`
    /// is set. Requests duplicating one already pending for the same field are refused with
    /// `TransportError::AlreadyPending`.
    pub async fn get_json(
        &self,
        cache_index: &str,
        url: &str,
        skip_cache: bool,
        field: Option<&str>,
    ) -> Result<Value, TransportError> {
        if !skip_cache {
            if let Some(value) = self.cached(cache_index) {
                debug!("Serving '{}' from cache", cache_index);
                return Ok(value);
            }
        }

        let Some(ticket) = self.tracker.start(url, field) else {
            return Err(TransportError::AlreadyPending {
                url: url.to_string(),
                field: field.unwrap_or_default().to_string(),
            });
        };

        let result = match tokio::time::timeout(self.timeout, self.transport.fetch_json(url)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                url: url.to_string(),
                millis: self.timeout.as_millis(),
            }),
        };

        match &result {
            Ok(value) => {
                self.cache
                    .borrow_mut()
                    .insert(cache_index.to_string(), value.clone());
                self.tracker.complete(ticket);
            }
            Err(e) => {
                warn!(
                    "Error accessing '{}' via {} transport: {}",
                    url,
                    self.transport.name(),
                    e
                );
                self.tracker.fail(ticket);
            }
        }

        result
    }

    /// Parse a JSON string and store it in the cache under `cache_index`.
    pub fn parse_json(&self, cache_index: &str, text: &str) -> Result<Value, TransportError> {
        let value: Value = serde_json::from_str(text)?;
        self.cache
            .borrow_mut()
            .insert(cache_index.to_string(), value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StaticTransport;
    use serde_json::json;

    fn loader(transport: StaticTransport, timeout: Duration) -> (JsonLoader, Rc<StaticTransport>) {
        let transport = Rc::new(transport);
        let loader = JsonLoader::new(transport.clone(), PendingWorkTracker::new(), timeout);
        (loader, transport)
    }

    #[tokio::test]
    async fn caches_successful_loads() {
        let (loader, transport) = loader(
            StaticTransport::new().with_json("data.json", json!({"a": "1"})),
            Duration::from_secs(1),
        );

        let first = loader.load_json("data.json").await.expect("should load");
        let second = loader.load_json("data.json").await.expect("should load");

        assert_eq!(first, second);
        assert_eq!(transport.requests().len(), 1);
        assert!(!loader.tracker().has_work_pending());
    }

    #[tokio::test]
    async fn skip_cache_refetches() {
        let (loader, transport) = loader(
            StaticTransport::new().with_json("data.json", json!([1, 2])),
            Duration::from_secs(1),
        );

        loader.load_json("data.json").await.expect("should load");
        loader
            .get_json("data.json", "data.json", true, None)
            .await
            .expect("should load");

        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn failures_clear_pending_work() {
        let (loader, _) = loader(
            StaticTransport::new().with_failure("broken.json"),
            Duration::from_secs(1),
        );

        let err = loader.load_json("broken.json").await.unwrap_err();

        assert!(matches!(err, TransportError::NoData(_)));
        assert!(!loader.tracker().has_work_pending());
        assert_eq!(loader.tracker().stats().failed, 1);
        assert_eq!(loader.cached("broken.json"), None);
    }

    #[tokio::test]
    async fn slow_requests_time_out() {
        let (loader, _) = loader(
            StaticTransport::new()
                .with_json("slow.json", json!({}))
                .with_delay("slow.json", Duration::from_secs(5)),
            Duration::from_millis(20),
        );

        let err = loader.load_json("slow.json").await.unwrap_err();

        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(!loader.tracker().has_work_pending());
    }

    #[test]
    fn parse_json_populates_cache() {
        let (loader, _) = loader(StaticTransport::new(), Duration::from_secs(1));
        loader
            .parse_json("inline", r#"{"x": true}"#)
            .expect("should parse");
        assert_eq!(loader.cached("inline"), Some(json!({"x": true})));
        assert!(matches!(
            loader.parse_json("bad", "{"),
            Err(TransportError::JsonError(_))
        ));
    }
}
