//!
//! HTTP transport for JSON documents.
//!
//! Fetches data sources and widget support data over HTTP with `reqwest`. Relative URLs are
//! resolved against an optional base URL, which mirrors how pages reference data next to
//! themselves.

use super::types::*;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// JSON-over-HTTP transport
#[derive(Clone)]
pub struct HttpTransport {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL prepended to relative request URLs.
	base_url: Option<String>,
}

impl HttpTransport {
	/// Create a new HTTP transport.
	///
	/// # Arguments
	/// * `base_url` - Optional base for resolving relative URLs.
	/// * `timeout` - Per-request timeout applied by the HTTP client.
	///
	/// # Returns
	/// A new `HttpTransport`, or a `TransportError` if the client cannot be built.
	pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, TransportError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			base_url,
		})
	}

	/// Resolve a request URL against the base URL.
	pub fn resolve(&self, url: &str) -> String {
		match &self.base_url {
			Some(base) if !url.contains("://") => {
				format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
			}
			_ => url.to_string(),
		}
	}
}

#[async_trait(?Send)]
impl JsonTransport for HttpTransport {
	/// Fetch a JSON document.
	///
	/// # Arguments
	/// * `url` - The document URL, absolute or relative to the base URL.
	///
	/// # Returns
	/// The parsed JSON body, or a `TransportError` if the request fails.
	async fn fetch_json(&self, url: &str) -> Result<Value, TransportError> {
		let target = self.resolve(url);
		debug!("GET {}", target);

		let response = self
			.http_client
			.get(&target)
			.header("Content-Type", "application/json; charset=utf-8")
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(TransportError::StatusError {
				url: target,
				status: response.status().as_u16(),
			});
		}

		let text = response.text().await?;
		if text.trim().is_empty() {
			return Err(TransportError::NoData(target));
		}

		Ok(serde_json::from_str(&text)?)
	}

	fn name(&self) -> &'static str {
		"http"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolves_relative_urls_against_base() {
		let transport = HttpTransport::new(
			Some("http://localhost:8080/forms/".to_string()),
			Duration::from_secs(1),
		)
		.expect("client should build");

		assert_eq!(
			transport.resolve("/data.json"),
			"http://localhost:8080/forms/data.json"
		);
		assert_eq!(
			transport.resolve("https://example.org/x.json"),
			"https://example.org/x.json"
		);
	}

	#[test]
	fn leaves_urls_alone_without_base() {
		let transport =
			HttpTransport::new(None, Duration::from_secs(1)).expect("client should build");
		assert_eq!(transport.resolve("data.json"), "data.json");
	}
}
