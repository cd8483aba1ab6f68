//! Transport module for loading JSON documents
//!
//! This module provides the transport abstraction the form host uses to fetch its data source
//! and widget support data, an HTTP implementation backed by `reqwest`, an in-memory
//! implementation for tests and offline pages, and the caching loader that ties requests into the
//! pending-work tracker.

/// HTTP client implementation of the transport
mod client;
/// Caching JSON loader with pending-work integration
mod loader;
/// Transport trait, error type and the static implementation
mod types;

pub use client::HttpTransport;
pub use loader::JsonLoader;
pub use types::*;
