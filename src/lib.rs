//! Form binding and validation.
//!
//! Binds page controls to a flat server-data map, keeps the two synchronized in both
//! directions, validates fields against context-scoped rule sets and coordinates repeating
//! lists whose rows are addressed by compound identifiers such as `people.2.name`.
//!
//! - `form`: controls, the field registry, synchronization, events and the submission pipeline.
//! - `validation`: the rule engine, built-in tests and inline test expressions.
//! - `widget`: text widgets and the list coordinator.
//! - `host`: startup orchestration tying the form, widgets and transport together.
//! - `transport`: JSON loading over HTTP or from memory.
//! - `pending`: tracking of outstanding asynchronous work.
//! - `identifier`: parsing and rewriting of compound field identifiers.

/// Form configuration
pub mod config;
/// Error types
pub mod error;
/// Form binding
pub mod form;
/// Startup orchestration
pub mod host;
/// Compound field identifiers
pub mod identifier;
/// Pending-work tracking
pub mod pending;
/// JSON transport
pub mod transport;
/// Utility helpers
pub mod utils;
/// Validation engine
pub mod validation;
/// Widgets
pub mod widget;

pub use config::FormConfig;
pub use error::FormError;
pub use form::{Form, FormContext, FormEvent, SyncDirection};
pub use host::FormHost;
pub use identifier::FieldPath;
pub use pending::PendingWorkTracker;
pub use validation::{ValidationContext, ValidationEngine};
pub use widget::{ListWidget, TextWidget, Widget, WidgetConfig};
