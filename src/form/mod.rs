//! Form binding module
//!
//! This module holds everything that binds page controls to a server-data map:
//!
//! - `control`: the `Control` and `ControlDocument` traits the engine uses to reach the page.
//! - `memory`: a headless `ControlDocument` for tests, demos and server-side use.
//! - `registry`: classifies controls and provides uniform value access per field kind.
//! - `sync`: the `Form` itself, synchronizing controls and server data in both directions.
//! - `submission`: the save and submit pipelines with their application hooks.
//! - `events`: notifications emitted while binding, and the dispatcher delivering them.
//! - `context`: configuration, dispatcher and user feedback shared by every component.

/// Shared configuration, events and feedback
pub mod context;
/// Control and document abstractions
pub mod control;
/// Form event types and dispatch
pub mod events;
/// Headless control document
pub mod memory;
/// Field registry and value access
pub mod registry;
/// Save and submit pipelines
pub mod submission;
/// Control and server-data synchronization
pub mod sync;

pub use context::{FnFeedback, FormContext, LogFeedback, UserFeedback};
pub use control::{
    Control, ControlDocument, ControlHandle, ControlSpec, ElementKind, FieldKind, InputType,
};
pub use events::{EventDispatcher, EventLog, FnHandler, FormEvent, FormEventHandler};
pub use memory::{MemoryControl, MemoryDocument};
pub use registry::{FieldRegistry, WriteOutcome};
pub use submission::{
    ActionHook, DecisionHook, SubmissionHooks, SubmissionKind, SubmissionRequest,
};
pub use sync::{Form, ServerData, SyncDirection};
