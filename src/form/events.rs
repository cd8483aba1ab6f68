//! Event system for form synchronization.
//!
//! This module defines the notifications a form emits while it moves data between controls and
//! the server-data map, the handler trait applications implement to observe them, and the
//! dispatcher that fans each event out to every registered handler. Handlers decouple the form
//! engine from whatever the page does in response (alert boxes, status banners, test recorders).

use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::FormError;
use crate::validation::ValidationContext;

/// Events that occur while binding a form
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FormEvent {
    /// Server data arrived for a key no control claims
    UnmanagedServerData { field: String },
    /// A previously unmanaged key is now bound to a control
    NewManagedServerData { field: String },
    /// A control's value changed; `valid` is set when change validation ran
    DataChanged { field: String, valid: Option<bool> },
    /// A whole-form validation pass failed
    ValidationFailure {
        context: ValidationContext,
        fields: Vec<String>,
    },
    /// Initial data has been loaded and pushed into the controls
    StartupComplete,
}

/// Trait for handling form events.
///
/// Implementors receive every event and may perform side effects.
pub trait FormEventHandler {
    /// Handle a form event.
    fn handle(&mut self, event: &FormEvent) -> Result<(), FormError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order for each event.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn FormEventHandler>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a new event handler.
    pub fn register_handler(&mut self, handler: Box<dyn FormEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from running.
    pub fn dispatch(&mut self, event: &FormEvent) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event) {
                tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }
}

/// Adapter turning a closure into a named handler.
pub struct FnHandler<F> {
    name: &'static str,
    callback: F,
}

impl<F> FnHandler<F>
where
    F: FnMut(&FormEvent) -> Result<(), FormError>,
{
    pub fn new(name: &'static str, callback: F) -> Self {
        Self { name, callback }
    }
}

impl<F> FormEventHandler for FnHandler<F>
where
    F: FnMut(&FormEvent) -> Result<(), FormError>,
{
    fn handle(&mut self, event: &FormEvent) -> Result<(), FormError> {
        (self.callback)(event)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Handler that records every event it sees.
///
/// Clones share the same log, so one copy can be registered while another is inspected.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<FormEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FormEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Count recorded events matching a predicate.
    pub fn count(&self, predicate: impl Fn(&FormEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| predicate(e)).count()
    }
}

impl FormEventHandler for EventLog {
    fn handle(&mut self, event: &FormEvent) -> Result<(), FormError> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "event_log"
    }
}
