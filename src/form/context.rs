//! Shared form context.
//!
//! Every engine piece (registry, synchronizer, validation, widgets) holds a cheap clone of the
//! same `FormContext`. It owns the configuration, the event dispatcher and the user feedback
//! sink, and routes diagnostics through `tracing`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::Display;
use std::rc::Rc;
use tracing::{debug, error, warn};

use super::events::{EventDispatcher, FormEvent, FormEventHandler};
use crate::config::FormConfig;

/// Sink for messages the end user should see.
pub trait UserFeedback {
    fn notify(&self, message: &str);
}

/// Default feedback sink, logging under the `user_feedback` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedback;

impl UserFeedback for LogFeedback {
    fn notify(&self, message: &str) {
        warn!(target: "user_feedback", "{}", message);
    }
}

/// Feedback sink backed by a closure.
pub struct FnFeedback<F>(pub F);

impl<F: Fn(&str)> UserFeedback for FnFeedback<F> {
    fn notify(&self, message: &str) {
        (self.0)(message)
    }
}

struct ContextInner {
    config: FormConfig,
    dispatcher: RefCell<EventDispatcher>,
    queue: RefCell<VecDeque<FormEvent>>,
    late_handlers: RefCell<Vec<Box<dyn FormEventHandler>>>,
    dispatching: Cell<bool>,
    feedback: RefCell<Rc<dyn UserFeedback>>,
}

/// Handle to configuration, events and feedback shared by one form.
#[derive(Clone)]
pub struct FormContext {
    inner: Rc<ContextInner>,
}

impl FormContext {
    pub fn new(config: FormConfig) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                config,
                dispatcher: RefCell::new(EventDispatcher::new()),
                queue: RefCell::new(VecDeque::new()),
                late_handlers: RefCell::new(Vec::new()),
                dispatching: Cell::new(false),
                feedback: RefCell::new(Rc::new(LogFeedback)),
            }),
        }
    }

    pub fn config(&self) -> &FormConfig {
        &self.inner.config
    }

    /// Register an event handler. Handlers registered while an event is being
    /// delivered start receiving events once that delivery finishes.
    pub fn register_handler(&self, handler: Box<dyn FormEventHandler>) {
        match self.inner.dispatcher.try_borrow_mut() {
            Ok(mut dispatcher) => dispatcher.register_handler(handler),
            Err(_) => self.inner.late_handlers.borrow_mut().push(handler),
        }
    }

    pub fn set_feedback(&self, feedback: Rc<dyn UserFeedback>) {
        *self.inner.feedback.borrow_mut() = feedback;
    }

    /// Deliver an event to every handler.
    ///
    /// Events raised by a handler while it runs are queued and delivered after the current one.
    pub fn dispatch(&self, event: FormEvent) {
        self.inner.queue.borrow_mut().push_back(event);
        if self.inner.dispatching.replace(true) {
            return;
        }

        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.inner.dispatcher.borrow_mut().dispatch(&event);

            let late = std::mem::take(&mut *self.inner.late_handlers.borrow_mut());
            if !late.is_empty() {
                let mut dispatcher = self.inner.dispatcher.borrow_mut();
                for handler in late {
                    dispatcher.register_handler(handler);
                }
            }
        }

        self.inner.dispatching.set(false);
    }

    /// Debug diagnostics, suppressed unless debugging is enabled.
    pub fn debug(&self, message: impl Display) {
        if self.inner.config.debugging_enabled {
            debug!("{}", message);
        }
    }

    /// Log an error and surface it to the user.
    pub fn log_error(&self, message: impl Display) {
        let message = message.to_string();
        error!("{}", message);
        let feedback = self.inner.feedback.borrow().clone();
        feedback.notify(&message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormError;
    use crate::form::events::{EventLog, FnHandler};

    #[test]
    fn errors_reach_user_feedback() {
        let ctx = FormContext::new(FormConfig::default());
        let seen = Rc::new(RefCell::new(Vec::<String>::new()));
        let sink = seen.clone();
        ctx.set_feedback(Rc::new(FnFeedback(move |m: &str| {
            sink.borrow_mut().push(m.to_string())
        })));

        ctx.log_error("Unable to load form");

        assert_eq!(*seen.borrow(), vec!["Unable to load form".to_string()]);
    }

    #[test]
    fn events_raised_inside_handlers_are_queued() {
        let ctx = FormContext::new(FormConfig::default());
        let log = EventLog::new();
        let inner = ctx.clone();
        ctx.register_handler(Box::new(FnHandler::new(
            "echo",
            move |event: &FormEvent| -> Result<(), FormError> {
                if let FormEvent::UnmanagedServerData { field } = event {
                    inner.dispatch(FormEvent::NewManagedServerData {
                        field: field.clone(),
                    });
                }
                Ok(())
            },
        )));
        ctx.register_handler(Box::new(log.clone()));

        ctx.dispatch(FormEvent::UnmanagedServerData {
            field: "phone".to_string(),
        });

        assert_eq!(
            log.events(),
            vec![
                FormEvent::UnmanagedServerData {
                    field: "phone".to_string()
                },
                FormEvent::NewManagedServerData {
                    field: "phone".to_string()
                },
            ]
        );
    }
}
