//! Pending work tracking.
//!
//! This module provides the `PendingWorkTracker`, which records outstanding asynchronous
//! requests (data source loads, widget JSON loads) so the form host knows when startup data has
//! fully arrived. Requests are keyed by a sequence id, optionally tagged with the field they
//! serve, and duplicate requests for the same field and description are suppressed.
//!
//! Consumers can either register a one-shot "first load" callback or await `drained()`.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::utils::{self, IdSequence};

/// A single outstanding unit of work
#[derive(Debug, Clone)]
pub struct PendingWork {
    pub id: u64,
    /// What is being fetched, usually the URL
    pub description: String,
    /// Field the work is being done for, if any
    pub field: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Proof of a started unit of work, consumed when the work finishes.
#[derive(Debug)]
#[must_use = "pending work must be completed or failed"]
pub struct WorkTicket {
    id: u64,
}

impl WorkTicket {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Counters describing the tracker's lifetime activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingStats {
    pub started: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_flight: usize,
}

impl PendingStats {
    pub fn summary(&self) -> String {
        format!(
            "{} requests started, {} completed, {} failed, {} in flight",
            self.started, self.completed, self.failed, self.in_flight
        )
    }
}

type FirstLoadCallback = Box<dyn FnOnce()>;

struct TrackerState {
    work: BTreeMap<u64, PendingWork>,
    sequence: IdSequence,
    first_load: Option<FirstLoadCallback>,
    started: usize,
    completed: usize,
    failed: usize,
}

/// Service for tracking outstanding asynchronous work
///
/// Clones share state, so the tracker can be handed to every loader in a form.
#[derive(Clone)]
pub struct PendingWorkTracker {
    state: Rc<RefCell<TrackerState>>,
    idle: Rc<watch::Sender<bool>>,
}

impl Default for PendingWorkTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingWorkTracker {
    /// Create an idle tracker.
    pub fn new() -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            state: Rc::new(RefCell::new(TrackerState {
                work: BTreeMap::new(),
                sequence: IdSequence::new(),
                first_load: None,
                started: 0,
                completed: 0,
                failed: 0,
            })),
            idle: Rc::new(idle),
        }
    }

    /// Record the start of a unit of work.
    ///
    /// Returns `None` without recording anything if work with the same description is already
    /// pending for the same field.
    pub fn start(&self, description: &str, field: Option<&str>) -> Option<WorkTicket> {
        let mut state = self.state.borrow_mut();

        if let Some(field) = field {
            let duplicate = utils::any(&state.work, |_, w| {
                w.field.as_deref() == Some(field) && w.description == description
            });
            if duplicate {
                debug!(
                    "Field '{}' already has a pending request for '{}', doing nothing",
                    field, description
                );
                return None;
            }
        }

        let id = state.sequence.next_id();
        state.work.insert(
            id,
            PendingWork {
                id,
                description: description.to_string(),
                field: field.map(str::to_string),
                started_at: Utc::now(),
            },
        );
        state.started += 1;
        drop(state);

        debug!("Starting job tracking '{}', ID '{}'", description, id);
        self.idle.send_replace(false);
        Some(WorkTicket { id })
    }

    /// Mark a unit of work as successfully finished.
    pub fn complete(&self, ticket: WorkTicket) {
        self.finish(ticket, true);
    }

    /// Mark a unit of work as failed. Failed work no longer counts as pending.
    pub fn fail(&self, ticket: WorkTicket) {
        self.finish(ticket, false);
    }

    fn finish(&self, ticket: WorkTicket, success: bool) {
        let callback = {
            let mut state = self.state.borrow_mut();
            let Some(work) = state.work.remove(&ticket.id) else {
                warn!("Attempt to end job tracking for unknown ID '{}'", ticket.id);
                return;
            };
            if success {
                state.completed += 1;
            } else {
                state.failed += 1;
            }
            debug!(
                "Ending job tracking '{}', ID '{}' after {}ms",
                work.description,
                work.id,
                (Utc::now() - work.started_at).num_milliseconds()
            );

            if state.work.is_empty() {
                state.first_load.take()
            } else {
                return;
            }
        };

        self.idle.send_replace(true);
        if let Some(callback) = callback {
            info!("All pending work finished, running first load callback");
            callback();
        }
    }

    pub fn has_work_pending(&self) -> bool {
        !self.state.borrow().work.is_empty()
    }

    /// Snapshot of the outstanding work, oldest first.
    pub fn pending(&self) -> Vec<PendingWork> {
        self.state.borrow().work.values().cloned().collect()
    }

    /// Run `callback` once the pending set drains, or immediately if nothing is pending.
    ///
    /// Replaces any callback registered earlier that has not fired yet.
    pub fn set_first_load_callback(&self, callback: impl FnOnce() + 'static) {
        let mut state = self.state.borrow_mut();
        if state.work.is_empty() {
            drop(state);
            callback();
        } else {
            state.first_load = Some(Box::new(callback));
        }
    }

    /// Wait until no work is pending.
    pub async fn drained(&self) {
        let mut idle = self.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }

    pub fn stats(&self) -> PendingStats {
        let state = self.state.borrow();
        PendingStats {
            started: state.started,
            completed: state.completed,
            failed: state.failed,
            in_flight: state.work.len(),
        }
    }
}
