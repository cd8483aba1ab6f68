//! Save and submit pipelines.
//!
//! Both pipelines share one shape: validate (unless the caller vouches for the data), ask the
//! pre-hook whether to proceed, then on a go-ahead push every control into server data, hand
//! the map to the transport action and finally run the post-hook. When the pre-hook is absent
//! or declines to decide, the form proceeds only if it is valid and holds no unmanaged data.

use tracing::warn;

use super::sync::{Form, ServerData, SyncDirection};
use crate::error::FormError;

/// Which pipeline is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Save,
    Submit,
}

/// What hooks get to look at
#[derive(Debug, Clone, Copy)]
pub struct SubmissionRequest<'a> {
    pub kind: SubmissionKind,
    /// Server data holds keys no control manages
    pub unmanaged: bool,
    /// Validation outcome for the pipeline's context
    pub valid: bool,
    pub data: &'a ServerData,
}

/// Pre-hook: `Some(true)`/`Some(false)` decides, `None` defers to the default rule.
pub type DecisionHook = Box<dyn FnMut(&SubmissionRequest<'_>) -> Result<Option<bool>, FormError>>;

/// Transport action or post-hook.
pub type ActionHook = Box<dyn FnMut(&SubmissionRequest<'_>) -> Result<(), FormError>>;

/// Application callbacks around save and submit
#[derive(Default)]
pub struct SubmissionHooks {
    pub pre_save: Option<DecisionHook>,
    pub save_data: Option<ActionHook>,
    pub post_save: Option<ActionHook>,
    pub pre_submit: Option<DecisionHook>,
    pub submit_data: Option<ActionHook>,
    pub post_submit: Option<ActionHook>,
}

impl Form {
    /// Run the save pipeline. `trusted` skips save-context validation.
    ///
    /// Returns whether the data was handed to the save action.
    pub fn save(&mut self, trusted: bool) -> bool {
        let valid = trusted || self.validation.ok_to_save();
        self.send_data(SubmissionKind::Save, valid)
    }

    /// Run the submit pipeline, validating with submit rules.
    pub fn submit(&mut self) -> bool {
        let valid = self.validation.ok_to_submit();
        self.send_data(SubmissionKind::Submit, valid)
    }

    fn send_data(&mut self, kind: SubmissionKind, valid: bool) -> bool {
        let unmanaged = self.has_unmanaged_data();

        let decision = {
            let request = SubmissionRequest {
                kind,
                unmanaged,
                valid,
                data: &self.server_data,
            };
            let hook = match kind {
                SubmissionKind::Save => self.hooks.pre_save.as_mut(),
                SubmissionKind::Submit => self.hooks.pre_submit.as_mut(),
            };
            match hook.map(|hook| hook(&request)) {
                Some(Ok(decision)) => decision,
                Some(Err(e)) => {
                    self.ctx.log_error(format!("Pre-{:?} hook failed: {}", kind, e));
                    None
                }
                None => None,
            }
        };

        let proceed = decision.unwrap_or(!unmanaged && valid);
        if !proceed {
            self.ctx.debug(format!(
                "{:?} halted (valid: {}, unmanaged data: {})",
                kind, valid, unmanaged
            ));
            return false;
        }

        self.synch(SyncDirection::Save, None);

        let request = SubmissionRequest {
            kind,
            unmanaged,
            valid,
            data: &self.server_data,
        };
        let (action, post) = match kind {
            SubmissionKind::Save => (self.hooks.save_data.as_mut(), self.hooks.post_save.as_mut()),
            SubmissionKind::Submit => (
                self.hooks.submit_data.as_mut(),
                self.hooks.post_submit.as_mut(),
            ),
        };

        match action {
            Some(action) => {
                if let Err(e) = action(&request) {
                    self.ctx
                        .log_error(format!("{:?} action failed: {}", kind, e));
                }
            }
            None => warn!("No {:?} action configured, data was not sent", kind),
        }
        if let Some(post) = post {
            if let Err(e) = post(&request) {
                self.ctx
                    .log_error(format!("Post-{:?} hook failed: {}", kind, e));
            }
        }
        true
    }
}
