//! Form synchronization.
//!
//! `Form` owns the field registry, the server-data map and the set of unmanaged keys, and moves
//! values between controls and the map in either direction:
//!
//! - **load** pushes every server-data value into its registered control; keys without a control
//!   are marked unmanaged and announced once.
//! - **save** pulls control values into the map, for one field or all of them. Saving a field
//!   that has become registered while its key was unmanaged first pulls the pending server value
//!   into the control.
//!
//! Change handling (validation on change and the `DataChanged` event) runs whenever a control's
//! state actually changes through the form.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::rc::Rc;
use tracing::{info, warn};

use super::context::FormContext;
use super::control::{ControlDocument, ControlHandle};
use super::events::FormEvent;
use super::registry::{FieldRegistry, WriteOutcome};
use super::submission::SubmissionHooks;
use crate::error::FormError;
use crate::validation::{TestProvider, ValidationEngine};

/// Flat mapping from field identifier to value, in arrival order
pub type ServerData = IndexMap<String, Value>;

/// Direction of a synchronization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Server data into controls
    Load,
    /// Controls into server data
    Save,
}

/// A bound form
pub struct Form {
    pub(crate) ctx: FormContext,
    document: Rc<dyn ControlDocument>,
    registry: FieldRegistry,
    pub(crate) server_data: ServerData,
    unmanaged: IndexSet<String>,
    pub(crate) validation: ValidationEngine,
    pub(crate) hooks: SubmissionHooks,
}

impl Form {
    pub fn new(
        ctx: FormContext,
        document: Rc<dyn ControlDocument>,
        provider: Rc<dyn TestProvider>,
    ) -> Self {
        Self {
            registry: FieldRegistry::new(ctx.clone()),
            validation: ValidationEngine::new(ctx.clone(), provider),
            ctx,
            document,
            server_data: ServerData::new(),
            unmanaged: IndexSet::new(),
            hooks: SubmissionHooks::default(),
        }
    }

    pub fn context(&self) -> &FormContext {
        &self.ctx
    }

    pub fn document(&self) -> &Rc<dyn ControlDocument> {
        &self.document
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn validation(&self) -> &ValidationEngine {
        &self.validation
    }

    pub fn validation_mut(&mut self) -> &mut ValidationEngine {
        &mut self.validation
    }

    pub fn hooks_mut(&mut self) -> &mut SubmissionHooks {
        &mut self.hooks
    }

    /// Register every control matching the configured selector. Returns how many fields were
    /// added.
    pub fn discover(&mut self) -> usize {
        let selector = self.ctx.config().selector_form_fields.clone();
        let controls = self.document.query(&selector);
        let mut added = 0;
        for control in &controls {
            if self.registry.process_control(control, self.document.as_ref()).is_some() {
                added += 1;
            }
        }
        self.ctx
            .debug(format!("Discovered {} controls matching '{}'", added, selector));
        added
    }

    /// Start managing the control with the given id, or the radio group with that name.
    ///
    /// On success the field is immediately synchronized in the save direction. If the control
    /// cannot represent pending server data for the key, registration is rolled back and the
    /// data is kept.
    pub fn add_field(&mut self, id: &str, widget: Option<&str>) -> Result<(), FormError> {
        if self.registry.contains(id) {
            warn!("Field '{}' is already in use, cannot add", id);
            return Err(FormError::DuplicateField(id.to_string()));
        }

        let by_id = self.document.by_id(id);
        if by_id.len() > 1 {
            self.ctx
                .log_error(format!("There are multiple ID '{}' elements in document", id));
            return Err(FormError::AmbiguousId(id.to_string()));
        }
        let candidates: Vec<ControlHandle> = if by_id.is_empty() {
            self.document.radio_group(id)
        } else {
            by_id
        };
        if candidates.is_empty() {
            warn!("Field '{}' could not be found by name or ID", id);
            return Err(FormError::ControlNotFound(id.to_string()));
        }

        for control in &candidates {
            self.registry.process_control(control, self.document.as_ref());
        }
        if !self.registry.contains(id) {
            self.ctx.log_error(format!("Unable to add field '{}'", id));
            return Err(FormError::Unsupported(id.to_string()));
        }
        if let Some(widget) = widget {
            self.registry.set_owner(id, widget);
        }

        if self.synch(SyncDirection::Save, Some(id)) {
            Ok(())
        } else {
            self.ignore_field(id, true)?;
            self.ctx.log_error(format!(
                "Data mismatch in field '{}'. Allowed values do not match server data",
                id
            ));
            Err(FormError::DataMismatch(id.to_string()))
        }
    }

    /// Stop managing a field.
    ///
    /// Unless `preserve_server_data` is set the field's server value is deleted. A preserved
    /// value no longer has a control, so its key becomes unmanaged.
    pub fn ignore_field(&mut self, id: &str, preserve_server_data: bool) -> Result<(), FormError> {
        if self.registry.remove(id).is_none() {
            warn!("Cannot remove field '{}', it is not managed", id);
            return Err(FormError::UnknownField(id.to_string()));
        }

        if !preserve_server_data {
            self.server_data.shift_remove(id);
            self.unmanaged.shift_remove(id);
        } else if self.server_data.contains_key(id) {
            self.mark_unmanaged(id);
        }
        Ok(())
    }

    fn mark_unmanaged(&mut self, id: &str) {
        if self.unmanaged.insert(id.to_string()) {
            self.ctx.dispatch(FormEvent::UnmanagedServerData {
                field: id.to_string(),
            });
        }
    }

    pub fn has_field(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// The control(s) backing a field.
    pub fn field(&self, id: &str) -> Option<&[ControlHandle]> {
        self.registry.controls(id)
    }

    /// Widget owning a field.
    pub fn owner_of(&self, id: &str) -> Option<&str> {
        self.registry.owner(id)
    }

    /// Current value of a field.
    pub fn value(&self, id: &str) -> Option<Value> {
        self.registry.read(id)
    }

    /// Write a value without running change handling.
    pub fn write_value(&mut self, id: &str, value: &Value) -> Result<WriteOutcome, FormError> {
        self.registry.write(id, value)
    }

    /// Write a value, running change handling if the control changed.
    ///
    /// Returns the value the control now reports, or `None` if the write was rejected.
    pub fn set_value(&mut self, id: &str, value: impl Into<Value>) -> Option<Value> {
        let outcome = self.registry.write(id, &value.into()).ok()?;
        self.after_write(id, outcome)
    }

    fn after_write(&mut self, id: &str, outcome: WriteOutcome) -> Option<Value> {
        if outcome.changed() {
            self.field_changed(id);
        }
        Some(outcome.into_value())
    }

    pub fn check(&mut self, id: &str, value: Option<&str>) -> Option<Value> {
        let outcome = self.registry.check(id, value).ok()?;
        self.after_write(id, outcome)
    }

    pub fn uncheck(&mut self, id: &str) -> Option<Value> {
        let outcome = self.registry.uncheck(id).ok()?;
        self.after_write(id, outcome)
    }

    pub fn select(&mut self, id: &str, value: &str) -> Option<Value> {
        let outcome = self.registry.select(id, value).ok()?;
        self.after_write(id, outcome)
    }

    pub fn selected(&self, id: &str) -> Option<String> {
        self.registry.selected(id)
    }

    pub fn is_selected(&self, id: &str, value: &str) -> Option<bool> {
        self.registry.is_selected(id, value)
    }

    pub fn is_checked(&self, id: &str) -> Option<bool> {
        self.registry.is_checked(id)
    }

    pub fn is_empty(&self, id: &str) -> Option<bool> {
        self.registry.is_empty_value(id)
    }

    /// Whether a field's control currently represents its server-data value.
    ///
    /// Fields without server data are trivially in sync.
    pub fn synch_test(&self, id: &str) -> bool {
        match self.server_data.get(id) {
            Some(value) => self.registry.represents(id, value).unwrap_or(false),
            None => self.registry.contains(id),
        }
    }

    /// React to a control change: validate if configured, then announce it.
    ///
    /// Returns the validation result when change validation ran.
    pub fn field_changed(&mut self, id: &str) -> Option<bool> {
        let config = self.ctx.config();
        let valid = config
            .validate_on_change
            .then_some(config.validate_on_change_type)
            .map(|context| self.validation.test_field(context, id));
        self.ctx.dispatch(FormEvent::DataChanged {
            field: id.to_string(),
            valid,
        });
        valid
    }

    /// React to a control losing focus.
    pub fn field_blurred(&mut self, id: &str) -> Option<bool> {
        let config = self.ctx.config();
        config
            .validate_on_blur
            .then_some(config.validate_on_change_type)
            .map(|context| self.validation.test_field(context, id))
    }

    /// Synchronize controls and server data.
    ///
    /// Returns false only when a single-field save could not push pending server data into a
    /// newly managed control.
    pub fn synch(&mut self, direction: SyncDirection, field: Option<&str>) -> bool {
        match direction {
            SyncDirection::Load => {
                self.load_all();
                true
            }
            SyncDirection::Save => match field {
                Some(id) => self.save_field(id),
                None => {
                    self.ctx.debug("Performing full field synch()");
                    let ids: Vec<String> = self.registry.ids().map(str::to_string).collect();
                    for id in ids {
                        self.push_value(&id);
                    }
                    true
                }
            },
        }
    }

    fn load_all(&mut self) {
        let entries: Vec<(String, Value)> = self
            .server_data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (id, value) in entries {
            if self.registry.contains(&id) {
                match self.registry.write(&id, &value) {
                    Ok(outcome) => {
                        self.after_write(&id, outcome);
                    }
                    Err(_) => {
                        self.ctx.log_error(format!(
                            "Error loading form field '{}'. Unable to assign value to GUI",
                            id
                        ));
                    }
                }
            } else {
                warn!("Unmanaged field '{}' in server data", id);
                self.mark_unmanaged(&id);
            }
        }
    }

    fn save_field(&mut self, id: &str) -> bool {
        if !self.registry.contains(id) {
            return true;
        }
        if !self.unmanaged.contains(id) {
            self.push_value(id);
            return true;
        }

        info!("Field '{}' is now managed", id);
        let value = self.server_data.get(id).cloned().unwrap_or(Value::Null);
        match self.registry.write(id, &value) {
            Ok(outcome) => {
                self.unmanaged.shift_remove(id);
                self.ctx.dispatch(FormEvent::NewManagedServerData {
                    field: id.to_string(),
                });
                self.after_write(id, outcome);
                true
            }
            Err(_) => false,
        }
    }

    /// Copy a control's value into server data, keeping an existing value the control already
    /// represents so that an untouched load/save round trip leaves the map unchanged.
    fn push_value(&mut self, id: &str) {
        if let Some(existing) = self.server_data.get(id) {
            if self.registry.represents(id, existing) == Some(true) {
                return;
            }
        }
        if let Some(value) = self.registry.read(id) {
            self.server_data.insert(id.to_string(), value);
        }
    }

    pub fn server_data(&self) -> &ServerData {
        &self.server_data
    }

    pub fn server_value(&self, id: &str) -> Option<&Value> {
        self.server_data.get(id)
    }

    /// Merge a JSON object into server data. Does not touch controls.
    pub fn merge_server_data(&mut self, data: Value) -> Result<usize, FormError> {
        let Value::Object(map) = data else {
            return Err(FormError::NotAnObject(data.to_string()));
        };
        let count = map.len();
        self.server_data.extend(map);
        Ok(count)
    }

    pub fn has_unmanaged_data(&self) -> bool {
        !self.unmanaged.is_empty()
    }

    pub fn is_unmanaged(&self, id: &str) -> bool {
        self.unmanaged.contains(id)
    }

    /// Unmanaged keys in the order they were first seen.
    pub fn unmanaged(&self) -> impl Iterator<Item = &str> {
        self.unmanaged.iter().map(String::as_str)
    }
}
