//! Field registry.
//!
//! Tracks every control the form manages, classified by how its value is read and written, and
//! records which widget (if any) owns each field. All value access goes through the registry so
//! that checkboxes, radio groups, selects and free-text controls present one uniform surface.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::context::FormContext;
use super::control::{ControlDocument, ControlHandle, ElementKind, FieldKind, InputType};
use crate::error::FormError;
use crate::utils::{scalar_text, truthy};

/// Marker a checkbox reports, and accepts, for "not checked".
pub const UNCHECKED: &str = "null";

/// A registered field
#[derive(Clone)]
pub struct FieldEntry {
    pub kind: FieldKind,
    /// One control, or every member of a radio group
    pub controls: Vec<ControlHandle>,
}

/// Result of writing a value into a control
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The control state changed; carries the value the control now reports
    Changed(Value),
    /// The control already held the value
    Unchanged(Value),
}

impl WriteOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, WriteOutcome::Changed(_))
    }

    pub fn value(&self) -> &Value {
        match self {
            WriteOutcome::Changed(v) | WriteOutcome::Unchanged(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            WriteOutcome::Changed(v) | WriteOutcome::Unchanged(v) => v,
        }
    }
}

/// Registry of managed fields
pub struct FieldRegistry {
    ctx: FormContext,
    fields: IndexMap<String, FieldEntry>,
    owners: HashMap<String, String>,
}

impl FieldRegistry {
    pub fn new(ctx: FormContext) -> Self {
        Self {
            ctx,
            fields: IndexMap::new(),
            owners: HashMap::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fields.contains_key(id)
    }

    pub fn kind(&self, id: &str) -> Option<FieldKind> {
        self.fields.get(id).map(|entry| entry.kind)
    }

    pub fn controls(&self, id: &str) -> Option<&[ControlHandle]> {
        self.fields.get(id).map(|entry| entry.controls.as_slice())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Registered identifiers in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Registered identifiers of one kind.
    pub fn partition(&self, kind: FieldKind) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, entry)| entry.kind == kind)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn owner(&self, id: &str) -> Option<&str> {
        self.owners.get(id).map(String::as_str)
    }

    pub fn set_owner(&mut self, id: &str, widget: &str) {
        self.owners.insert(id.to_string(), widget.to_string());
    }

    /// Classify a control and register it.
    ///
    /// Returns the identifier the control is registered under, or `None` if it was skipped.
    /// Radio buttons register their whole group under the shared name, once.
    pub fn process_control(
        &mut self,
        control: &ControlHandle,
        document: &dyn ControlDocument,
    ) -> Option<String> {
        match control.element_kind() {
            ElementKind::Input => {
                let input_type = control.input_type().unwrap_or(InputType::Text);
                if input_type.is_ignored() {
                    debug!("Ignoring {:?} input {:?}", input_type, control.id());
                    return None;
                }
                match input_type {
                    InputType::Checkbox => {
                        let Some(id) = control.id() else {
                            warn!("Checkbox found without an ID, it will be ignored");
                            return None;
                        };
                        self.insert(id, FieldKind::Checkbox, vec![control.clone()])
                    }
                    InputType::Radio => {
                        let Some(name) = control.name() else {
                            warn!("Radio button found without a name, it will be ignored");
                            return None;
                        };
                        if self.fields.contains_key(&name) {
                            return Some(name);
                        }
                        let group = document.radio_group(&name);
                        self.insert(name, FieldKind::Radio, group)
                    }
                    _ => self.insert_with_id(control, FieldKind::Textual),
                }
            }
            ElementKind::Textarea => self.insert_with_id(control, FieldKind::Textual),
            ElementKind::Select => self.insert_with_id(control, FieldKind::Select),
            ElementKind::Other => {
                warn!(
                    "Unsupported element type for field {:?}, it will be ignored",
                    control.id()
                );
                None
            }
        }
    }

    fn insert_with_id(&mut self, control: &ControlHandle, kind: FieldKind) -> Option<String> {
        let Some(id) = control.id() else {
            warn!("{:?} control found without an ID, it will be ignored", kind);
            return None;
        };
        self.insert(id, kind, vec![control.clone()])
    }

    /// Register a field; the first control seen for an id wins.
    fn insert(
        &mut self,
        id: String,
        kind: FieldKind,
        controls: Vec<ControlHandle>,
    ) -> Option<String> {
        if self.fields.contains_key(&id) {
            warn!(
                "There are multiple ID '{}' elements in document, keeping the first",
                id
            );
            return None;
        }
        self.ctx
            .debug(format!("Registering {:?} field '{}'", kind, id));
        self.fields
            .insert(id.clone(), FieldEntry { kind, controls });
        Some(id)
    }

    /// Drop a field and its ownership record.
    pub fn remove(&mut self, id: &str) -> Option<FieldEntry> {
        self.owners.remove(id);
        self.fields.shift_remove(id)
    }

    fn entry(&self, id: &str) -> Result<&FieldEntry, FormError> {
        self.fields.get(id).ok_or_else(|| {
            warn!("Field '{}' does not exist", id);
            FormError::UnknownField(id.to_string())
        })
    }

    fn first(entry: &FieldEntry, id: &str) -> Result<ControlHandle, FormError> {
        entry
            .controls
            .first()
            .cloned()
            .ok_or_else(|| FormError::ControlNotFound(id.to_string()))
    }

    /// Read the current value of a field.
    pub fn read(&self, id: &str) -> Option<Value> {
        let entry = self.entry(id).ok()?;
        let value = match entry.kind {
            FieldKind::Textual => Value::String(Self::first(entry, id).ok()?.value()),
            FieldKind::Radio => entry
                .controls
                .iter()
                .find(|c| c.is_checked())
                .map(|c| Value::String(c.value()))
                .unwrap_or(Value::Null),
            FieldKind::Checkbox => {
                let control = Self::first(entry, id).ok()?;
                if control.is_checked() {
                    Value::String(control.value())
                } else {
                    Value::String(UNCHECKED.to_string())
                }
            }
            FieldKind::Select => Self::first(entry, id)
                .ok()?
                .selected()
                .map(Value::String)
                .unwrap_or(Value::Null),
        };
        Some(value)
    }

    /// Write a value into a field. A `null` value is a plain read.
    pub fn write(&self, id: &str, value: &Value) -> Result<WriteOutcome, FormError> {
        let entry = self.entry(id)?;
        if value.is_null() {
            return Ok(WriteOutcome::Unchanged(self.read(id).unwrap_or(Value::Null)));
        }

        match entry.kind {
            FieldKind::Textual => {
                let control = Self::first(entry, id)?;
                let text = scalar_text(value);
                if control.value() == text {
                    return Ok(WriteOutcome::Unchanged(Value::String(text)));
                }
                control.set_value(&text);
                Ok(WriteOutcome::Changed(Value::String(control.value())))
            }
            FieldKind::Radio => self.check(id, Some(&scalar_text(value))),
            FieldKind::Checkbox => {
                if *value == Value::Bool(false) || value.as_str() == Some(UNCHECKED) {
                    self.uncheck(id)
                } else if truthy(value) {
                    self.check(id, None)
                } else {
                    warn!("Invalid value '{}' for checkbox '{}'", value, id);
                    Err(FormError::InvalidValue {
                        field: id.to_string(),
                        value: value.to_string(),
                    })
                }
            }
            FieldKind::Select => self.select(id, &scalar_text(value)),
        }
    }

    /// Check a checkbox, or the radio member whose value matches.
    pub fn check(&self, id: &str, value: Option<&str>) -> Result<WriteOutcome, FormError> {
        let entry = self.entry(id)?;
        match entry.kind {
            FieldKind::Checkbox => {
                let control = Self::first(entry, id)?;
                if control.is_checked() {
                    return Ok(WriteOutcome::Unchanged(Value::Bool(true)));
                }
                control.set_checked(true);
                Ok(WriteOutcome::Changed(Value::String(control.value())))
            }
            FieldKind::Radio => {
                let wanted = value.ok_or_else(|| FormError::InvalidValue {
                    field: id.to_string(),
                    value: "no value given for radio group".to_string(),
                })?;
                let Some(target) = entry.controls.iter().find(|c| c.value() == wanted) else {
                    warn!("Radio group '{}' has no option '{}'", id, wanted);
                    return Err(FormError::InvalidValue {
                        field: id.to_string(),
                        value: wanted.to_string(),
                    });
                };
                if target.is_checked() {
                    return Ok(WriteOutcome::Unchanged(Value::String(wanted.to_string())));
                }
                for control in &entry.controls {
                    control.set_checked(false);
                }
                target.set_checked(true);
                Ok(WriteOutcome::Changed(Value::String(wanted.to_string())))
            }
            _ => Err(FormError::UnsupportedOperation {
                field: id.to_string(),
                operation: "check",
            }),
        }
    }

    /// Uncheck a checkbox, or clear a radio group.
    pub fn uncheck(&self, id: &str) -> Result<WriteOutcome, FormError> {
        let entry = self.entry(id)?;
        match entry.kind {
            FieldKind::Checkbox | FieldKind::Radio => {
                let mut changed = false;
                for control in entry.controls.iter().filter(|c| c.is_checked()) {
                    control.set_checked(false);
                    changed = true;
                }
                let value = match entry.kind {
                    FieldKind::Radio => Value::Null,
                    _ => Value::Bool(false),
                };
                Ok(if changed {
                    WriteOutcome::Changed(value)
                } else {
                    WriteOutcome::Unchanged(value)
                })
            }
            _ => Err(FormError::UnsupportedOperation {
                field: id.to_string(),
                operation: "uncheck",
            }),
        }
    }

    /// Select an option of a select field.
    pub fn select(&self, id: &str, value: &str) -> Result<WriteOutcome, FormError> {
        let entry = self.entry(id)?;
        if entry.kind != FieldKind::Select {
            return Err(FormError::UnsupportedOperation {
                field: id.to_string(),
                operation: "select",
            });
        }
        let control = Self::first(entry, id)?;
        if control.selected().as_deref() == Some(value) {
            return Ok(WriteOutcome::Unchanged(Value::String(value.to_string())));
        }
        if !control.select_option(value) {
            warn!("Option '{}' not found in field '{}'", value, id);
            return Err(FormError::InvalidValue {
                field: id.to_string(),
                value: value.to_string(),
            });
        }
        Ok(WriteOutcome::Changed(Value::String(value.to_string())))
    }

    pub fn selected(&self, id: &str) -> Option<String> {
        let entry = self.entry(id).ok()?;
        match entry.kind {
            FieldKind::Select => Self::first(entry, id).ok()?.selected(),
            _ => None,
        }
    }

    pub fn is_selected(&self, id: &str, value: &str) -> Option<bool> {
        let entry = self.entry(id).ok()?;
        (entry.kind == FieldKind::Select).then(|| self.selected(id).as_deref() == Some(value))
    }

    /// Checked state of a checkbox, or whether any member of a radio group is checked.
    pub fn is_checked(&self, id: &str) -> Option<bool> {
        let entry = self.entry(id).ok()?;
        match entry.kind {
            FieldKind::Checkbox | FieldKind::Radio => {
                Some(entry.controls.iter().any(|c| c.is_checked()))
            }
            _ => None,
        }
    }

    /// Whether the field holds no user data.
    pub fn is_empty_value(&self, id: &str) -> Option<bool> {
        let entry = self.entry(id).ok()?;
        Some(match entry.kind {
            FieldKind::Textual => Self::first(entry, id).ok()?.value().trim().is_empty(),
            FieldKind::Checkbox | FieldKind::Radio => !entry.controls.iter().any(|c| c.is_checked()),
            FieldKind::Select => self
                .selected(id)
                .is_none_or(|selected| selected.trim().is_empty()),
        })
    }

    /// Whether the control already represents `value`, using the same rules as `write`.
    pub fn represents(&self, id: &str, value: &Value) -> Option<bool> {
        let entry = self.entry(id).ok()?;
        let current = self.read(id)?;
        Some(match entry.kind {
            FieldKind::Checkbox => {
                let wants_checked = !(*value == Value::Bool(false)
                    || value.as_str() == Some(UNCHECKED)
                    || !truthy(value));
                self.is_checked(id)? == wants_checked
            }
            FieldKind::Radio | FieldKind::Select if value.is_null() => current.is_null(),
            _ => scalar_text(&current) == scalar_text(value),
        })
    }
}
