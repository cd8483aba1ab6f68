//! Widgets
//!
//! A widget builds its own controls, registers them with the form, attaches validation and
//! reacts to changes of the fields it owns. List coordinators are widgets whose children are
//! widgets, which is what lets lists nest.
//!
//! - `text`: a single text-like control (input, textarea or checkbox).
//! - `list`: a repeating list of child widgets with add, delete and reorder.

/// Repeating list coordinator
pub mod list;
/// Single-control text widget
pub mod text;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FormError;
use crate::form::Form;
use crate::identifier::rewrite_flat;

pub use list::{ChildFactory, ListUiState, ListWidget};
pub use text::{TextWidget, ValidationDisplay};

/// A validation rule declared in widget configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub validator: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Widget configuration, using the dashed keys pages declare
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WidgetConfig {
    pub id: Option<String>,
    pub field: Option<String>,
    pub label: Option<String>,
    /// Field that mirrors this widget's value whenever it changes
    pub label_field: Option<String>,
    #[serde(rename = "type")]
    pub input_type: Option<String>,
    /// Present (with optional rows/cols) to request a textarea
    pub textarea: Option<Value>,
    pub class_list: Option<String>,
    pub default_value: Option<String>,
    pub checked: Option<bool>,
    pub mandatory: bool,
    pub mandatory_on_save: bool,
    pub validation_text: Option<String>,
    #[serde(rename = "v2Rules")]
    pub v2_rules: IndexMap<String, RuleConfig>,
    pub json_data_url: Option<String>,
    pub base_field: Option<String>,
    pub sub_fields: IndexMap<String, String>,
    pub min_size: Option<u32>,
    pub max_size: Option<u32>,
    /// Raw configuration for each list row, before sub-field names are expanded
    pub child_config: Option<Map<String, Value>>,
    pub empty_message: Option<String>,
}

impl WidgetConfig {
    pub fn from_value(value: Value) -> Result<Self, FormError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// A page component that manages one or more form fields.
pub trait Widget {
    fn id(&self) -> &str;

    fn config(&self) -> &WidgetConfig;

    /// Store support data fetched from `json-data-url` before the UI is built.
    fn set_json_data(&mut self, _data: Value) {}

    /// Create controls, register fields and attach validation.
    fn build_ui(&mut self, form: &mut Form) -> Result<(), FormError>;

    /// One of this widget's fields changed.
    fn change(&mut self, _form: &mut Form, _field: &str, _valid: Option<bool>) {}

    /// Whether the widget currently shows a validation failure.
    fn is_in_error(&self) -> bool {
        false
    }

    /// Stop managing every field and remove the controls.
    fn delete_widget(&mut self, form: &mut Form);

    /// Rewrite the list index `from` to `to` at `depth` in every identifier this widget holds.
    ///
    /// Fields are unregistered here and re-registered by `refresh_registration`, so a whole
    /// list can be renumbered without two rows ever claiming the same identifier.
    fn dom_update(&mut self, form: &mut Form, from: u32, to: u32, depth: usize);

    /// Re-register fields renamed by `dom_update`.
    fn refresh_registration(&mut self, form: &mut Form);

    /// Identifiers of every field this widget (and its descendants) manages.
    fn fields(&self) -> Vec<String>;

    /// This widget or the descendant with the given id.
    fn find_mut(&mut self, id: &str) -> Option<&mut dyn Widget>;
}

/// State every widget carries
#[derive(Debug, Clone)]
pub struct WidgetBase {
    id: String,
    config: WidgetConfig,
    json_data: Option<Value>,
}

impl WidgetBase {
    /// Widgets without a configured id are named after their field.
    pub fn new(config: WidgetConfig) -> Self {
        let id = config
            .id
            .clone()
            .or_else(|| config.field.as_ref().map(|f| format!("{}Container", f)))
            .or_else(|| config.base_field.as_ref().map(|f| format!("{}List", f)))
            .unwrap_or_else(|| "widget".to_string());
        Self {
            id,
            config,
            json_data: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn json_data(&self) -> Option<&Value> {
        self.json_data.as_ref()
    }

    pub fn set_json_data(&mut self, data: Value) {
        self.json_data = Some(data);
    }

    /// Rename this widget for a list renumbering.
    pub fn dom_update(&mut self, from: u32, to: u32, depth: usize) {
        self.id = rewrite_flat(&self.id, from, to, depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dashed_configuration() {
        let config = WidgetConfig::from_value(json!({
            "base-field": "authors",
            "sub-fields": {"field": "name"},
            "min-size": 2,
            "child-config": {"field": "name", "mandatory": true},
            "v2Rules": {"short": {"validator": "max-length", "params": 5}}
        }))
        .expect("config should parse");

        assert_eq!(config.base_field.as_deref(), Some("authors"));
        assert_eq!(config.sub_fields.get("field").map(String::as_str), Some("name"));
        assert_eq!(config.min_size, Some(2));
        assert!(config.child_config.is_some());
        assert_eq!(config.v2_rules["short"].validator, "max-length");
    }

    #[test]
    fn base_ids_derive_from_fields() {
        let text = WidgetBase::new(WidgetConfig {
            field: Some("title".to_string()),
            ..Default::default()
        });
        assert_eq!(text.id(), "titleContainer");

        let mut row = WidgetBase::new(WidgetConfig {
            id: Some("authors.1.nameContainer".to_string()),
            ..Default::default()
        });
        row.dom_update(1, 3, 1);
        assert_eq!(row.id(), "authors.3.nameContainer");
    }
}
