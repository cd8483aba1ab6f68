use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

use super::{Widget, WidgetBase, WidgetConfig};
use crate::error::FormError;
use crate::form::{ControlHandle, ControlSpec, Form, InputType};
use crate::identifier::rewrite_flat;
use crate::utils::scalar_text;
use crate::validation::{DetachedRules, RuleCallback};

const DEFAULT_MANDATORY_TEXT: &str = "This field is mandatory";

/// Validation state shown next to the control
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationDisplay {
    pub in_error: bool,
    pub messages: Vec<String>,
}

/// A widget bound to a single text-like control.
pub struct TextWidget {
    base: WidgetBase,
    field: String,
    control: Option<ControlHandle>,
    display: Rc<RefCell<ValidationDisplay>>,
    label_field: Option<String>,
    /// Field id before the last `dom_update`, cleared by `refresh_registration`
    old_field: Option<String>,
    detached: Option<DetachedRules>,
}

impl TextWidget {
    pub fn new(config: WidgetConfig) -> Self {
        let field = config.field.clone().unwrap_or_default();
        let label_field = config.label_field.clone();
        Self {
            base: WidgetBase::new(config),
            field,
            label_field,
            control: None,
            display: Rc::new(RefCell::new(ValidationDisplay::default())),
            old_field: None,
            detached: None,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn messages(&self) -> Vec<String> {
        self.display.borrow().messages.clone()
    }

    pub fn json_data(&self) -> Option<&Value> {
        self.base.json_data()
    }

    fn control_spec(&self) -> ControlSpec {
        let config = self.base.config();
        let mut spec = if config.textarea.is_some() {
            ControlSpec::textarea(&self.field)
        } else {
            match config.input_type.as_deref().map(InputType::parse) {
                Some(InputType::Checkbox) => ControlSpec::checkbox(&self.field, "on")
                    .checked(config.checked.unwrap_or(false)),
                Some(input_type) => ControlSpec::input(input_type, &self.field),
                None => ControlSpec::text(&self.field),
            }
        };

        if spec.input_type != Some(InputType::Checkbox) {
            if let Some(default) = &config.default_value {
                spec = spec.with_value(default);
            }
        }
        for class in config.class_list.iter().flat_map(|c| c.split_whitespace()) {
            spec = spec.with_class(class);
        }
        spec
    }

    fn on_success(&self) -> RuleCallback {
        let display = self.display.clone();
        Box::new(move |_, _| {
            let mut display = display.borrow_mut();
            display.in_error = false;
            display.messages.clear();
            Ok(())
        })
    }

    fn on_failure(&self, messages: IndexMap<String, String>) -> RuleCallback {
        let display = self.display.clone();
        Box::new(move |_, failed| {
            let mut display = display.borrow_mut();
            display.in_error = true;
            display.messages = failed
                .iter()
                .map(|rule| {
                    messages
                        .get(rule)
                        .cloned()
                        .unwrap_or_else(|| format!("Validation rule '{}' failed.", rule))
                })
                .collect();
            Ok(())
        })
    }

    fn attach_rules(&self, form: &mut Form) -> Result<(), FormError> {
        let config = self.base.config();

        if !config.v2_rules.is_empty() {
            let mut names = Vec::with_capacity(config.v2_rules.len());
            let mut messages = IndexMap::new();
            for (name, rule) in &config.v2_rules {
                form.validation_mut()
                    .add_new_rule(name, &rule.validator, rule.params.clone())?;
                if let Some(message) = &rule.message {
                    messages.insert(name.clone(), message.clone());
                }
                names.push(name.as_str());
            }
            form.validation_mut().set_submit_rules(
                &self.field,
                &names,
                Some(self.on_success()),
                Some(self.on_failure(messages)),
            )?;
            return Ok(());
        }

        let text = config
            .validation_text
            .clone()
            .unwrap_or_else(|| DEFAULT_MANDATORY_TEXT.to_string());
        let messages = IndexMap::from([("required".to_string(), text)]);
        if config.mandatory {
            form.validation_mut().set_submit_rules(
                &self.field,
                &["required"],
                Some(self.on_success()),
                Some(self.on_failure(messages.clone())),
            )?;
        }
        if config.mandatory_on_save {
            form.validation_mut().set_save_rules(
                &self.field,
                &["required"],
                Some(self.on_success()),
                Some(self.on_failure(messages)),
            )?;
        }
        Ok(())
    }
}

impl Widget for TextWidget {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn config(&self) -> &WidgetConfig {
        self.base.config()
    }

    fn set_json_data(&mut self, data: Value) {
        self.base.set_json_data(data);
    }

    fn build_ui(&mut self, form: &mut Form) -> Result<(), FormError> {
        if self.field.is_empty() {
            return Err(FormError::WidgetError(
                "No field name provided for widget".to_string(),
            ));
        }

        let existing = form.document().by_id(&self.field);
        let (control, created) = match existing.as_slice() {
            [control] => (control.clone(), false),
            _ => (form.document().create_control(self.control_spec()), true),
        };

        if let Err(e) = form.add_field(&self.field, Some(self.base.id())) {
            if created {
                form.document().discard_control(&control);
            }
            return Err(e);
        }
        if let Err(e) = self.attach_rules(form) {
            if let Err(release) = form.ignore_field(&self.field, true) {
                warn!("Unable to release '{}' after a failed build: {}", self.field, release);
            }
            form.validation_mut().detach(&self.field);
            if created {
                form.document().discard_control(&control);
            }
            return Err(e);
        }

        self.control = Some(control);
        debug!("Widget '{}' bound to field '{}'", self.base.id(), self.field);
        Ok(())
    }

    fn change(&mut self, form: &mut Form, field: &str, valid: Option<bool>) {
        if field != self.field {
            return;
        }
        if let Some(valid) = valid {
            let mut display = self.display.borrow_mut();
            display.in_error = !valid;
            if valid {
                display.messages.clear();
            }
        }

        let Some(label_field) = &self.label_field else {
            return;
        };
        let label = form
            .value(&self.field)
            .map(|value| scalar_text(&value))
            .unwrap_or_default();
        if let Err(e) = form.write_value(label_field, &Value::String(label)) {
            warn!("Unable to update label field '{}': {}", label_field, e);
        }
    }

    fn is_in_error(&self) -> bool {
        self.display.borrow().in_error
    }

    fn delete_widget(&mut self, form: &mut Form) {
        if form.has_field(&self.field) {
            if let Err(e) = form.ignore_field(&self.field, false) {
                warn!("Widget '{}' could not release '{}': {}", self.base.id(), self.field, e);
            }
        }
        form.validation_mut().detach(&self.field);
        self.control = None;
        form.document().remove_control(&self.field);
    }

    fn dom_update(&mut self, form: &mut Form, from: u32, to: u32, depth: usize) {
        self.base.dom_update(from, to, depth);
        if let Some(label_field) = &mut self.label_field {
            *label_field = rewrite_flat(label_field, from, to, depth);
        }
        let renamed = rewrite_flat(&self.field, from, to, depth);
        if renamed == self.field {
            return;
        }

        if form.has_field(&self.field) {
            if let Err(e) = form.ignore_field(&self.field, false) {
                warn!("Unable to release '{}' for renaming: {}", self.field, e);
            }
        }
        self.detached = form.validation_mut().detach(&self.field);
        if let Some(control) = &self.control {
            control.set_id(&renamed);
        }
        let previous = std::mem::replace(&mut self.field, renamed);
        self.old_field.get_or_insert(previous);
    }

    fn refresh_registration(&mut self, form: &mut Form) {
        let Some(old) = self.old_field.take() else {
            return;
        };
        if let Err(e) = form.add_field(&self.field, Some(self.base.id())) {
            form.context().log_error(format!(
                "Unable to re-register '{}' (was '{}'): {}",
                self.field, old, e
            ));
        }
        if let Some(rules) = self.detached.take() {
            form.validation_mut().attach(&self.field, rules);
        }
    }

    fn fields(&self) -> Vec<String> {
        vec![self.field.clone()]
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut dyn Widget> {
        if self.base.id() == id {
            Some(self as &mut dyn Widget)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormConfig;
    use crate::form::{Control, FormContext, MemoryDocument, SyncDirection};
    use crate::validation::{StandardTests, ValidationContext};
    use serde_json::json;

    fn form() -> (Form, Rc<MemoryDocument>) {
        let doc = Rc::new(MemoryDocument::new());
        let provider = Rc::new(StandardTests::new(doc.clone()));
        let form = Form::new(FormContext::new(FormConfig::default()), doc.clone(), provider);
        (form, doc)
    }

    fn widget(config: Value) -> TextWidget {
        TextWidget::new(WidgetConfig::from_value(config).expect("config should parse"))
    }

    #[test]
    fn builds_control_and_registers_field() {
        let (mut form, doc) = form();
        let mut title = widget(json!({
            "field": "title",
            "default-value": "Untitled",
            "class-list": "wide bound-field"
        }));

        title.build_ui(&mut form).expect("should build");

        let control = doc.get("title").expect("control should exist");
        assert!(control.has_class("wide"));
        assert_eq!(form.value("title"), Some(json!("Untitled")));
        assert_eq!(form.owner_of("title"), Some("titleContainer"));
    }

    #[test]
    fn missing_field_is_a_widget_error() {
        let (mut form, _) = form();
        let mut nameless = widget(json!({"label": "Nothing"}));
        assert!(matches!(
            nameless.build_ui(&mut form),
            Err(FormError::WidgetError(_))
        ));
    }

    #[test]
    fn failed_registration_leaves_document_untouched() {
        let (mut form, doc) = form();
        doc.add(ControlSpec::text("dup"));
        doc.add(ControlSpec::text("dup"));
        let mut dup = widget(json!({"field": "dup"}));

        let result = dup.build_ui(&mut form);

        assert!(matches!(result, Err(FormError::AmbiguousId(_))));
        assert_eq!(doc.len(), 2);
        assert!(!form.has_field("dup"));
    }

    #[test]
    fn failed_rules_release_field_and_created_control() {
        let (mut form, doc) = form();
        form.merge_server_data(json!({"code": "abc"}))
            .expect("should merge");
        form.synch(SyncDirection::Load, None);
        let mut code = widget(json!({
            "field": "code",
            "v2Rules": {"odd": {"validator": "no-such-test"}}
        }));

        assert!(code.build_ui(&mut form).is_err());

        assert!(doc.is_empty());
        assert!(!form.has_field("code"));
        assert!(form.is_unmanaged("code"));
        assert_eq!(form.server_value("code"), Some(&json!("abc")));
    }

    #[test]
    fn failed_rules_keep_existing_control() {
        let (mut form, doc) = form();
        doc.add(ControlSpec::text("code"));
        let mut code = widget(json!({
            "field": "code",
            "v2Rules": {"odd": {"validator": "no-such-test"}}
        }));

        assert!(code.build_ui(&mut form).is_err());
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn checkbox_type_creates_checkbox() {
        let (mut form, doc) = form();
        let mut agree = widget(json!({"field": "agree", "type": "checkbox", "checked": true}));
        agree.build_ui(&mut form).expect("should build");

        assert!(doc.get("agree").expect("control should exist").is_checked());
        assert_eq!(form.value("agree"), Some(json!("on")));
    }

    #[test]
    fn mandatory_flags_attach_required_rules() {
        let (mut form, doc) = form();
        let mut name = widget(json!({
            "field": "name",
            "mandatory": true,
            "mandatory-on-save": true,
            "validation-text": "Name please"
        }));
        name.build_ui(&mut form).expect("should build");

        assert!(!form.validation_mut().ok_to_submit());
        assert!(name.is_in_error());
        assert_eq!(name.messages(), vec!["Name please".to_string()]);
        assert!(form.validation().rules_for(ValidationContext::Save, "name").is_some());

        doc.get("name").expect("control should exist").set_value("Ada");
        assert!(form.validation_mut().ok_to_submit());
        assert!(!name.is_in_error());
    }

    #[test]
    fn v2_rules_take_precedence_with_messages() {
        let (mut form, _) = form();
        let mut code = widget(json!({
            "field": "code",
            "mandatory": true,
            "default-value": "toolong",
            "v2Rules": {
                "short": {"validator": "max-length", "params": 4, "message": "Too long"},
                "digits": {"validator": "pattern", "params": "^[0-9]+$"}
            }
        }));
        code.build_ui(&mut form).expect("should build");

        assert!(!form.validation_mut().ok_to_submit());
        assert_eq!(
            code.messages(),
            vec![
                "Too long".to_string(),
                "Validation rule 'digits' failed.".to_string()
            ]
        );
        assert_eq!(
            form.validation().rules_for(ValidationContext::Submit, "code"),
            Some(&["short".to_string(), "digits".to_string()][..])
        );
    }

    #[test]
    fn rename_moves_field_and_rules() {
        let (mut form, doc) = form();
        let mut row = widget(json!({
            "id": "people.1.nameContainer",
            "field": "people.1.name",
            "mandatory": true,
            "default-value": "Ada"
        }));
        row.build_ui(&mut form).expect("should build");

        row.dom_update(&mut form, 1, 2, 1);
        assert!(!form.has_field("people.1.name"));
        row.refresh_registration(&mut form);

        assert_eq!(row.field(), "people.2.name");
        assert_eq!(row.id(), "people.2.nameContainer");
        assert!(doc.get("people.2.name").is_some());
        assert_eq!(form.owner_of("people.2.name"), Some("people.2.nameContainer"));
        assert_eq!(form.server_value("people.2.name"), Some(&json!("Ada")));
        assert!(form.server_value("people.1.name").is_none());
        assert!(
            form.validation()
                .rules_for(ValidationContext::Submit, "people.2.name")
                .is_some()
        );
    }

    #[test]
    fn change_mirrors_value_into_label_field() {
        let (mut form, doc) = form();
        doc.add(ControlSpec::text("countryLabel"));
        form.add_field("countryLabel", None).expect("should add");
        let mut country = widget(json!({"field": "country", "label-field": "countryLabel"}));
        country.build_ui(&mut form).expect("should build");

        doc.get("country").expect("control should exist").set_value("Aotearoa");
        country.change(&mut form, "country", Some(true));
        assert_eq!(form.value("countryLabel"), Some(json!("Aotearoa")));

        country.change(&mut form, "countryLabel", Some(false));
        assert!(!country.is_in_error());
    }

    #[test]
    fn delete_releases_field_and_control() {
        let (mut form, doc) = form();
        let mut title = widget(json!({"field": "title", "default-value": "x"}));
        title.build_ui(&mut form).expect("should build");

        title.delete_widget(&mut form);

        assert!(!form.has_field("title"));
        assert!(form.server_value("title").is_none());
        assert!(doc.is_empty());
    }
}
