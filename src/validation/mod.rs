//! Validation engine
//!
//! Rules are attached to fields per context (`save` or `submit`) and evaluated on demand:
//!
//! - `provider`: the traits through which tests and live field values are resolved, plus the
//!   default `StandardTests` provider with the built-in tests.
//! - `expr`: the inline test expression compiler.
//!
//! A rule name either refers to a rule defined with `add_new_rule` (a test plus parameters) or
//! is the bare name of a provider test. Every rule for a field runs on every pass; failures are
//! collected and reported together.

/// Inline test expressions
pub mod expr;
/// Test and field resolution
pub mod provider;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::warn;

use crate::error::FormError;
use crate::form::context::FormContext;
use crate::form::events::FormEvent;

pub use expr::{ExprError, InlineTest, Scalar};
pub use provider::{DocumentField, FieldHandle, StandardTests, TestProvider, ValidationTest};

/// When a rule set applies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationContext {
    Save,
    #[default]
    Submit,
}

impl fmt::Display for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationContext::Save => f.write_str("save"),
            ValidationContext::Submit => f.write_str("submit"),
        }
    }
}

/// Errors raised while configuring validation
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Unable to find validation test named '{0}'")]
    UnknownTest(String),

    #[error("Rule '{rule}' is not known, cannot apply it to field '{field}'")]
    UnknownRule { rule: String, field: String },

    #[error("Unable to find field '{0}' to apply rules")]
    UnknownField(String),

    #[error("Field '{field}' has no {context} rules")]
    NoRuleSet {
        field: String,
        context: ValidationContext,
    },

    #[error("Expression error: {0}")]
    ExpressionError(#[from] ExprError),
}

/// Callback receiving the field id and either its failing rules or, on success, all its rules.
pub type RuleCallback = Box<dyn FnMut(&str, &[String]) -> Result<(), FormError>>;

/// A named rule: a test plus the parameters to call it with
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinition {
    pub test: String,
    pub params: Option<Value>,
}

struct ContextRules {
    rules: Vec<String>,
    on_success: Option<RuleCallback>,
    on_failure: Option<RuleCallback>,
}

/// Rule sets lifted off a field while its identifier is being rewritten.
pub struct DetachedRules(HashMap<ValidationContext, ContextRules>);

/// Which fields a validation pass covers
#[derive(Debug, Clone, Copy)]
pub enum FieldSelection<'a> {
    One(&'a str),
    Many(&'a [&'a str]),
    All,
}

/// Validation engine
pub struct ValidationEngine {
    ctx: FormContext,
    provider: Rc<dyn TestProvider>,
    rules: HashMap<String, RuleDefinition>,
    rule_sets: IndexMap<String, HashMap<ValidationContext, ContextRules>>,
    test_cache: RefCell<HashMap<String, Rc<dyn ValidationTest>>>,
    /// Provider revision the cache was filled at
    cache_revision: Cell<u64>,
}

impl ValidationEngine {
    pub fn new(ctx: FormContext, provider: Rc<dyn TestProvider>) -> Self {
        Self {
            ctx,
            provider,
            rules: HashMap::new(),
            rule_sets: IndexMap::new(),
            test_cache: RefCell::new(HashMap::new()),
            cache_revision: Cell::new(0),
        }
    }

    pub fn provider(&self) -> &Rc<dyn TestProvider> {
        &self.provider
    }

    fn lookup_test(&self, name: &str) -> Option<Rc<dyn ValidationTest>> {
        let revision = self.provider.revision();
        if self.cache_revision.replace(revision) != revision {
            self.test_cache.borrow_mut().clear();
        }
        if let Some(test) = self.test_cache.borrow().get(name) {
            return Some(test.clone());
        }
        let test = self.provider.resolve_test(name)?;
        self.test_cache
            .borrow_mut()
            .insert(name.to_string(), test.clone());
        Some(test)
    }

    /// Define a named rule invoking `test` with `params`.
    pub fn add_new_rule(
        &mut self,
        name: &str,
        test: &str,
        params: Option<Value>,
    ) -> Result<(), ValidationError> {
        if self.lookup_test(test).is_none() {
            self.ctx
                .log_error(format!("Unable to find validation test named '{}'", test));
            return Err(ValidationError::UnknownTest(test.to_string()));
        }
        self.rules.insert(
            name.to_string(),
            RuleDefinition {
                test: test.to_string(),
                params,
            },
        );
        Ok(())
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn rule(&self, name: &str) -> Option<&RuleDefinition> {
        self.rules.get(name)
    }

    /// Attach rules to a field for one context, replacing any existing set.
    ///
    /// Every rule must be a defined rule or a bare test the provider knows, and the field must
    /// resolve. Nothing is stored if either check fails.
    pub fn set_rules(
        &mut self,
        context: ValidationContext,
        field: &str,
        rules: &[&str],
        on_success: Option<RuleCallback>,
        on_failure: Option<RuleCallback>,
    ) -> Result<(), ValidationError> {
        for rule in rules {
            if !self.rules.contains_key(*rule) && self.lookup_test(rule).is_none() {
                self.ctx.log_error(format!(
                    "Rule '{}' is not known, cannot apply it to field '{}'",
                    rule, field
                ));
                return Err(ValidationError::UnknownRule {
                    rule: rule.to_string(),
                    field: field.to_string(),
                });
            }
        }

        if self.provider.resolve_field(field).is_none() {
            self.ctx
                .log_error(format!("Unable to find field '{}' to apply rules", field));
            return Err(ValidationError::UnknownField(field.to_string()));
        }

        self.rule_sets.entry(field.to_string()).or_default().insert(
            context,
            ContextRules {
                rules: rules.iter().map(|r| r.to_string()).collect(),
                on_success,
                on_failure,
            },
        );
        self.ctx.debug(format!(
            "Field '{}' now has {} rules: {:?}",
            field, context, rules
        ));
        Ok(())
    }

    pub fn set_save_rules(
        &mut self,
        field: &str,
        rules: &[&str],
        on_success: Option<RuleCallback>,
        on_failure: Option<RuleCallback>,
    ) -> Result<(), ValidationError> {
        self.set_rules(ValidationContext::Save, field, rules, on_success, on_failure)
    }

    pub fn set_submit_rules(
        &mut self,
        field: &str,
        rules: &[&str],
        on_success: Option<RuleCallback>,
        on_failure: Option<RuleCallback>,
    ) -> Result<(), ValidationError> {
        self.set_rules(ValidationContext::Submit, field, rules, on_success, on_failure)
    }

    /// Remove a field's rule set for one context.
    pub fn remove(&mut self, context: ValidationContext, field: &str) -> Result<(), ValidationError> {
        let removed = self
            .rule_sets
            .get_mut(field)
            .and_then(|sets| sets.remove(&context))
            .is_some();
        if !removed {
            warn!("Field '{}' has no {} rules to remove", field, context);
            return Err(ValidationError::NoRuleSet {
                field: field.to_string(),
                context,
            });
        }
        if self.rule_sets.get(field).is_some_and(HashMap::is_empty) {
            self.rule_sets.shift_remove(field);
        }
        Ok(())
    }

    pub fn remove_on_save(&mut self, field: &str) -> Result<(), ValidationError> {
        self.remove(ValidationContext::Save, field)
    }

    pub fn remove_on_submit(&mut self, field: &str) -> Result<(), ValidationError> {
        self.remove(ValidationContext::Submit, field)
    }

    /// Rule names attached to a field for one context.
    pub fn rules_for(&self, context: ValidationContext, field: &str) -> Option<&[String]> {
        self.rule_sets
            .get(field)
            .and_then(|sets| sets.get(&context))
            .map(|set| set.rules.as_slice())
    }

    /// Lift every rule set off a field, to be re-attached under a new identifier.
    pub fn detach(&mut self, field: &str) -> Option<DetachedRules> {
        self.rule_sets.shift_remove(field).map(DetachedRules)
    }

    pub fn attach(&mut self, field: &str, rules: DetachedRules) {
        self.rule_sets.insert(field.to_string(), rules.0);
    }

    fn run_rule(&self, rule: &str, field: &str) -> bool {
        let (test_name, params) = match self.rules.get(rule) {
            Some(definition) => (definition.test.as_str(), definition.params.as_ref()),
            None => (rule, None),
        };
        let Some(test) = self.lookup_test(test_name) else {
            warn!("Validation test '{}' not found for field '{}'", test_name, field);
            return false;
        };
        let Some(handle) = self.provider.resolve_field(field) else {
            warn!("Field '{}' not found for validation", field);
            return false;
        };
        test.run(handle.as_ref(), params)
    }

    /// Validate one field and notify its callbacks. Fields without rules pass.
    pub fn test_field(&mut self, context: ValidationContext, field: &str) -> bool {
        let Some(rules) = self.rules_for(context, field).map(<[String]>::to_vec) else {
            return true;
        };

        let failures: Vec<String> = rules
            .iter()
            .filter(|rule| !self.run_rule(rule, field))
            .cloned()
            .collect();
        let valid = failures.is_empty();

        if let Some(set) = self
            .rule_sets
            .get_mut(field)
            .and_then(|sets| sets.get_mut(&context))
        {
            let outcome = if valid {
                set.on_success.as_mut().map(|callback| callback(field, &rules))
            } else {
                set.on_failure.as_mut().map(|callback| callback(field, &failures))
            };
            if let Some(Err(e)) = outcome {
                self.ctx
                    .log_error(format!("Validation callback for '{}' failed: {}", field, e));
            }
        }

        if !valid {
            self.ctx.debug(format!(
                "Field '{}' failed {} rules: {:?}",
                field, context, failures
            ));
        }
        valid
    }

    /// Validate several fields; true only if all pass. Every field is tested.
    pub fn test_fields(&mut self, context: ValidationContext, fields: &[&str]) -> bool {
        fields
            .iter()
            .fold(true, |valid, field| self.test_field(context, field) && valid)
    }

    /// Validate every field with rules for the context, emitting one
    /// `ValidationFailure` event listing the failures.
    pub fn test_all(&mut self, context: ValidationContext) -> bool {
        let fields: Vec<String> = self
            .rule_sets
            .iter()
            .filter(|(_, sets)| sets.contains_key(&context))
            .map(|(field, _)| field.clone())
            .collect();

        let failures: Vec<String> = fields
            .into_iter()
            .filter(|field| !self.test_field(context, field))
            .collect();

        if failures.is_empty() {
            return true;
        }
        self.ctx.dispatch(FormEvent::ValidationFailure {
            context,
            fields: failures,
        });
        false
    }

    pub fn test(&mut self, context: ValidationContext, selection: FieldSelection<'_>) -> bool {
        match selection {
            FieldSelection::One(field) => self.test_field(context, field),
            FieldSelection::Many(fields) => self.test_fields(context, fields),
            FieldSelection::All => self.test_all(context),
        }
    }

    pub fn ok_to_save(&mut self) -> bool {
        self.test_all(ValidationContext::Save)
    }

    pub fn ok_to_submit(&mut self) -> bool {
        self.test_all(ValidationContext::Submit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormConfig;
    use crate::form::control::{Control, ControlSpec};
    use crate::form::events::EventLog;
    use crate::form::memory::MemoryDocument;
    use serde_json::json;

    struct Fixture {
        doc: Rc<MemoryDocument>,
        engine: ValidationEngine,
        log: EventLog,
    }

    fn fixture() -> Fixture {
        let doc = Rc::new(MemoryDocument::new());
        let ctx = FormContext::new(FormConfig::default());
        let log = EventLog::new();
        ctx.register_handler(Box::new(log.clone()));
        let engine = ValidationEngine::new(ctx, Rc::new(StandardTests::new(doc.clone())));
        Fixture { doc, engine, log }
    }

    fn recorder() -> (Rc<RefCell<Vec<Vec<String>>>>, RuleCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let callback: RuleCallback = Box::new(move |_field, rules| {
            sink.borrow_mut().push(rules.to_vec());
            Ok(())
        });
        (seen, callback)
    }

    #[test]
    fn tests_registered_later_replace_cached_ones() {
        struct Always;

        impl ValidationTest for Always {
            fn name(&self) -> &str {
                "required"
            }

            fn run(&self, _field: &dyn FieldHandle, _params: Option<&Value>) -> bool {
                true
            }
        }

        let doc = Rc::new(MemoryDocument::new());
        doc.add(ControlSpec::text("name"));
        let provider = Rc::new(StandardTests::new(doc.clone()));
        let mut engine = ValidationEngine::new(
            FormContext::new(FormConfig::default()),
            provider.clone(),
        );
        engine
            .set_submit_rules("name", &["required"], None, None)
            .expect("rules should attach");
        assert!(!engine.ok_to_submit());

        provider.register(Rc::new(Always));

        assert!(engine.ok_to_submit());
    }

    #[test]
    fn add_new_rule_requires_known_test() {
        let mut f = fixture();
        assert!(f.engine.add_new_rule("short", "max-length", Some(json!(5))).is_ok());
        assert!(f.engine.has_rule("short"));
        assert!(matches!(
            f.engine.add_new_rule("bad", "no-such-test", None),
            Err(ValidationError::UnknownTest(_))
        ));
    }

    #[test]
    fn set_rules_rejects_unknown_rules_and_fields() {
        let mut f = fixture();
        f.doc.add(ControlSpec::text("email"));

        assert!(matches!(
            f.engine.set_submit_rules("email", &["required", "mystery"], None, None),
            Err(ValidationError::UnknownRule { .. })
        ));
        assert!(f.engine.rules_for(ValidationContext::Submit, "email").is_none());
        assert!(matches!(
            f.engine.set_submit_rules("ghost", &["required"], None, None),
            Err(ValidationError::UnknownField(_))
        ));
    }

    #[test]
    fn email_scenario_reports_failures_then_success() {
        let mut f = fixture();
        let email = f.doc.add(ControlSpec::text("email"));
        let (failed, on_failure) = recorder();
        let (passed, on_success) = recorder();
        f.engine
            .set_submit_rules("email", &["required", "email"], Some(on_success), Some(on_failure))
            .expect("rules should attach");

        assert!(!f.engine.test_field(ValidationContext::Submit, "email"));
        assert_eq!(*failed.borrow(), vec![vec!["required".to_string()]]);

        email.set_value("a@b.co");
        assert!(f.engine.test_field(ValidationContext::Submit, "email"));
        assert_eq!(
            *passed.borrow(),
            vec![vec!["required".to_string(), "email".to_string()]]
        );
    }

    #[test]
    fn all_failing_rules_are_reported() {
        let mut f = fixture();
        f.doc.add(ControlSpec::text("code").with_value("toolong!"));
        f.engine
            .add_new_rule("short", "max-length", Some(json!(4)))
            .expect("rule should be added");
        f.engine
            .add_new_rule("digits", "pattern", Some(json!("^[0-9]+$")))
            .expect("rule should be added");
        let (failed, on_failure) = recorder();
        f.engine
            .set_save_rules("code", &["short", "required", "digits"], None, Some(on_failure))
            .expect("rules should attach");

        assert!(!f.engine.ok_to_save());
        assert_eq!(
            *failed.borrow(),
            vec![vec!["short".to_string(), "digits".to_string()]]
        );
    }

    #[test]
    fn contexts_are_independent() {
        let mut f = fixture();
        f.doc.add(ControlSpec::text("name"));
        f.engine
            .set_submit_rules("name", &["required"], None, None)
            .expect("rules should attach");

        assert!(f.engine.ok_to_save());
        assert!(!f.engine.ok_to_submit());
    }

    #[test]
    fn whole_form_failure_emits_one_event() {
        let mut f = fixture();
        f.doc.add(ControlSpec::text("a"));
        f.doc.add(ControlSpec::text("b").with_value("x"));
        f.doc.add(ControlSpec::text("c"));
        for field in ["a", "b", "c"] {
            f.engine
                .set_submit_rules(field, &["required"], None, None)
                .expect("rules should attach");
        }

        assert!(!f.engine.test(ValidationContext::Submit, FieldSelection::All));
        assert_eq!(
            f.log.events(),
            vec![FormEvent::ValidationFailure {
                context: ValidationContext::Submit,
                fields: vec!["a".to_string(), "c".to_string()],
            }]
        );
    }

    #[test]
    fn list_mode_ands_results_without_global_event() {
        let mut f = fixture();
        f.doc.add(ControlSpec::text("a").with_value("x"));
        f.doc.add(ControlSpec::text("b"));
        let (failed, on_failure) = recorder();
        f.engine
            .set_submit_rules("a", &["required"], None, None)
            .expect("rules should attach");
        f.engine
            .set_submit_rules("b", &["required"], None, Some(on_failure))
            .expect("rules should attach");

        assert!(!f.engine.test(ValidationContext::Submit, FieldSelection::Many(&["b", "a"])));
        assert!(f.engine.test(ValidationContext::Submit, FieldSelection::One("a")));
        assert_eq!(failed.borrow().len(), 1);
        assert!(f.log.events().is_empty());
    }

    #[test]
    fn rules_read_live_values() {
        let mut f = fixture();
        let qty = f.doc.add(ControlSpec::text("qty").with_value("3"));
        f.engine
            .set_submit_rules("qty", &["q -> q > 5"], None, None)
            .expect("inline rule should attach");

        assert!(!f.engine.ok_to_submit());
        qty.set_value("9");
        assert!(f.engine.ok_to_submit());
    }

    #[test]
    fn removing_missing_rule_set_warns() {
        let mut f = fixture();
        f.doc.add(ControlSpec::text("name"));
        assert!(matches!(
            f.engine.remove_on_save("name"),
            Err(ValidationError::NoRuleSet { .. })
        ));
        f.engine
            .set_save_rules("name", &["required"], None, None)
            .expect("rules should attach");
        assert!(f.engine.remove_on_save("name").is_ok());
        assert!(f.engine.ok_to_save());
    }

    #[test]
    fn detached_rules_follow_a_rename() {
        let mut f = fixture();
        let field = f.doc.add(ControlSpec::text("list.1.name"));
        f.engine
            .set_submit_rules("list.1.name", &["required"], None, None)
            .expect("rules should attach");

        let rules = f.engine.detach("list.1.name").expect("rules should detach");
        field.set_id("list.2.name");
        f.engine.attach("list.2.name", rules);

        assert!(f.engine.rules_for(ValidationContext::Submit, "list.1.name").is_none());
        assert!(!f.engine.test_field(ValidationContext::Submit, "list.2.name"));
    }

    #[test]
    fn callback_errors_are_logged_not_propagated() {
        let mut f = fixture();
        f.doc.add(ControlSpec::text("name"));
        f.engine
            .set_submit_rules(
                "name",
                &["required"],
                None,
                Some(Box::new(|_, _| Err(FormError::CallbackError("boom".to_string())))),
            )
            .expect("rules should attach");
        assert!(!f.engine.test_field(ValidationContext::Submit, "name"));
    }
}
