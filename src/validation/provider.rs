//! Validation tests and the provider that resolves them.
//!
//! The engine never evaluates rules itself. It asks a `TestProvider` for the named test and for
//! a live handle to the field, then runs one against the other. `StandardTests` is the default
//! provider: it reads fields straight from a `ControlDocument`, ships the common built-in tests
//! and compiles inline expressions on demand.

use regex::Regex;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;
use tracing::warn;

use super::expr::{ExprError, InlineTest};
use crate::form::control::{ControlDocument, ControlHandle, InputType};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Live view of a field, re-read on every access.
pub trait FieldHandle {
    fn id(&self) -> &str;

    /// Current value; `None` when nothing is entered, checked or selected.
    fn value(&self) -> Option<String>;
}

/// A named validation test.
pub trait ValidationTest {
    fn name(&self) -> &str;

    fn run(&self, field: &dyn FieldHandle, params: Option<&Value>) -> bool;
}

/// Resolves fields and tests by name.
pub trait TestProvider {
    fn resolve_field(&self, id: &str) -> Option<Box<dyn FieldHandle>>;

    fn resolve_test(&self, name: &str) -> Option<Rc<dyn ValidationTest>>;

    /// Changes whenever a test is replaced, so callers know to drop cached resolutions.
    fn revision(&self) -> u64 {
        0
    }
}

/// Field handle reading from document controls
pub struct DocumentField {
    id: String,
    controls: Vec<ControlHandle>,
}

impl DocumentField {
    pub fn new(id: &str, controls: Vec<ControlHandle>) -> Self {
        Self {
            id: id.to_string(),
            controls,
        }
    }
}

impl FieldHandle for DocumentField {
    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self) -> Option<String> {
        self.controls.iter().find_map(|control| {
            match control.input_type() {
                Some(InputType::Checkbox | InputType::Radio) => {
                    control.is_checked().then(|| control.value())
                }
                _ => match control.selected() {
                    Some(selected) => Some(selected),
                    None => Some(control.value()),
                },
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Required,
    Email,
    Numeric,
    Integer,
    MinLength,
    MaxLength,
    Pattern,
    Equals,
}

impl Builtin {
    const ALL: [(&'static str, Builtin); 8] = [
        ("required", Builtin::Required),
        ("email", Builtin::Email),
        ("numeric", Builtin::Numeric),
        ("integer", Builtin::Integer),
        ("min-length", Builtin::MinLength),
        ("max-length", Builtin::MaxLength),
        ("pattern", Builtin::Pattern),
        ("equals", Builtin::Equals),
    ];
}

/// One of the built-in tests
struct BuiltinTest {
    name: &'static str,
    kind: Builtin,
    /// Compiled `pattern` parameters
    patterns: RefCell<HashMap<String, Regex>>,
}

impl BuiltinTest {
    fn new(name: &'static str, kind: Builtin) -> Self {
        Self {
            name,
            kind,
            patterns: RefCell::new(HashMap::new()),
        }
    }

    fn pattern(&self, pattern: &str) -> Result<Regex, regex::Error> {
        if let Some(re) = self.patterns.borrow().get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern)?;
        self.patterns
            .borrow_mut()
            .insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}

/// Positional parameter: element `index` of an array, or the bare value at index 0.
fn param_at(params: Option<&Value>, index: usize) -> Option<&Value> {
    match params? {
        Value::Array(items) => items.get(index),
        value if index == 0 => Some(value),
        _ => None,
    }
}

fn param_number(params: Option<&Value>) -> Option<f64> {
    match param_at(params, 0)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn param_text(params: Option<&Value>) -> Option<String> {
    param_at(params, 0).map(crate::utils::scalar_text)
}

impl ValidationTest for BuiltinTest {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, field: &dyn FieldHandle, params: Option<&Value>) -> bool {
        let value = field.value().unwrap_or_default();
        let trimmed = value.trim();

        if self.kind == Builtin::Required {
            return !trimmed.is_empty();
        }
        // Optional unless also required
        if trimmed.is_empty() {
            return true;
        }

        match self.kind {
            Builtin::Required => true,
            Builtin::Email => EMAIL.is_match(trimmed),
            Builtin::Numeric => trimmed.parse::<f64>().is_ok_and(f64::is_finite),
            Builtin::Integer => trimmed.parse::<i64>().is_ok(),
            Builtin::MinLength => param_number(params)
                .is_some_and(|min| value.chars().count() as f64 >= min),
            Builtin::MaxLength => param_number(params)
                .is_some_and(|max| value.chars().count() as f64 <= max),
            Builtin::Pattern => {
                let Some(pattern) = param_text(params) else {
                    warn!("Pattern test on '{}' has no pattern", field.id());
                    return false;
                };
                match self.pattern(&pattern) {
                    Ok(re) => re.is_match(&value),
                    Err(e) => {
                        warn!("Invalid pattern '{}' on '{}': {}", pattern, field.id(), e);
                        false
                    }
                }
            }
            Builtin::Equals => param_text(params).is_some_and(|expected| expected == value),
        }
    }
}

/// Default test provider backed by a control document
pub struct StandardTests {
    document: Rc<dyn ControlDocument>,
    tests: RefCell<HashMap<String, Rc<dyn ValidationTest>>>,
    revision: Cell<u64>,
}

impl StandardTests {
    pub fn new(document: Rc<dyn ControlDocument>) -> Self {
        let tests: HashMap<String, Rc<dyn ValidationTest>> = Builtin::ALL
            .iter()
            .map(|&(name, kind)| {
                let test: Rc<dyn ValidationTest> = Rc::new(BuiltinTest::new(name, kind));
                (name.to_string(), test)
            })
            .collect();

        Self {
            document,
            tests: RefCell::new(tests),
            revision: Cell::new(0),
        }
    }

    /// Register a custom test under its own name, replacing any existing one.
    pub fn register(&self, test: Rc<dyn ValidationTest>) {
        self.tests
            .borrow_mut()
            .insert(test.name().to_string(), test);
        self.revision.set(self.revision.get() + 1);
    }

    /// Compile and register an inline expression test.
    pub fn register_inline(&self, name: &str, source: &str) -> Result<(), ExprError> {
        let test = InlineTest::compile(name, source)?;
        self.register(Rc::new(test));
        Ok(())
    }

    pub fn has_test(&self, name: &str) -> bool {
        self.tests.borrow().contains_key(name)
    }
}

impl TestProvider for StandardTests {
    fn resolve_field(&self, id: &str) -> Option<Box<dyn FieldHandle>> {
        let by_id = self.document.by_id(id);
        let controls = match by_id.len() {
            1 => by_id,
            0 => self.document.radio_group(id),
            _ => return None,
        };
        if controls.is_empty() {
            return None;
        }
        Some(Box::new(DocumentField::new(id, controls)))
    }

    fn revision(&self) -> u64 {
        self.revision.get()
    }

    /// Named tests first; anything containing `->` or `$` is compiled as an inline expression.
    fn resolve_test(&self, name: &str) -> Option<Rc<dyn ValidationTest>> {
        if let Some(test) = self.tests.borrow().get(name) {
            return Some(test.clone());
        }
        if !(name.contains("->") || name.contains('$')) {
            return None;
        }
        match InlineTest::compile(name, name) {
            Ok(test) => {
                let test: Rc<dyn ValidationTest> = Rc::new(test);
                self.tests
                    .borrow_mut()
                    .insert(name.to_string(), test.clone());
                Some(test)
            }
            Err(e) => {
                warn!("Unable to compile inline test '{}': {}", name, e);
                None
            }
        }
    }
}
