//! Headless control document.
//!
//! `MemoryDocument` keeps controls in insertion order and answers the same lookups a browser page
//! would. It backs the demo binary and the test suites, and is a reasonable host for server-side
//! form processing where no page exists.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::control::{Control, ControlDocument, ControlHandle, ControlSpec, ElementKind, InputType};

/// In-memory control
#[derive(Debug)]
pub struct MemoryControl {
    kind: ElementKind,
    input_type: Option<InputType>,
    id: RefCell<Option<String>>,
    name: Option<String>,
    value: RefCell<String>,
    checked: Cell<bool>,
    options: Vec<String>,
    classes: Vec<String>,
}

impl MemoryControl {
    pub fn new(spec: ControlSpec) -> Self {
        let value = if spec.kind == ElementKind::Select && !spec.options.contains(&spec.value) {
            spec.options.first().cloned().unwrap_or_default()
        } else {
            spec.value
        };

        Self {
            kind: spec.kind,
            input_type: spec.input_type,
            id: RefCell::new(spec.id),
            name: spec.name,
            value: RefCell::new(value),
            checked: Cell::new(spec.checked),
            options: spec.options,
            classes: spec.classes,
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    fn tag(&self) -> &'static str {
        match self.kind {
            ElementKind::Input => "input",
            ElementKind::Select => "select",
            ElementKind::Textarea => "textarea",
            ElementKind::Other => "div",
        }
    }

    fn matches(&self, selector: &str) -> bool {
        if let Some(class) = selector.strip_prefix('.') {
            self.has_class(class)
        } else if let Some(id) = selector.strip_prefix('#') {
            self.id.borrow().as_deref() == Some(id)
        } else {
            self.tag() == selector
        }
    }
}

impl Control for MemoryControl {
    fn element_kind(&self) -> ElementKind {
        self.kind
    }

    fn input_type(&self) -> Option<InputType> {
        self.input_type.clone()
    }

    fn id(&self) -> Option<String> {
        self.id.borrow().clone()
    }

    fn set_id(&self, id: &str) {
        *self.id.borrow_mut() = Some(id.to_string());
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn value(&self) -> String {
        self.value.borrow().clone()
    }

    fn set_value(&self, value: &str) {
        if self.kind == ElementKind::Select {
            self.select_option(value);
        } else {
            *self.value.borrow_mut() = value.to_string();
        }
    }

    fn is_checked(&self) -> bool {
        self.checked.get()
    }

    fn set_checked(&self, checked: bool) {
        self.checked.set(checked);
    }

    fn selected(&self) -> Option<String> {
        if self.kind != ElementKind::Select || self.options.is_empty() {
            return None;
        }
        Some(self.value.borrow().clone())
    }

    fn select_option(&self, value: &str) -> bool {
        if self.options.iter().any(|o| o == value) {
            *self.value.borrow_mut() = value.to_string();
            true
        } else {
            false
        }
    }
}

/// In-memory page of controls
#[derive(Debug, Default)]
pub struct MemoryDocument {
    controls: RefCell<Vec<Rc<MemoryControl>>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a control and return a typed handle to it.
    pub fn add(&self, spec: ControlSpec) -> Rc<MemoryControl> {
        let control = Rc::new(MemoryControl::new(spec));
        self.controls.borrow_mut().push(control.clone());
        control
    }

    /// Typed handle to the first control with the given id.
    pub fn get(&self, id: &str) -> Option<Rc<MemoryControl>> {
        self.controls
            .borrow()
            .iter()
            .find(|c| c.id().as_deref() == Some(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.controls.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.borrow().is_empty()
    }

    fn collect(&self, predicate: impl Fn(&MemoryControl) -> bool) -> Vec<ControlHandle> {
        self.controls
            .borrow()
            .iter()
            .filter(|c| predicate(c))
            .map(|c| c.clone() as ControlHandle)
            .collect()
    }
}

impl ControlDocument for MemoryDocument {
    fn by_id(&self, id: &str) -> Vec<ControlHandle> {
        self.collect(|c| c.id().as_deref() == Some(id))
    }

    fn radio_group(&self, name: &str) -> Vec<ControlHandle> {
        self.collect(|c| {
            c.input_type == Some(InputType::Radio) && c.name.as_deref() == Some(name)
        })
    }

    fn query(&self, selector: &str) -> Vec<ControlHandle> {
        let parts: Vec<&str> = selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        self.collect(|c| parts.iter().any(|part| c.matches(part)))
    }

    fn create_control(&self, spec: ControlSpec) -> ControlHandle {
        self.add(spec)
    }

    fn remove_control(&self, id: &str) -> usize {
        let mut controls = self.controls.borrow_mut();
        let before = controls.len();
        controls.retain(|c| c.id().as_deref() != Some(id));
        before - controls.len()
    }

    fn discard_control(&self, control: &ControlHandle) -> bool {
        let mut controls = self.controls.borrow_mut();
        let before = controls.len();
        controls.retain(|c| !std::ptr::addr_eq(Rc::as_ptr(c), Rc::as_ptr(control)));
        before != controls.len()
    }
}
