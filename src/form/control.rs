//! Control and document abstractions.
//!
//! The form engine never talks to a real page directly. It sees individual input controls
//! through the `Control` trait and locates or creates them through `ControlDocument`. A browser
//! binding implements these over the DOM; `memory::MemoryDocument` implements them headlessly.

use std::rc::Rc;

/// Kind of element backing a control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Input,
    Select,
    Textarea,
    Other,
}

/// The `type` attribute of an input element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputType {
    Text,
    Hidden,
    Password,
    Checkbox,
    Radio,
    Submit,
    Reset,
    Image,
    File,
    Button,
    Other(String),
}

impl InputType {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "" | "text" => InputType::Text,
            "hidden" => InputType::Hidden,
            "password" => InputType::Password,
            "checkbox" => InputType::Checkbox,
            "radio" => InputType::Radio,
            "submit" => InputType::Submit,
            "reset" => InputType::Reset,
            "image" => InputType::Image,
            "file" => InputType::File,
            "button" => InputType::Button,
            other => InputType::Other(other.to_string()),
        }
    }

    /// Button-like and file inputs never carry form data.
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            InputType::Submit
                | InputType::Reset
                | InputType::Image
                | InputType::File
                | InputType::Button
        )
    }
}

/// How the registry reads and writes a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Textual,
    Checkbox,
    Radio,
    Select,
}

/// A single input control on the page.
pub trait Control {
    fn element_kind(&self) -> ElementKind;

    /// Input subtype; `None` for non-input elements.
    fn input_type(&self) -> Option<InputType>;

    fn id(&self) -> Option<String>;

    fn set_id(&self, id: &str);

    fn name(&self) -> Option<String>;

    /// Raw value attribute. For selects this is the selected option.
    fn value(&self) -> String;

    fn set_value(&self, value: &str);

    fn is_checked(&self) -> bool;

    fn set_checked(&self, checked: bool);

    /// Currently selected option of a select element.
    fn selected(&self) -> Option<String>;

    /// Select the option with the given value; false if no such option exists.
    fn select_option(&self, value: &str) -> bool;
}

pub type ControlHandle = Rc<dyn Control>;

/// Description of a control to create.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSpec {
    pub kind: ElementKind,
    pub input_type: Option<InputType>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub value: String,
    pub checked: bool,
    pub options: Vec<String>,
    pub classes: Vec<String>,
}

impl ControlSpec {
    fn new(kind: ElementKind, input_type: Option<InputType>) -> Self {
        Self {
            kind,
            input_type,
            id: None,
            name: None,
            value: String::new(),
            checked: false,
            options: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// An input of any type, identified by `id`.
    pub fn input(input_type: InputType, id: &str) -> Self {
        Self::new(ElementKind::Input, Some(input_type)).with_id(id)
    }

    pub fn text(id: &str) -> Self {
        Self::input(InputType::Text, id)
    }

    pub fn textarea(id: &str) -> Self {
        Self::new(ElementKind::Textarea, None).with_id(id)
    }

    pub fn checkbox(id: &str, value: &str) -> Self {
        Self::input(InputType::Checkbox, id).with_value(value)
    }

    /// A radio button; radio groups are identified by name.
    pub fn radio(name: &str, value: &str) -> Self {
        let mut spec = Self::new(ElementKind::Input, Some(InputType::Radio)).with_value(value);
        spec.name = Some(name.to_string());
        spec
    }

    pub fn select(id: &str, options: &[&str]) -> Self {
        let mut spec = Self::new(ElementKind::Select, None).with_id(id);
        spec.options = options.iter().map(|o| o.to_string()).collect();
        spec
    }

    /// Any non-form element, for exercising discovery edge cases.
    pub fn other(id: &str) -> Self {
        Self::new(ElementKind::Other, None).with_id(id)
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }
}

/// The page holding the controls.
pub trait ControlDocument {
    /// All controls carrying the given id. More than one is a malformed page.
    fn by_id(&self, id: &str) -> Vec<ControlHandle>;

    /// All radio inputs sharing the given name.
    fn radio_group(&self, name: &str) -> Vec<ControlHandle>;

    /// Controls matching a simple selector: `.class`, `#id` or a tag name, comma separated.
    fn query(&self, selector: &str) -> Vec<ControlHandle>;

    fn create_control(&self, spec: ControlSpec) -> ControlHandle;

    /// Remove every control with the given id; returns how many were removed.
    fn remove_control(&self, id: &str) -> usize;

    /// Remove this exact control, leaving others with the same id in place.
    fn discard_control(&self, control: &ControlHandle) -> bool;
}
