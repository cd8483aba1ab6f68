//! Repeating lists.
//!
//! A list owns rows numbered `1..=count`. Every field in row `n` is named
//! `<base-field>.<n>.<sub-field>`, so rows must be renumbered whenever one is deleted or moved.
//! Renumbering happens in two passes: every affected row is renamed first (releasing its old
//! fields), then every row re-registers. Doing it in one pass would make row 3 collide with
//! row 1 while `[3, 1, 2]` is being applied.

use itertools::Itertools;
use serde_json::Value;
use tracing::{debug, warn};

use super::{TextWidget, Widget, WidgetBase, WidgetConfig};
use crate::error::FormError;
use crate::form::Form;
use crate::identifier::{FieldPath, compound, rewrite_flat};

/// Builds the widget for one row from its expanded configuration.
pub type ChildFactory = Box<dyn FnMut(WidgetConfig) -> Result<Box<dyn Widget>, FormError>>;

/// Which list controls should be visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListUiState {
    pub empty: bool,
    pub show_delete: bool,
    pub show_add: bool,
    pub empty_message: Option<String>,
}

struct Row {
    index: u32,
    widget: Box<dyn Widget>,
}

/// Coordinator for a list of identically shaped rows
pub struct ListWidget {
    base: WidgetBase,
    base_field: String,
    rows: Vec<Row>,
    factory: ChildFactory,
}

/// Rows holding a `base-field` are lists themselves, everything else is a text widget.
pub fn standard_child(config: WidgetConfig) -> Result<Box<dyn Widget>, FormError> {
    if config.base_field.is_some() {
        Ok(Box::new(ListWidget::standard(config)))
    } else {
        Ok(Box::new(TextWidget::new(config)))
    }
}

impl ListWidget {
    pub fn new(config: WidgetConfig, factory: ChildFactory) -> Self {
        let base_field = config.base_field.clone().unwrap_or_default();
        Self {
            base: WidgetBase::new(config),
            base_field,
            rows: Vec::new(),
            factory,
        }
    }

    /// A list whose rows are built by `standard_child`, allowing nested lists.
    pub fn standard(config: WidgetConfig) -> Self {
        Self::new(config, Box::new(standard_child))
    }

    pub fn base_field(&self) -> &str {
        &self.base_field
    }

    /// Nesting depth of this list's own row index.
    pub fn depth(&self) -> usize {
        FieldPath::parse(&self.base_field).map_or(0, |path| path.list_depth()) + 1
    }

    pub fn child_count(&self) -> usize {
        self.rows.len()
    }

    /// Row widgets in display order.
    pub fn children(&self) -> impl Iterator<Item = &dyn Widget> {
        self.rows.iter().map(|row| row.widget.as_ref())
    }

    pub fn child_by_index(&self, index: u32) -> Option<&dyn Widget> {
        self.rows
            .iter()
            .find(|row| row.index == index)
            .map(|row| row.widget.as_ref())
    }

    fn min_size(&self) -> u32 {
        self.base.config().min_size.unwrap_or(1)
    }

    /// Whether unmanaged server data exists for row `index`.
    fn has_pending_row(&self, form: &Form, index: u32) -> bool {
        let Ok(base) = FieldPath::parse(&self.base_field) else {
            return false;
        };
        form.unmanaged().any(|key| {
            FieldPath::parse(key)
                .ok()
                .and_then(|path| path.row_index_under(&base))
                == Some(index)
        })
    }

    /// Row configuration with each mapped sub-field expanded to its compound identifier.
    ///
    /// Only keys named in `sub-fields` whose value matches the mapping are rewritten.
    fn child_config(&self, index: u32) -> Result<WidgetConfig, FormError> {
        let config = self.base.config();
        let mut raw = config.child_config.clone().unwrap_or_default();

        for (key, value) in raw.iter_mut() {
            let Value::String(text) = &*value else {
                continue;
            };
            if config.sub_fields.get(key) == Some(text) {
                *value = Value::String(compound(&self.base_field, index, text)?);
            }
        }

        let anchor = ["field", "base-field"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(Value::as_str).map(str::to_string));
        let anchor = match anchor {
            Some(anchor) => anchor,
            None => compound(&self.base_field, index, "row")?,
        };
        raw.insert("id".to_string(), Value::String(format!("{}Container", anchor)));

        WidgetConfig::from_value(Value::Object(raw))
    }

    /// Append row `count + 1`.
    ///
    /// Without `force`, rows beyond the minimum are only created when unmanaged server data
    /// is waiting for them. Returns whether a row was added.
    pub fn add_child(&mut self, form: &mut Form, force: bool) -> Result<bool, FormError> {
        let counter = self.rows.len() as u32 + 1;
        if !force && counter > self.min_size() && !self.has_pending_row(form, counter) {
            return Ok(false);
        }

        let config = self.child_config(counter)?;
        let mut widget = (self.factory)(config)?;
        widget.build_ui(form)?;
        debug!("List '{}' added row {}", self.base_field, counter);

        self.rows.push(Row {
            index: counter,
            widget,
        });
        Ok(true)
    }

    /// Add a row on user request, unless the list is full.
    pub fn click_add(&mut self, form: &mut Form) -> Result<bool, FormError> {
        if let Some(max) = self.base.config().max_size {
            if self.rows.len() as u32 >= max {
                warn!("List '{}' is full ({} rows)", self.base_field, max);
                return Ok(false);
            }
        }
        self.add_child(form, true)
    }

    /// Apply a new row order, given as current row indices in their new positions.
    ///
    /// Position `n` (1-based) becomes row `n`. The order must name every current row once.
    pub fn reorder(&mut self, form: &mut Form, new_order: &[u32]) -> Result<(), FormError> {
        let current: Vec<u32> = self.rows.iter().map(|row| row.index).sorted().collect();
        let requested: Vec<u32> = new_order.iter().copied().sorted().collect();
        if current != requested {
            return Err(FormError::WidgetError(format!(
                "Order {:?} does not match the rows of list '{}'",
                new_order, self.base_field
            )));
        }

        let depth = self.depth();
        let mut rows = std::mem::take(&mut self.rows);
        let mut ordered = Vec::with_capacity(rows.len());
        for (position, old) in new_order.iter().enumerate() {
            let Some(at) = rows.iter().position(|row| row.index == *old) else {
                continue;
            };
            let mut row = rows.swap_remove(at);
            let new = position as u32 + 1;
            if row.index != new {
                debug!("List '{}' moving row {} to {}", self.base_field, row.index, new);
                row.widget.dom_update(form, row.index, new, depth);
                row.index = new;
            }
            ordered.push(row);
        }

        for row in &mut ordered {
            row.widget.refresh_registration(form);
        }
        self.rows = ordered;
        Ok(())
    }

    /// Remove row `index` and its data, then close the gap.
    pub fn delete_child(&mut self, form: &mut Form, index: u32) -> Result<(), FormError> {
        let Some(at) = self.rows.iter().position(|row| row.index == index) else {
            return Err(FormError::WidgetError(format!(
                "List '{}' has no row {}",
                self.base_field, index
            )));
        };

        let mut row = self.rows.remove(at);
        row.widget.delete_widget(form);

        let order: Vec<u32> = self.rows.iter().map(|row| row.index).collect();
        self.reorder(form, &order)
    }

    pub fn ui_state(&self) -> ListUiState {
        let config = self.base.config();
        let count = self.rows.len() as u32;
        ListUiState {
            empty: count == 0,
            show_delete: count > self.min_size(),
            show_add: config.max_size.is_none_or(|max| count < max),
            empty_message: config.empty_message.clone(),
        }
    }
}

impl Widget for ListWidget {
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
        if self.base_field.is_empty() {
            return Err(FormError::WidgetError(
                "No base field provided for list".to_string(),
            ));
        }
        while self.add_child(form, false)? {}
        Ok(())
    }

    fn is_in_error(&self) -> bool {
        self.rows.iter().any(|row| row.widget.is_in_error())
    }

    fn change(&mut self, form: &mut Form, field: &str, valid: Option<bool>) {
        for row in &mut self.rows {
            if row.widget.fields().iter().any(|f| f == field) {
                row.widget.change(form, field, valid);
            }
        }
    }

    fn delete_widget(&mut self, form: &mut Form) {
        for mut row in self.rows.drain(..) {
            row.widget.delete_widget(form);
        }
    }

    fn dom_update(&mut self, form: &mut Form, from: u32, to: u32, depth: usize) {
        self.base.dom_update(from, to, depth);
        self.base_field = rewrite_flat(&self.base_field, from, to, depth);
        for row in &mut self.rows {
            row.widget.dom_update(form, from, to, depth);
        }
    }

    fn refresh_registration(&mut self, form: &mut Form) {
        for row in &mut self.rows {
            row.widget.refresh_registration(form);
        }
    }

    fn fields(&self) -> Vec<String> {
        self.rows.iter().flat_map(|row| row.widget.fields()).collect()
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut dyn Widget> {
        if self.base.id() == id {
            return Some(self as &mut dyn Widget);
        }
        self.rows.iter_mut().find_map(|row| row.widget.find_mut(id))
    }
}
