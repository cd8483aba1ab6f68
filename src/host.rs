//! Form host and startup orchestration.
//!
//! This module defines `FormHost`, which owns a bound `Form`, the widgets built on it and the
//! loader used to fetch their data. Startup runs in a fixed order:
//!
//! - Discover pre-existing controls matching the configured selector
//! - Fetch the data source and every widget's support data concurrently
//! - Merge the data source into server data and push it into the discovered controls
//! - Build the widgets, which adopt any server data still unmanaged
//! - Wait for the pending-work tracker to drain, then emit `StartupComplete`
//!
//! Change notifications for a field are routed first to the form and then to the widget
//! that registered the field.

use futures_util::future::{join, join_all};
use serde_json::Value;
use std::rc::Rc;
use tracing::{info, warn};

use crate::config::FormConfig;
use crate::error::FormError;
use crate::form::{ControlDocument, Form, FormContext, FormEvent, SyncDirection};
use crate::pending::PendingWorkTracker;
use crate::transport::{JsonLoader, JsonTransport, TransportError};
use crate::validation::TestProvider;
use crate::widget::Widget;

/// Entry point for binding a page.
///
/// Owns the form, its widgets and the JSON loader, and drives startup.
pub struct FormHost {
    form: Form,
    loader: JsonLoader,
    widgets: Vec<Box<dyn Widget>>,
    started: bool,
}

impl FormHost {
    /// Create a host.
    ///
    /// # Arguments
    ///
    /// * `config` - Form configuration
    /// * `document` - The page holding the controls
    /// * `provider` - Resolves validation tests and field values
    /// * `transport` - Fetches the data source and widget data
    pub fn new(
        config: FormConfig,
        document: Rc<dyn ControlDocument>,
        provider: Rc<dyn TestProvider>,
        transport: Rc<dyn JsonTransport>,
    ) -> Self {
        let timeout = config.request_timeout();
        let ctx = FormContext::new(config);
        Self {
            form: Form::new(ctx, document, provider),
            loader: JsonLoader::new(transport, PendingWorkTracker::new(), timeout),
            widgets: Vec::new(),
            started: false,
        }
    }

    pub fn context(&self) -> &FormContext {
        self.form.context()
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Form {
        &mut self.form
    }

    pub fn loader(&self) -> &JsonLoader {
        &self.loader
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Bind the page and build `widgets`.
    ///
    /// # Returns
    ///
    /// An error only when the data source could not be loaded or is not a JSON object. Widget
    /// failures are logged and leave that widget out.
    pub async fn start(&mut self, widgets: Vec<Box<dyn Widget>>) -> Result<(), FormError> {
        let discovered = self.form.discover();
        info!("Starting form with {} discovered fields", discovered);

        let data_source = self.form.context().config().data_source().map(str::to_string);
        if data_source.is_none() {
            warn!("No Data Source specified in configuration!");
        }

        let loader = &self.loader;
        let data_load = async {
            match &data_source {
                Some(url) => Some(loader.load_json(url).await),
                None => None,
            }
        };
        let widget_loads = join_all(widgets.iter().map(|widget| async move {
            match &widget.config().json_data_url {
                Some(url) => Some(loader.get_json(url, url, false, Some(widget.id())).await),
                None => None,
            }
        }));
        let (data, widget_data) = join(data_load, widget_loads).await;

        if let Some(data) = data {
            if let Err(e) = self.apply_data_source(data) {
                let message = self.form.context().config().error_message_startup_failed.clone();
                self.form.context().log_error(message);
                return Err(e);
            }
        }
        self.form.synch(SyncDirection::Load, None);

        for (widget, data) in widgets.into_iter().zip(widget_data) {
            self.install(widget, data);
        }

        self.loader.tracker().drained().await;
        self.started = true;
        info!(
            "Form startup complete: {} widgets, {}",
            self.widgets.len(),
            self.loader.tracker().stats().summary()
        );
        self.form.context().dispatch(FormEvent::StartupComplete);
        Ok(())
    }

    fn apply_data_source(&mut self, data: Result<Value, TransportError>) -> Result<(), FormError> {
        let count = self.form.merge_server_data(data?)?;
        self.form
            .context()
            .debug(format!("Data source supplied {} values", count));
        Ok(())
    }

    /// Build a widget and take ownership of it, unless its support data failed to load.
    fn install(&mut self, mut widget: Box<dyn Widget>, data: Option<Result<Value, TransportError>>) {
        match data {
            Some(Ok(data)) => widget.set_json_data(data),
            Some(Err(e)) => {
                self.form.context().log_error(format!(
                    "Widget '{}' could not load its data: {}",
                    widget.id(),
                    e
                ));
                return;
            }
            None => {}
        }

        match widget.build_ui(&mut self.form) {
            Ok(()) => self.widgets.push(widget),
            Err(e) => self
                .form
                .context()
                .log_error(format!("Widget '{}' failed to build: {}", widget.id(), e)),
        }
    }

    /// Add a widget after startup.
    pub async fn add_widget(&mut self, widget: Box<dyn Widget>) -> Result<(), FormError> {
        let data = match &widget.config().json_data_url {
            Some(url) => Some(self.loader.get_json(url, url, false, Some(widget.id())).await),
            None => None,
        };
        let id = widget.id().to_string();
        self.install(widget, data);
        if self.widgets.iter().any(|w| w.id() == id) {
            Ok(())
        } else {
            Err(FormError::WidgetError(format!("Widget '{}' was not installed", id)))
        }
    }

    /// The widget, at any nesting level, with the given id.
    pub fn widget_mut(&mut self, id: &str) -> Option<&mut dyn Widget> {
        self.widgets.iter_mut().find_map(|widget| widget.find_mut(id))
    }

    pub fn widget_count(&self) -> usize {
        self.widgets.len()
    }

    /// A field's control changed: validate, announce, then notify the owning widget.
    pub fn field_changed(&mut self, field: &str) -> Option<bool> {
        let valid = self.form.field_changed(field);
        let Some(owner) = self.form.owner_of(field).map(str::to_string) else {
            return valid;
        };
        if let Some(widget) = self
            .widgets
            .iter_mut()
            .find_map(|widget| widget.find_mut(&owner))
        {
            widget.change(&mut self.form, field, valid);
        }
        valid
    }

    /// Write a field, routing any resulting change through `field_changed`.
    pub fn set_value(&mut self, field: &str, value: impl Into<Value>) -> Option<Value> {
        let outcome = match self.form.write_value(field, &value.into()) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Unable to set '{}': {}", field, e);
                return None;
            }
        };
        if outcome.changed() {
            self.field_changed(field);
        }
        Some(outcome.into_value())
    }

    pub fn save(&mut self, trusted: bool) -> bool {
        self.form.save(trusted)
    }

    pub fn submit(&mut self) -> bool {
        self.form.submit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{ControlSpec, EventLog, MemoryDocument};
    use crate::transport::StaticTransport;
    use crate::validation::StandardTests;
    use crate::widget::{ListWidget, TextWidget, WidgetConfig};
    use serde_json::json;
    use std::time::Duration;

    fn host(config: Value, transport: StaticTransport) -> (FormHost, Rc<MemoryDocument>, EventLog) {
        let config: FormConfig = serde_json::from_value(config).expect("config should parse");
        let doc = Rc::new(MemoryDocument::new());
        let provider = Rc::new(StandardTests::new(doc.clone()));
        let host = FormHost::new(config, doc.clone(), provider, Rc::new(transport));
        let log = EventLog::new();
        host.context().register_handler(Box::new(log.clone()));
        (host, doc, log)
    }

    fn text(config: Value) -> Box<dyn Widget> {
        Box::new(TextWidget::new(
            WidgetConfig::from_value(config).expect("config should parse"),
        ))
    }

    #[tokio::test]
    async fn startup_loads_data_and_builds_widgets() {
        let transport = StaticTransport::new()
            .with_json(
                "/data.json",
                json!({"title": "Dune", "author": "Herbert", "legacy": "x"}),
            )
            .with_delay("/data.json", Duration::from_millis(5));
        let (mut host, doc, log) = host(json!({"urlDataSource": "/data.json"}), transport);
        doc.add(ControlSpec::text("title").with_class("bound-field"));

        host.start(vec![text(json!({"field": "author"}))])
            .await
            .expect("startup should succeed");

        assert!(host.is_started());
        assert_eq!(host.form().value("title"), Some(json!("Dune")));
        assert_eq!(host.form().value("author"), Some(json!("Herbert")));
        assert_eq!(host.form().unmanaged().collect::<Vec<_>>(), vec!["legacy"]);
        assert_eq!(log.events().last(), Some(&FormEvent::StartupComplete));
        assert_eq!(
            log.count(|e| matches!(e, FormEvent::NewManagedServerData { .. })),
            1
        );
    }

    #[tokio::test]
    async fn startup_without_data_source_still_completes() {
        let (mut host, _, log) = host(json!({}), StaticTransport::new());
        host.start(vec![text(json!({"field": "name"}))])
            .await
            .expect("startup should succeed");

        assert_eq!(host.widget_count(), 1);
        assert_eq!(log.count(|e| matches!(e, FormEvent::StartupComplete)), 1);
    }

    #[tokio::test]
    async fn failed_data_source_aborts_startup() {
        let transport = StaticTransport::new().with_failure("/data.json");
        let (mut host, _, log) = host(json!({"urlDataSource": "/data.json"}), transport);

        let result = host.start(Vec::new()).await;

        assert!(matches!(result, Err(FormError::TransportError(_))));
        assert!(!host.is_started());
        assert!(!host.loader().tracker().has_work_pending());
        assert_eq!(log.count(|e| matches!(e, FormEvent::StartupComplete)), 0);
    }

    #[tokio::test]
    async fn widget_with_failed_support_data_is_skipped() {
        let transport = StaticTransport::new()
            .with_json("/countries.json", json!(["nz", "au"]))
            .with_failure("/missing.json");
        let (mut host, _, _) = host(json!({}), transport);

        host.start(vec![
            text(json!({"field": "country", "json-data-url": "/countries.json"})),
            text(json!({"field": "region", "json-data-url": "/missing.json"})),
        ])
        .await
        .expect("startup should succeed");

        assert_eq!(host.widget_count(), 1);
        assert!(host.form().has_field("country"));
        assert!(!host.form().has_field("region"));
        assert_eq!(
            host.loader().cached("/countries.json"),
            Some(json!(["nz", "au"]))
        );
    }

    #[tokio::test]
    async fn set_value_refreshes_widget_display_and_label() {
        let (mut host, doc, _) = host(json!({}), StaticTransport::new());
        doc.add(ControlSpec::text("countryLabel").with_class("bound-field"));
        host.start(vec![text(json!({
            "id": "country",
            "field": "country",
            "mandatory": true,
            "label-field": "countryLabel"
        }))])
        .await
        .expect("startup should succeed");

        host.set_value("country", "New Zealand");
        assert_eq!(host.form().value("countryLabel"), Some(json!("New Zealand")));
        assert!(!host.widget_mut("country").expect("widget should exist").is_in_error());

        host.set_value("country", "");
        assert!(host.widget_mut("country").expect("widget should exist").is_in_error());
        assert_eq!(host.form().value("countryLabel"), Some(json!("")));
    }

    #[tokio::test]
    async fn changes_route_to_owning_widget() {
        let transport = StaticTransport::new().with_json(
            "/data.json",
            json!({"people.1.name": "Ada", "people.2.name": "Grace"}),
        );
        let (mut host, _, log) = host(json!({"urlDataSource": "/data.json"}), transport);
        let list = ListWidget::standard(
            WidgetConfig::from_value(json!({
                "id": "people",
                "base-field": "people",
                "sub-fields": {"field": "name"},
                "child-config": {"field": "name", "mandatory": true}
            }))
            .expect("config should parse"),
        );
        host.start(vec![Box::new(list)])
            .await
            .expect("startup should succeed");
        log.clear();

        assert_eq!(host.set_value("people.2.name", ""), Some(json!("")));
        assert_eq!(
            log.events(),
            vec![FormEvent::DataChanged {
                field: "people.2.name".to_string(),
                valid: Some(false),
            }]
        );
        assert!(
            host.widget_mut("people.2.nameContainer")
                .expect("row should exist")
                .is_in_error()
        );
        assert!(host.widget_mut("people").expect("list should exist").is_in_error());
        assert!(!host.submit());
    }
}
