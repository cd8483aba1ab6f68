use formbind::form::{FnHandler, FormEvent, MemoryDocument, SubmissionRequest};
use formbind::transport::{HttpTransport, JsonTransport, StaticTransport};
use formbind::validation::StandardTests;
use formbind::widget::{ListWidget, TextWidget, Widget, WidgetConfig};
use formbind::{FormConfig, FormError, FormHost};
use serde_json::{Value, json};
use std::rc::Rc;
use tracing::{error, info};

const DATA_URL: &str = "demo://data";

fn default_data() -> Value {
	json!({
		"title": "Structure and Interpretation of Computer Programs",
		"authors.1.name": "Harold Abelson",
		"authors.2.name": "Gerald Jay Sussman",
		"edition": "2"
	})
}

fn widgets() -> Result<Vec<Box<dyn Widget>>, FormError> {
	let title = TextWidget::new(WidgetConfig::from_value(json!({
		"field": "title",
		"mandatory": true,
		"v2Rules": {
			"title-length": {"validator": "max-length", "params": 120, "message": "Title is too long"}
		}
	}))?);
	let authors = ListWidget::standard(WidgetConfig::from_value(json!({
		"id": "authors",
		"base-field": "authors",
		"sub-fields": {"field": "name"},
		"child-config": {"field": "name", "mandatory": true},
		"max-size": 5
	}))?);
	Ok(vec![Box::new(title), Box::new(authors)])
}

async fn run(config_path: Option<String>, data_path: Option<String>) -> Result<(), FormError> {
	let mut config = match config_path {
		Some(path) => FormConfig::load(path)?,
		None => FormConfig::default(),
	};

	// Data is either fetched over HTTP or served from memory
	let transport: Rc<dyn JsonTransport> = match data_path {
		Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
			config.url_data_source = Some(url);
			Rc::new(HttpTransport::new(None, config.request_timeout())?)
		}
		Some(path) => {
			let data: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
			config.url_data_source = Some(DATA_URL.to_string());
			Rc::new(StaticTransport::new().with_json(DATA_URL, data))
		}
		None => {
			config.url_data_source = Some(DATA_URL.to_string());
			Rc::new(StaticTransport::new().with_json(DATA_URL, default_data()))
		}
	};

	let document = Rc::new(MemoryDocument::new());
	let provider = Rc::new(StandardTests::new(document.clone()));
	let mut host = FormHost::new(config, document, provider, transport);

	host.context()
		.register_handler(Box::new(FnHandler::new("printer", |event: &FormEvent| {
			info!("Event: {}", serde_json::to_string(event)?);
			Ok(())
		})));
	host.form_mut().hooks_mut().submit_data = Some(Box::new(|request: &SubmissionRequest<'_>| {
		info!(
			"Submitting (valid: {}, unmanaged: {}): {}",
			request.valid,
			request.unmanaged,
			serde_json::to_string_pretty(request.data)?
		);
		Ok(())
	}));

	host.start(widgets()?).await?;

	if let Some(list) = host.widget_mut("authors") {
		info!("Authors list manages {} fields", list.fields().len());
	}
	host.set_value("authors.2.name", "Gerald J. Sussman");

	let unmanaged: Vec<&str> = host.form().unmanaged().collect();
	if !unmanaged.is_empty() {
		info!("Ignoring unmanaged keys before submitting: {:?}", unmanaged);
		host.form_mut().hooks_mut().pre_submit =
			Some(Box::new(|request: &SubmissionRequest<'_>| Ok(Some(request.valid))));
	}

	if host.submit() {
		info!("Form submitted");
	} else {
		error!("Form was not submitted");
	}
	Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.init();

	info!("Starting form binding demo");

	let mut args = std::env::args().skip(1);
	let config_path = args.next();
	let data_path = args.next();

	if let Err(e) = run(config_path, data_path).await {
		error!("Demo failed: {}", e);
	}
}
