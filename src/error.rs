use crate::identifier::IdentifierError;
use crate::transport::TransportError;
use crate::validation::ValidationError;

/// Errors raised by the form binding layer
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum FormError {
	#[error("Field '{0}' does not exist")]
	UnknownField(String),

	#[error("Field '{0}' is already in use")]
	DuplicateField(String),

	#[error("Field '{0}' could not be found by name or ID")]
	ControlNotFound(String),

	#[error("There are multiple ID '{0}' elements in document")]
	AmbiguousId(String),

	#[error("Unable to add field '{0}'")]
	Unsupported(String),

	#[error("Data mismatch in field '{0}'. Allowed values do not match server data")]
	DataMismatch(String),

	#[error("Invalid value for field '{field}': {value}")]
	InvalidValue { field: String, value: String },

	#[error("Field '{field}' does not support {operation}")]
	UnsupportedOperation {
		field: String,
		operation: &'static str,
	},

	#[error("Server data must be a JSON object, got {0}")]
	NotAnObject(String),

	#[error("Validation error: {0}")]
	ValidationError(#[from] ValidationError),

	#[error("Transport error: {0}")]
	TransportError(#[from] TransportError),

	#[error("Identifier error: {0}")]
	IdentifierError(#[from] IdentifierError),

	#[error("Config error: {0}")]
	ConfigError(String),

	#[error("Widget error: {0}")]
	WidgetError(String),

	#[error("Callback error: {0}")]
	CallbackError(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	JsonError(#[from] serde_json::Error),
}
