//! Form configuration.
//!
//! `FormConfig` carries every option the form host recognises. It deserializes from the
//! camel-cased JSON object pages embed in their bootstrap script, and every key is optional.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::FormError;
use crate::validation::ValidationContext;

/// Configuration for a form host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormConfig {
    /// Validate a field whenever its value changes
    pub validate_on_change: bool,
    /// Validate a field when it loses focus
    pub validate_on_blur: bool,
    /// Rule context used for change and blur validation
    #[serde(deserialize_with = "lenient_context")]
    pub validate_on_change_type: ValidationContext,
    /// Emit debug-level diagnostics
    pub debugging_enabled: bool,
    /// URL of the JSON object holding the initial server data
    pub url_data_source: Option<String>,
    /// Selector used to discover pre-existing controls at startup
    pub selector_form_fields: String,
    /// Message surfaced to the user when startup fails
    pub error_message_startup_failed: String,
    /// Per-request timeout for JSON loads, in seconds
    pub request_timeout_secs: u64,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            validate_on_change: true,
            validate_on_blur: true,
            validate_on_change_type: ValidationContext::Submit,
            debugging_enabled: true,
            url_data_source: None,
            selector_form_fields: ".bound-field".to_string(),
            error_message_startup_failed:
                "Sorry, an error occurred loading the form. Please try again later.".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl FormConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, FormError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load configuration from a JSON file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FormError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The data source URL, treating a blank string as absent.
    pub fn data_source(&self) -> Option<&str> {
        self.url_data_source
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Accept any string for the change validation type, falling back to submit rules.
fn lenient_context<'de, D>(deserializer: D) -> Result<ValidationContext, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref() {
        Some("save") => ValidationContext::Save,
        Some("submit") | None => ValidationContext::Submit,
        Some(other) => {
            warn!(
                "Unknown validation type '{}' for change validation, using 'submit'",
                other
            );
            ValidationContext::Submit
        }
    })
}
