//! Plugin Settings Messages
//!
//! The settings schema a plugin exposes, the per-version JSON handlers that
//! carry the settings conversation, and the orchestration every extension
//! point shares for it. Each version's wire format is a frozen contract; the
//! 2.0 handler delegates to 1.0 deliberately instead of sharing parsing by
//! accident.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde_json::{json, Map, Value};

use crate::error::{PluginAccessError, PluginAccessResult};

use super::{required_body, PluginRequestHelper};

/// Ask a plugin for its settings schema
pub const REQUEST_PLUGIN_SETTINGS_CONFIGURATION: &str = "conveyor.plugin-settings.get-configuration";

/// Ask a plugin for the markup that renders its settings form
pub const REQUEST_PLUGIN_SETTINGS_VIEW: &str = "conveyor.plugin-settings.get-view";

/// Ask a plugin to validate settings an admin entered
pub const REQUEST_VALIDATE_PLUGIN_SETTINGS: &str = "conveyor.plugin-settings.validate-configuration";

/// Tell a plugin its saved settings changed
pub const REQUEST_PLUGIN_SETTINGS_CHANGED: &str = "conveyor.plugin-settings.settings-changed";

/// One property in a plugin's settings schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettingsProperty {
    pub key: String,
    pub value: Option<String>,
    pub required: bool,
    pub secure: bool,
    pub display_name: String,
    pub display_order: i32,
}

impl PluginSettingsProperty {
    /// Property with the wire defaults: required, not secure, no display name,
    /// display order zero
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self {
            key: key.into(),
            value: None,
            required: true,
            secure: false,
            display_name: String::new(),
            display_order: 0,
        }
    }

    pub fn with_value<S: Into<String>>(mut self, value: S) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_display_name<S: Into<String>>(mut self, display_name: S) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_display_order(mut self, display_order: i32) -> Self {
        self.display_order = display_order;
        self
    }
}

/// A plugin's settings schema, held in display order (display-order first,
/// key as tie break)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginSettingsConfiguration {
    properties: Vec<PluginSettingsProperty>,
}

impl PluginSettingsConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, property: PluginSettingsProperty) {
        self.properties.push(property);
        self.properties.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.key.cmp(&b.key))
        });
    }

    pub fn get(&self, key: &str) -> Option<&PluginSettingsProperty> {
        self.properties.iter().find(|property| property.key == key)
    }

    pub fn properties(&self) -> &[PluginSettingsProperty] {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// A single validation failure reported by a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub key: String,
    pub message: String,
}

impl ValidationError {
    pub fn new<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Outcome of plugin-side settings validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }
}

/// Version-specific serializer/deserializer for the settings conversation
pub trait PluginSettingsMessageHandler: Send + Sync {
    fn response_for_configuration(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<PluginSettingsConfiguration>;

    fn response_for_view(&self, body: Option<&str>) -> PluginAccessResult<String>;

    fn request_for_validation(
        &self,
        configuration: &PluginSettingsConfiguration,
    ) -> PluginAccessResult<String>;

    fn response_for_validation(&self, body: Option<&str>) -> PluginAccessResult<ValidationResult>;

    fn request_for_settings_changed(
        &self,
        settings: &HashMap<String, String>,
    ) -> PluginAccessResult<String>;
}

/// Settings wire format, version 1.0
#[derive(Debug, Default)]
pub struct PluginSettingsMessageHandlerV1;

impl PluginSettingsMessageHandlerV1 {
    pub fn new() -> Self {
        Self
    }
}

/// Option lookup treating JSON null the same as an absent key
fn present<'a>(options: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    options.get(key).filter(|value| !value.is_null())
}

impl PluginSettingsMessageHandler for PluginSettingsMessageHandlerV1 {
    fn response_for_configuration(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<PluginSettingsConfiguration> {
        let text = required_body(body)?;
        let value: Value = serde_json::from_str(text)?;
        let entries = value.as_object().ok_or_else(|| {
            PluginAccessError::malformed_response(
                "Plugin Settings configuration should be returned as a map",
            )
        })?;

        let mut configuration = PluginSettingsConfiguration::new();
        for (key, entry) in entries {
            if key.is_empty() {
                return Err(PluginAccessError::malformed_response(
                    "Plugin Settings configuration key cannot be empty",
                ));
            }
            let options = entry.as_object().ok_or_else(|| {
                PluginAccessError::malformed_response(format!(
                    "Plugin Settings configuration properties for key '{}' should be represented as a Map",
                    key
                ))
            })?;

            let mut property = PluginSettingsProperty::new(key.clone());
            if let Some(required) = present(options, "required") {
                property.required = required.as_bool().ok_or_else(|| {
                    PluginAccessError::malformed_response(format!(
                        "'required' property for key '{}' should be of type boolean",
                        key
                    ))
                })?;
            }
            if let Some(secure) = present(options, "secure") {
                property.secure = secure.as_bool().ok_or_else(|| {
                    PluginAccessError::malformed_response(format!(
                        "'secure' property for key '{}' should be of type boolean",
                        key
                    ))
                })?;
            }
            if let Some(display_name) = present(options, "display-name") {
                property.display_name = display_name
                    .as_str()
                    .ok_or_else(|| {
                        PluginAccessError::malformed_response(format!(
                            "'display-name' property for key '{}' should be of type string",
                            key
                        ))
                    })?
                    .to_string();
            }
            // The wire carries display-order as a string holding an integer
            if let Some(display_order) = present(options, "display-order") {
                property.display_order = display_order
                    .as_str()
                    .and_then(|text| text.parse::<i32>().ok())
                    .ok_or_else(|| {
                        PluginAccessError::malformed_response(format!(
                            "'display-order' property for key '{}' should be of type integer",
                            key
                        ))
                    })?;
            }
            configuration.add(property);
        }
        Ok(configuration)
    }

    fn response_for_view(&self, body: Option<&str>) -> PluginAccessResult<String> {
        let text = required_body(body)?;
        let value: Value = serde_json::from_str(text)?;
        let view = value.as_object().ok_or_else(|| {
            PluginAccessError::malformed_response(
                "Plugin Settings view should be returned as a map",
            )
        })?;
        match view.get("template") {
            Some(Value::String(template)) if !template.is_empty() => Ok(template.clone()),
            _ => Err(PluginAccessError::malformed_response(
                "'template' is a required field",
            )),
        }
    }

    fn request_for_validation(
        &self,
        configuration: &PluginSettingsConfiguration,
    ) -> PluginAccessResult<String> {
        let mut settings = Map::new();
        for property in configuration.properties() {
            settings.insert(
                property.key.clone(),
                json!({ "value": property.value.clone().unwrap_or_default() }),
            );
        }
        Ok(json!({ "plugin-settings": settings }).to_string())
    }

    fn response_for_validation(&self, body: Option<&str>) -> PluginAccessResult<ValidationResult> {
        // No news is good news: plugins answer validation with nothing at all
        let text = match body {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Ok(ValidationResult::new()),
        };
        let value: Value = serde_json::from_str(text)?;
        if value.is_null() {
            return Ok(ValidationResult::new());
        }
        let entries = value.as_array().ok_or_else(|| {
            PluginAccessError::malformed_response(
                "Validation errors should be returned as a list of map",
            )
        })?;

        let mut result = ValidationResult::new();
        for entry in entries {
            let error = entry.as_object().ok_or_else(|| {
                PluginAccessError::malformed_response(
                    "Validation errors should be returned as a list of map",
                )
            })?;
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .filter(|message| !message.is_empty())
                .ok_or_else(|| {
                    PluginAccessError::malformed_response(
                        "Validation error 'message' is a required field",
                    )
                })?;
            let key = error.get("key").and_then(Value::as_str).unwrap_or("");
            result.add_error(ValidationError::new(key, message));
        }
        Ok(result)
    }

    fn request_for_settings_changed(
        &self,
        settings: &HashMap<String, String>,
    ) -> PluginAccessResult<String> {
        let mut entries = Map::new();
        for (key, value) in settings {
            entries.insert(key.clone(), Value::String(value.clone()));
        }
        Ok(json!({ "plugin-settings": entries }).to_string())
    }
}

/// Settings wire format, version 2.0. The schema did not change between
/// versions; every message delegates to 1.0.
#[derive(Debug, Default)]
pub struct PluginSettingsMessageHandlerV2 {
    delegate: PluginSettingsMessageHandlerV1,
}

impl PluginSettingsMessageHandlerV2 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PluginSettingsMessageHandler for PluginSettingsMessageHandlerV2 {
    fn response_for_configuration(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<PluginSettingsConfiguration> {
        self.delegate.response_for_configuration(body)
    }

    fn response_for_view(&self, body: Option<&str>) -> PluginAccessResult<String> {
        self.delegate.response_for_view(body)
    }

    fn request_for_validation(
        &self,
        configuration: &PluginSettingsConfiguration,
    ) -> PluginAccessResult<String> {
        self.delegate.request_for_validation(configuration)
    }

    fn response_for_validation(&self, body: Option<&str>) -> PluginAccessResult<ValidationResult> {
        self.delegate.response_for_validation(body)
    }

    fn request_for_settings_changed(
        &self,
        settings: &HashMap<String, String>,
    ) -> PluginAccessResult<String> {
        self.delegate.request_for_settings_changed(settings)
    }
}

/// Per-version settings handlers plus the request orchestration every
/// extension point runs for the settings conversation
#[derive(Default)]
pub struct SettingsRequestSupport {
    handlers: HashMap<String, Arc<dyn PluginSettingsMessageHandler>>,
}

impl SettingsRequestSupport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the settings handler for one protocol version
    pub fn with_handler(
        mut self,
        version: &str,
        handler: Arc<dyn PluginSettingsMessageHandler>,
    ) -> Self {
        self.handlers.insert(version.to_string(), handler);
        self
    }

    fn handler_for(
        &self,
        extension_name: &str,
        version: &str,
    ) -> PluginAccessResult<&Arc<dyn PluginSettingsMessageHandler>> {
        self.handlers.get(version).ok_or_else(|| {
            PluginAccessError::handler_not_registered(format!(
                "The '{}' extension resolved version '{}' but no plugin settings message handler covers it",
                extension_name, version
            ))
        })
    }

    /// Fetch a plugin's settings schema
    pub async fn configuration(
        &self,
        helper: &PluginRequestHelper,
        plugin_id: &str,
    ) -> PluginAccessResult<PluginSettingsConfiguration> {
        let version = helper.resolve_version(plugin_id).await?;
        let handler = self.handler_for(helper.extension_name(), &version)?;
        let body = helper
            .submit_request(plugin_id, &version, REQUEST_PLUGIN_SETTINGS_CONFIGURATION, None)
            .await?;
        handler.response_for_configuration(body.as_deref())
    }

    /// Fetch the markup that renders a plugin's settings form
    pub async fn view(
        &self,
        helper: &PluginRequestHelper,
        plugin_id: &str,
    ) -> PluginAccessResult<String> {
        let version = helper.resolve_version(plugin_id).await?;
        let handler = self.handler_for(helper.extension_name(), &version)?;
        let body = helper
            .submit_request(plugin_id, &version, REQUEST_PLUGIN_SETTINGS_VIEW, None)
            .await?;
        handler.response_for_view(body.as_deref())
    }

    /// Have the plugin validate settings an admin entered
    pub async fn validate(
        &self,
        helper: &PluginRequestHelper,
        plugin_id: &str,
        configuration: &PluginSettingsConfiguration,
    ) -> PluginAccessResult<ValidationResult> {
        let version = helper.resolve_version(plugin_id).await?;
        let handler = self.handler_for(helper.extension_name(), &version)?;
        let request_body = handler.request_for_validation(configuration)?;
        let body = helper
            .submit_request(
                plugin_id,
                &version,
                REQUEST_VALIDATE_PLUGIN_SETTINGS,
                Some(request_body),
            )
            .await?;
        handler.response_for_validation(body.as_deref())
    }

    /// Tell the plugin its saved settings changed. Best effort: per-plugin
    /// failures are logged and swallowed, wiring mistakes still propagate.
    pub async fn notify_settings_change(
        &self,
        helper: &PluginRequestHelper,
        plugin_id: &str,
        settings: &HashMap<String, String>,
    ) -> PluginAccessResult<()> {
        let version = helper.resolve_version(plugin_id).await?;
        let handler = self.handler_for(helper.extension_name(), &version)?;
        let request_body = handler.request_for_settings_changed(settings)?;
        match helper
            .submit_request(
                plugin_id,
                &version,
                REQUEST_PLUGIN_SETTINGS_CHANGED,
                Some(request_body),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if error.is_recoverable() => {
                warn!(
                    "Plugin '{}' failed to handle a settings change: {}",
                    plugin_id, error
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

/// Settings surface the metadata loader polls on every extension point
#[async_trait]
pub trait SettingsAwareExtension: Send + Sync {
    /// Extension point this implementation speaks for
    fn extension_name(&self) -> &str;

    /// The plugin's settings schema
    async fn plugin_settings_configuration(
        &self,
        plugin_id: &str,
    ) -> PluginAccessResult<PluginSettingsConfiguration>;

    /// The markup rendering the plugin's settings form
    async fn plugin_settings_view(&self, plugin_id: &str) -> PluginAccessResult<String>;
}
