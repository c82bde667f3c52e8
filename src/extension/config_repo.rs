//! Config-Repo Extension
//!
//! Asks plugins to turn a checked-out configuration repository into pipelines
//! and environments the server can merge into its own config. Version 2.0
//! added a capabilities handshake; everything else delegates to 1.0.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::descriptor::PluginDirectory;
use crate::error::{PluginAccessError, PluginAccessResult};
use crate::transport::PluginTransport;

use super::settings::{
    PluginSettingsConfiguration, PluginSettingsMessageHandlerV1, PluginSettingsMessageHandlerV2,
    SettingsAwareExtension, SettingsRequestSupport, ValidationResult,
};
use super::{required_body, PluginRequestHelper, CONFIG_REPO_EXTENSION};

/// Ask a plugin to parse a checked-out repository directory
pub const REQUEST_PARSE_DIRECTORY: &str = "parse-directory";

/// Ask a plugin what optional features it implements (2.0 and later)
pub const REQUEST_CAPABILITIES: &str = "get-capabilities";

/// Protocol versions the server speaks for this extension point
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0", "2.0"];

/// One key/value pair of material configuration handed to the plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationProperty {
    pub key: String,
    pub value: String,
}

impl ConfigurationProperty {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A pipeline definition the plugin found in the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEntry {
    pub group: String,
    pub name: String,
}

/// A problem the plugin hit while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigParseError {
    pub location: Option<String>,
    pub message: String,
}

/// Everything a plugin extracted from one repository checkout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDirectory {
    pub environments: Vec<String>,
    pub pipelines: Vec<PipelineEntry>,
    pub errors: Vec<ConfigParseError>,
}

impl ParsedDirectory {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Optional features a 2.0 plugin may implement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigRepoCapabilities {
    pub supports_parse_content: bool,
    pub supports_pipeline_export: bool,
}

/// Version-specific serializer/deserializer for config-repo messages
pub trait ConfigRepoMessageHandler: Send + Sync {
    fn request_for_parse_directory(
        &self,
        directory: &str,
        configurations: &[ConfigurationProperty],
    ) -> PluginAccessResult<String>;

    fn response_for_parse_directory(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<ParsedDirectory>;

    fn response_for_capabilities(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<ConfigRepoCapabilities>;
}

#[derive(Serialize)]
struct ParseDirectoryWire<'a> {
    directory: &'a str,
    configurations: Vec<ConfigurationPropertyWire<'a>>,
}

#[derive(Serialize)]
struct ConfigurationPropertyWire<'a> {
    key: &'a str,
    value: &'a str,
}

/// Config-repo wire format, version 1.0
#[derive(Debug, Default)]
pub struct ConfigRepoMessageHandlerV1;

impl ConfigRepoMessageHandlerV1 {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigRepoMessageHandler for ConfigRepoMessageHandlerV1 {
    fn request_for_parse_directory(
        &self,
        directory: &str,
        configurations: &[ConfigurationProperty],
    ) -> PluginAccessResult<String> {
        let wire = ParseDirectoryWire {
            directory,
            configurations: configurations
                .iter()
                .map(|property| ConfigurationPropertyWire {
                    key: &property.key,
                    value: &property.value,
                })
                .collect(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    fn response_for_parse_directory(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<ParsedDirectory> {
        let text = required_body(body)?;
        let value: Value = serde_json::from_str(text)?;
        let root = value.as_object().ok_or_else(|| {
            PluginAccessError::malformed_response("Parsed directory should be returned as a map")
        })?;

        let environments = match root.get("environments") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        PluginAccessError::malformed_response(
                            "'environments' should be of type list of string",
                        )
                    })
                })
                .collect::<PluginAccessResult<Vec<String>>>()?,
            Some(_) => {
                return Err(PluginAccessError::malformed_response(
                    "'environments' should be of type list of string",
                ))
            }
        };

        let mut pipelines = Vec::new();
        match root.get("pipelines") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    let entry = item.as_object().ok_or_else(|| {
                        PluginAccessError::malformed_response(
                            "'pipelines' should be of type list of map",
                        )
                    })?;
                    let name = entry
                        .get("name")
                        .and_then(Value::as_str)
                        .filter(|name| !name.is_empty())
                        .ok_or_else(|| {
                            PluginAccessError::malformed_response(
                                "Pipeline 'name' is a required field",
                            )
                        })?;
                    let group = entry.get("group").and_then(Value::as_str).unwrap_or("");
                    pipelines.push(PipelineEntry {
                        group: group.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            Some(_) => {
                return Err(PluginAccessError::malformed_response(
                    "'pipelines' should be of type list of map",
                ))
            }
        }

        let mut errors = Vec::new();
        match root.get("errors") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    let entry = item.as_object().ok_or_else(|| {
                        PluginAccessError::malformed_response(
                            "'errors' should be of type list of map",
                        )
                    })?;
                    let message = entry
                        .get("message")
                        .and_then(Value::as_str)
                        .filter(|message| !message.is_empty())
                        .ok_or_else(|| {
                            PluginAccessError::malformed_response(
                                "Parse error 'message' is a required field",
                            )
                        })?;
                    let location = entry
                        .get("location")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    errors.push(ConfigParseError {
                        location,
                        message: message.to_string(),
                    });
                }
            }
            Some(_) => {
                return Err(PluginAccessError::malformed_response(
                    "'errors' should be of type list of map",
                ))
            }
        }

        Ok(ParsedDirectory {
            environments,
            pipelines,
            errors,
        })
    }

    fn response_for_capabilities(
        &self,
        _body: Option<&str>,
    ) -> PluginAccessResult<ConfigRepoCapabilities> {
        // 1.0 never negotiated capabilities
        Ok(ConfigRepoCapabilities::default())
    }
}

/// Config-repo wire format, version 2.0: adds the capabilities handshake,
/// parse-directory delegates to 1.0 in both directions
#[derive(Debug, Default)]
pub struct ConfigRepoMessageHandlerV2 {
    delegate: ConfigRepoMessageHandlerV1,
}

impl ConfigRepoMessageHandlerV2 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigRepoMessageHandler for ConfigRepoMessageHandlerV2 {
    fn request_for_parse_directory(
        &self,
        directory: &str,
        configurations: &[ConfigurationProperty],
    ) -> PluginAccessResult<String> {
        self.delegate
            .request_for_parse_directory(directory, configurations)
    }

    fn response_for_parse_directory(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<ParsedDirectory> {
        self.delegate.response_for_parse_directory(body)
    }

    fn response_for_capabilities(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<ConfigRepoCapabilities> {
        let text = required_body(body)?;
        let value: Value = serde_json::from_str(text)?;
        let root = value.as_object().ok_or_else(|| {
            PluginAccessError::malformed_response("Capabilities should be returned as a map")
        })?;

        let flag = |key: &str| -> PluginAccessResult<bool> {
            match root.get(key) {
                None | Some(Value::Null) => Ok(false),
                Some(Value::Bool(flag)) => Ok(*flag),
                Some(_) => Err(PluginAccessError::malformed_response(format!(
                    "'{}' should be of type boolean",
                    key
                ))),
            }
        };

        Ok(ConfigRepoCapabilities {
            supports_parse_content: flag("supports_parse_content")?,
            supports_pipeline_export: flag("supports_pipeline_export")?,
        })
    }
}

/// Talks to plugins implementing the config-repo extension point
pub struct ConfigRepoExtension {
    helper: PluginRequestHelper,
    handlers: HashMap<String, Arc<dyn ConfigRepoMessageHandler>>,
    settings: SettingsRequestSupport,
}

impl ConfigRepoExtension {
    pub fn new(transport: Arc<dyn PluginTransport>, directory: Arc<dyn PluginDirectory>) -> Self {
        let helper = PluginRequestHelper::new(
            transport,
            directory,
            CONFIG_REPO_EXTENSION,
            SUPPORTED_VERSIONS,
        );
        let mut handlers: HashMap<String, Arc<dyn ConfigRepoMessageHandler>> = HashMap::new();
        handlers.insert("1.0".to_string(), Arc::new(ConfigRepoMessageHandlerV1::new()));
        handlers.insert("2.0".to_string(), Arc::new(ConfigRepoMessageHandlerV2::new()));
        let settings = SettingsRequestSupport::new()
            .with_handler("1.0", Arc::new(PluginSettingsMessageHandlerV1::new()))
            .with_handler("2.0", Arc::new(PluginSettingsMessageHandlerV2::new()));
        Self {
            helper,
            handlers,
            settings,
        }
    }

    fn handler_for(
        &self,
        version: &str,
    ) -> PluginAccessResult<&Arc<dyn ConfigRepoMessageHandler>> {
        self.handlers.get(version).ok_or_else(|| {
            PluginAccessError::handler_not_registered(format!(
                "The '{}' extension resolved version '{}' but no message handler covers it",
                CONFIG_REPO_EXTENSION, version
            ))
        })
    }

    /// Ask one plugin to parse a repository checkout
    pub async fn parse_directory(
        &self,
        plugin_id: &str,
        directory: &str,
        configurations: &[ConfigurationProperty],
    ) -> PluginAccessResult<ParsedDirectory> {
        let version = self.helper.resolve_version(plugin_id).await?;
        let handler = self.handler_for(&version)?;
        let request_body = handler.request_for_parse_directory(directory, configurations)?;
        let body = self
            .helper
            .submit_request(plugin_id, &version, REQUEST_PARSE_DIRECTORY, Some(request_body))
            .await?;
        handler.response_for_parse_directory(body.as_deref())
    }

    /// Ask one plugin what optional features it implements. Plugins resolved
    /// to 1.0 predate the handshake and report defaults without any traffic.
    pub async fn capabilities(&self, plugin_id: &str) -> PluginAccessResult<ConfigRepoCapabilities> {
        let version = self.helper.resolve_version(plugin_id).await?;
        if version == "1.0" {
            debug!(
                "Plugin '{}' resolved to config-repo 1.0, reporting default capabilities",
                plugin_id
            );
            return Ok(ConfigRepoCapabilities::default());
        }
        let handler = self.handler_for(&version)?;
        let body = self
            .helper
            .submit_request(plugin_id, &version, REQUEST_CAPABILITIES, None)
            .await?;
        handler.response_for_capabilities(body.as_deref())
    }

    /// Have the plugin validate settings an admin entered
    pub async fn validate_plugin_settings(
        &self,
        plugin_id: &str,
        configuration: &PluginSettingsConfiguration,
    ) -> PluginAccessResult<ValidationResult> {
        self.settings
            .validate(&self.helper, plugin_id, configuration)
            .await
    }

    /// Tell the plugin its saved settings changed (best effort)
    pub async fn notify_settings_change(
        &self,
        plugin_id: &str,
        settings: &HashMap<String, String>,
    ) -> PluginAccessResult<()> {
        self.settings
            .notify_settings_change(&self.helper, plugin_id, settings)
            .await
    }
}

#[async_trait]
impl SettingsAwareExtension for ConfigRepoExtension {
    fn extension_name(&self) -> &str {
        CONFIG_REPO_EXTENSION
    }

    async fn plugin_settings_configuration(
        &self,
        plugin_id: &str,
    ) -> PluginAccessResult<PluginSettingsConfiguration> {
        self.settings.configuration(&self.helper, plugin_id).await
    }

    async fn plugin_settings_view(&self, plugin_id: &str) -> PluginAccessResult<String> {
        self.settings.view(&self.helper, plugin_id).await
    }
}
