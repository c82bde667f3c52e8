//! Artifact-Cleanup Extension
//!
//! Lets plugins take over artifact retention for the stages they name. The
//! interesting operation is the fan-out across every cleanup plugin, where
//! one misbehaving plugin must never block the rest.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde_json::Value;

use crate::descriptor::PluginDirectory;
use crate::error::{PluginAccessError, PluginAccessResult};
use crate::transport::PluginTransport;

use super::settings::{
    PluginSettingsConfiguration, PluginSettingsMessageHandlerV1, PluginSettingsMessageHandlerV2,
    SettingsAwareExtension, SettingsRequestSupport, ValidationResult,
};
use super::{required_body, PluginRequestHelper, ARTIFACT_CLEANUP_EXTENSION};

/// Ask a plugin which stages it manages artifact retention for
pub const REQUEST_STAGES_FOR_CLEANUP: &str = "stages-for-artifact-cleanup";

/// Protocol versions the server speaks for this extension point
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// A stage a plugin has claimed artifact retention for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfiguration {
    pub pipeline_name: String,
    pub stage_name: String,
}

impl StageConfiguration {
    pub fn new<P: Into<String>, S: Into<String>>(pipeline_name: P, stage_name: S) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            stage_name: stage_name.into(),
        }
    }
}

/// Version-specific deserializer for artifact-cleanup messages
pub trait ArtifactCleanupMessageHandler: Send + Sync {
    fn response_for_stage_configurations(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<Vec<StageConfiguration>>;
}

/// Artifact-cleanup wire format, version 1.0
#[derive(Debug, Default)]
pub struct ArtifactCleanupMessageHandlerV1;

impl ArtifactCleanupMessageHandlerV1 {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactCleanupMessageHandler for ArtifactCleanupMessageHandlerV1 {
    fn response_for_stage_configurations(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<Vec<StageConfiguration>> {
        let text = required_body(body)?;
        let value: Value = serde_json::from_str(text)?;
        let entries = value.as_array().ok_or_else(|| {
            PluginAccessError::malformed_response(
                "Stage configurations should be returned as a list of map",
            )
        })?;

        let mut stages = Vec::new();
        for entry in entries {
            let stage = entry.as_object().ok_or_else(|| {
                PluginAccessError::malformed_response(
                    "Stage configurations should be returned as a list of map",
                )
            })?;
            let pipeline_name = stage
                .get("pipeline-name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    PluginAccessError::malformed_response("'pipeline-name' is a required field")
                })?;
            let stage_name = stage
                .get("stage-name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    PluginAccessError::malformed_response("'stage-name' is a required field")
                })?;
            stages.push(StageConfiguration::new(pipeline_name, stage_name));
        }
        Ok(stages)
    }
}

/// Talks to plugins implementing the artifact-cleanup extension point
pub struct ArtifactCleanupExtension {
    helper: PluginRequestHelper,
    handlers: HashMap<String, Arc<dyn ArtifactCleanupMessageHandler>>,
    settings: SettingsRequestSupport,
}

impl ArtifactCleanupExtension {
    pub fn new(transport: Arc<dyn PluginTransport>, directory: Arc<dyn PluginDirectory>) -> Self {
        let helper = PluginRequestHelper::new(
            transport,
            directory,
            ARTIFACT_CLEANUP_EXTENSION,
            SUPPORTED_VERSIONS,
        );
        let mut handlers: HashMap<String, Arc<dyn ArtifactCleanupMessageHandler>> = HashMap::new();
        handlers.insert(
            "1.0".to_string(),
            Arc::new(ArtifactCleanupMessageHandlerV1::new()),
        );
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
    ) -> PluginAccessResult<&Arc<dyn ArtifactCleanupMessageHandler>> {
        self.handlers.get(version).ok_or_else(|| {
            PluginAccessError::handler_not_registered(format!(
                "The '{}' extension resolved version '{}' but no message handler covers it",
                ARTIFACT_CLEANUP_EXTENSION, version
            ))
        })
    }

    /// Stages one plugin claims artifact retention for. Failures propagate.
    pub async fn stages_for_plugin(
        &self,
        plugin_id: &str,
    ) -> PluginAccessResult<Vec<StageConfiguration>> {
        let version = self.helper.resolve_version(plugin_id).await?;
        let handler = self.handler_for(&version)?;
        let body = self
            .helper
            .submit_request(plugin_id, &version, REQUEST_STAGES_FOR_CLEANUP, None)
            .await?;
        handler.response_for_stage_configurations(body.as_deref())
    }

    /// Stages claimed by every plugin currently implementing the extension,
    /// concatenated in plugin order. A failing plugin is logged and skipped;
    /// this operation itself never fails.
    pub async fn list_all_stages(&self) -> Vec<StageConfiguration> {
        let plugins = self.helper.plugins_supporting().await;
        let mut all_stages = Vec::new();
        for plugin in plugins {
            match self.stages_for_plugin(plugin.id()).await {
                Ok(mut stages) => all_stages.append(&mut stages),
                Err(error) => {
                    warn!(
                        "Skipping artifact-cleanup plugin '{}': {}",
                        plugin.id(),
                        error
                    );
                }
            }
        }
        all_stages
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
impl SettingsAwareExtension for ArtifactCleanupExtension {
    fn extension_name(&self) -> &str {
        ARTIFACT_CLEANUP_EXTENSION
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
