//! Notification Extension
//!
//! Asks plugins which notifications they care about and delivers stage
//! transition events. Version 1.0 sends a flat payload; 2.0 nests the stage
//! inside its pipeline. Both versions answer with the same status envelope,
//! which the 2.0 handler parses by delegating to 1.0.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::descriptor::PluginDirectory;
use crate::error::{PluginAccessError, PluginAccessResult};
use crate::transport::PluginTransport;

use super::settings::{
    PluginSettingsConfiguration, PluginSettingsMessageHandlerV1, PluginSettingsMessageHandlerV2,
    SettingsAwareExtension, SettingsRequestSupport, ValidationResult,
};
use super::{required_body, PluginRequestHelper, NOTIFICATION_EXTENSION};

/// Ask a plugin which notification names it wants delivered
pub const REQUEST_NOTIFICATIONS_INTERESTED_IN: &str = "notifications-interested-in";

/// Notification name (and request name) for stage transitions
pub const STAGE_STATUS_NOTIFICATION: &str = "stage-status";

/// Protocol versions the server speaks for this extension point
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0", "2.0"];

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A stage transition reported to interested plugins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageNotification {
    pub pipeline_name: String,
    pub pipeline_counter: u32,
    pub stage_name: String,
    pub stage_counter: u32,
    pub state: String,
    pub result: String,
    pub create_time: DateTime<Utc>,
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// What a plugin reported back for one delivered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    successful: bool,
    messages: Vec<String>,
}

impl NotificationResult {
    pub fn new(successful: bool, messages: Vec<String>) -> Self {
        Self {
            successful,
            messages,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

/// Version-specific serializer/deserializer for notification messages
pub trait NotificationMessageHandler: Send + Sync {
    fn response_for_notifications_interested_in(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<Vec<String>>;

    fn request_for_notify(&self, notification: &StageNotification) -> PluginAccessResult<String>;

    fn response_for_notify(&self, body: Option<&str>) -> PluginAccessResult<NotificationResult>;
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(DATE_FORMAT).to_string()
}

#[derive(Serialize)]
struct StageStatusWireV1<'a> {
    #[serde(rename = "pipeline-name")]
    pipeline_name: &'a str,
    #[serde(rename = "pipeline-counter")]
    pipeline_counter: u32,
    #[serde(rename = "stage-name")]
    stage_name: &'a str,
    #[serde(rename = "stage-counter")]
    stage_counter: u32,
    #[serde(rename = "stage-state")]
    stage_state: &'a str,
    #[serde(rename = "stage-result")]
    stage_result: &'a str,
    #[serde(rename = "create-time")]
    create_time: String,
    #[serde(rename = "last-transition-time", skip_serializing_if = "Option::is_none")]
    last_transition_time: Option<String>,
}

/// Notification wire format, version 1.0: flat kebab-case stage payload
#[derive(Debug, Default)]
pub struct NotificationMessageHandlerV1;

impl NotificationMessageHandlerV1 {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationMessageHandler for NotificationMessageHandlerV1 {
    fn response_for_notifications_interested_in(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<Vec<String>> {
        let text = required_body(body)?;
        let value: Value = serde_json::from_str(text)?;
        let interests = value.as_object().ok_or_else(|| {
            PluginAccessError::malformed_response(
                "'notifications' should be of type list of string",
            )
        })?;
        match interests.get("notifications") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        PluginAccessError::malformed_response(
                            "'notifications' should be of type list of string",
                        )
                    })
                })
                .collect(),
            Some(_) => Err(PluginAccessError::malformed_response(
                "'notifications' should be of type list of string",
            )),
        }
    }

    fn request_for_notify(&self, notification: &StageNotification) -> PluginAccessResult<String> {
        let wire = StageStatusWireV1 {
            pipeline_name: &notification.pipeline_name,
            pipeline_counter: notification.pipeline_counter,
            stage_name: &notification.stage_name,
            stage_counter: notification.stage_counter,
            stage_state: &notification.state,
            stage_result: &notification.result,
            create_time: format_timestamp(&notification.create_time),
            last_transition_time: notification
                .last_transition_time
                .as_ref()
                .map(format_timestamp),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    fn response_for_notify(&self, body: Option<&str>) -> PluginAccessResult<NotificationResult> {
        let text = required_body(body)?;
        let value: Value = serde_json::from_str(text)?;
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .filter(|status| !status.is_empty())
            .ok_or_else(|| {
                PluginAccessError::malformed_response("'status' is a required field")
            })?;
        let successful = status.eq_ignore_ascii_case("success");

        let messages = match value.get("messages") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        PluginAccessError::malformed_response(
                            "'messages' should be of type list of string",
                        )
                    })
                })
                .collect::<PluginAccessResult<Vec<String>>>()?,
            Some(_) => {
                return Err(PluginAccessError::malformed_response(
                    "'messages' should be of type list of string",
                ))
            }
        };
        Ok(NotificationResult::new(successful, messages))
    }
}

#[derive(Serialize)]
struct StageStatusWireV2<'a> {
    pipeline: PipelineWireV2<'a>,
}

#[derive(Serialize)]
struct PipelineWireV2<'a> {
    name: &'a str,
    counter: u32,
    stage: StageWireV2<'a>,
}

#[derive(Serialize)]
struct StageWireV2<'a> {
    name: &'a str,
    counter: u32,
    state: &'a str,
    result: &'a str,
    #[serde(rename = "create-time")]
    create_time: String,
    #[serde(rename = "last-transition-time", skip_serializing_if = "Option::is_none")]
    last_transition_time: Option<String>,
}

/// Notification wire format, version 2.0: the stage rides inside its
/// pipeline. Responses did not change, so parsing delegates to 1.0.
#[derive(Debug, Default)]
pub struct NotificationMessageHandlerV2 {
    delegate: NotificationMessageHandlerV1,
}

impl NotificationMessageHandlerV2 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationMessageHandler for NotificationMessageHandlerV2 {
    fn response_for_notifications_interested_in(
        &self,
        body: Option<&str>,
    ) -> PluginAccessResult<Vec<String>> {
        self.delegate.response_for_notifications_interested_in(body)
    }

    fn request_for_notify(&self, notification: &StageNotification) -> PluginAccessResult<String> {
        let wire = StageStatusWireV2 {
            pipeline: PipelineWireV2 {
                name: &notification.pipeline_name,
                counter: notification.pipeline_counter,
                stage: StageWireV2 {
                    name: &notification.stage_name,
                    counter: notification.stage_counter,
                    state: &notification.state,
                    result: &notification.result,
                    create_time: format_timestamp(&notification.create_time),
                    last_transition_time: notification
                        .last_transition_time
                        .as_ref()
                        .map(format_timestamp),
                },
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }

    fn response_for_notify(&self, body: Option<&str>) -> PluginAccessResult<NotificationResult> {
        self.delegate.response_for_notify(body)
    }
}

/// Talks to plugins implementing the notification extension point
pub struct NotificationExtension {
    helper: PluginRequestHelper,
    handlers: HashMap<String, Arc<dyn NotificationMessageHandler>>,
    settings: SettingsRequestSupport,
}

impl NotificationExtension {
    pub fn new(transport: Arc<dyn PluginTransport>, directory: Arc<dyn PluginDirectory>) -> Self {
        let helper = PluginRequestHelper::new(
            transport,
            directory,
            NOTIFICATION_EXTENSION,
            SUPPORTED_VERSIONS,
        );
        let mut handlers: HashMap<String, Arc<dyn NotificationMessageHandler>> = HashMap::new();
        handlers.insert("1.0".to_string(), Arc::new(NotificationMessageHandlerV1::new()));
        handlers.insert("2.0".to_string(), Arc::new(NotificationMessageHandlerV2::new()));
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
    ) -> PluginAccessResult<&Arc<dyn NotificationMessageHandler>> {
        self.handlers.get(version).ok_or_else(|| {
            PluginAccessError::handler_not_registered(format!(
                "The '{}' extension resolved version '{}' but no message handler covers it",
                NOTIFICATION_EXTENSION, version
            ))
        })
    }

    /// Ask one plugin which notification names it wants delivered
    pub async fn notifications_interested_in(
        &self,
        plugin_id: &str,
    ) -> PluginAccessResult<Vec<String>> {
        let version = self.helper.resolve_version(plugin_id).await?;
        let handler = self.handler_for(&version)?;
        let body = self
            .helper
            .submit_request(plugin_id, &version, REQUEST_NOTIFICATIONS_INTERESTED_IN, None)
            .await?;
        handler.response_for_notifications_interested_in(body.as_deref())
    }

    /// Deliver one notification to one plugin and parse its verdict
    pub async fn notify(
        &self,
        plugin_id: &str,
        request_name: &str,
        notification: &StageNotification,
    ) -> PluginAccessResult<NotificationResult> {
        let version = self.helper.resolve_version(plugin_id).await?;
        let handler = self.handler_for(&version)?;
        let request_body = handler.request_for_notify(notification)?;
        let body = self
            .helper
            .submit_request(plugin_id, &version, request_name, Some(request_body))
            .await?;
        handler.response_for_notify(body.as_deref())
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
impl SettingsAwareExtension for NotificationExtension {
    fn extension_name(&self) -> &str {
        NOTIFICATION_EXTENSION
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
