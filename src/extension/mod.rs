//! Extension Points
//!
//! One module per extension point, plus the request plumbing they all share.
//! An extension resolves the protocol version for a plugin, builds the
//! request body through the message handler registered for that version,
//! submits it over the plugin transport, and parses the response back into a
//! domain result with the same handler.

pub mod artifact_cleanup;
pub mod config_repo;
pub mod notification;
pub mod settings;

use std::sync::Arc;

use log::debug;

use crate::descriptor::{PluginDirectory, PluginIdentity};
use crate::error::{PluginAccessError, PluginAccessResult};
use crate::transport::{PluginApiRequest, PluginTransport};
use crate::version::resolve_extension_version;

/// Extension point identifier for stage notifications
pub const NOTIFICATION_EXTENSION: &str = "notification";

/// Extension point identifier for pipeline-as-code repositories
pub const CONFIG_REPO_EXTENSION: &str = "config-repo";

/// Extension point identifier for artifact retention plugins
pub const ARTIFACT_CLEANUP_EXTENSION: &str = "artifact-cleanup";

/// Reject absent or blank response bodies where the contract requires one
pub(crate) fn required_body(body: Option<&str>) -> PluginAccessResult<&str> {
    match body {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(PluginAccessError::malformed_response("Empty response body")),
    }
}

/// Request plumbing shared by every extension point: version resolution,
/// envelope construction, and transport submission.
pub struct PluginRequestHelper {
    transport: Arc<dyn PluginTransport>,
    directory: Arc<dyn PluginDirectory>,
    extension_name: String,
    supported_versions: Vec<String>,
}

impl PluginRequestHelper {
    pub fn new(
        transport: Arc<dyn PluginTransport>,
        directory: Arc<dyn PluginDirectory>,
        extension_name: &str,
        supported_versions: &[&str],
    ) -> Self {
        Self {
            transport,
            directory,
            extension_name: extension_name.to_string(),
            supported_versions: supported_versions.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn extension_name(&self) -> &str {
        &self.extension_name
    }

    pub fn supported_versions(&self) -> &[String] {
        &self.supported_versions
    }

    /// Resolve the protocol version to speak with one plugin. Fails before
    /// any transport traffic when the plugin is unknown or incompatible.
    pub async fn resolve_version(&self, plugin_id: &str) -> PluginAccessResult<String> {
        let identity = self
            .directory
            .find_plugin(plugin_id)
            .await
            .ok_or_else(|| PluginAccessError::plugin_not_found(plugin_id))?;
        let declared = identity
            .supported_versions(&self.extension_name)
            .unwrap_or(&[]);
        resolve_extension_version(
            plugin_id,
            &self.extension_name,
            &self.supported_versions,
            declared,
        )
    }

    /// All loaded plugins declaring this extension point
    pub async fn plugins_supporting(&self) -> Vec<PluginIdentity> {
        self.directory.plugins_supporting(&self.extension_name).await
    }

    /// Submit a named request at an already-resolved version and hand back
    /// the response body. A non-2xx answer is a transport failure.
    pub async fn submit_request(
        &self,
        plugin_id: &str,
        version: &str,
        request_name: &str,
        request_body: Option<String>,
    ) -> PluginAccessResult<Option<String>> {
        let request =
            PluginApiRequest::new(&self.extension_name, version, request_name, request_body);
        debug!(
            "Submitting '{}' to plugin '{}' ({} {})",
            request_name, plugin_id, self.extension_name, version
        );
        let response = self.transport.submit(plugin_id, &request).await?;
        if !response.is_success() {
            return Err(PluginAccessError::transport_failure(format!(
                "The plugin sent a response that could not be understood by the server. Plugin returned with code '{}' and the following response: '{}'",
                response.response_code(),
                response.response_body().unwrap_or("")
            )));
        }
        Ok(response.response_body().map(|body| body.to_string()))
    }
}
