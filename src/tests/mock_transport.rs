//! Mock Plugin Host
//!
//! Scripted stand-in for the plugin transport and directory. Tests load it
//! with plugin identities and canned responses keyed by (plugin id, request
//! name); every submitted request is recorded for envelope assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::descriptor::{PluginDirectory, PluginIdentity};
use crate::error::{PluginAccessError, PluginAccessResult};
use crate::transport::{PluginApiRequest, PluginApiResponse, PluginTransport};

/// Scripted plugin host shared by extension and registrar tests
#[derive(Default)]
pub struct MockPluginHost {
    plugins: Mutex<Vec<PluginIdentity>>,
    responses: Mutex<HashMap<(String, String), PluginAccessResult<PluginApiResponse>>>,
    requests: Mutex<Vec<(String, PluginApiRequest)>>,
}

impl MockPluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a plugin visible to directory lookups
    pub fn add_plugin(&self, identity: PluginIdentity) {
        self.plugins.lock().unwrap().push(identity);
    }

    /// Script the response for one (plugin, request name) pair
    pub fn respond_with(&self, plugin_id: &str, request_name: &str, response: PluginApiResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert((plugin_id.to_string(), request_name.to_string()), Ok(response));
    }

    /// Script a transport-level failure for one (plugin, request name) pair
    pub fn fail_with(&self, plugin_id: &str, request_name: &str, error: PluginAccessError) {
        self.responses
            .lock()
            .unwrap()
            .insert((plugin_id.to_string(), request_name.to_string()), Err(error));
    }

    /// Every request submitted so far, in submission order
    pub fn recorded_requests(&self) -> Vec<(String, PluginApiRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PluginTransport for MockPluginHost {
    async fn submit(
        &self,
        plugin_id: &str,
        request: &PluginApiRequest,
    ) -> PluginAccessResult<PluginApiResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((plugin_id.to_string(), request.clone()));
        let responses = self.responses.lock().unwrap();
        match responses.get(&(plugin_id.to_string(), request.request_name().to_string())) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(error)) => Err(error.clone()),
            None => Err(PluginAccessError::transport_failure(format!(
                "no scripted response for '{}' from plugin '{}'",
                request.request_name(),
                plugin_id
            ))),
        }
    }
}

#[async_trait]
impl PluginDirectory for MockPluginHost {
    async fn find_plugin(&self, plugin_id: &str) -> Option<PluginIdentity> {
        self.plugins
            .lock()
            .unwrap()
            .iter()
            .find(|plugin| plugin.id() == plugin_id)
            .cloned()
    }

    async fn plugins_supporting(&self, extension_name: &str) -> Vec<PluginIdentity> {
        self.plugins
            .lock()
            .unwrap()
            .iter()
            .filter(|plugin| plugin.supports_extension(extension_name))
            .cloned()
            .collect()
    }
}
