//! Shared integration test support: a scripted plugin host implementing the
//! public transport and directory seams.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use conveyor_plugin_access::{
    PluginAccessError, PluginAccessResult, PluginApiRequest, PluginApiResponse, PluginDirectory,
    PluginIdentity, PluginTransport,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Plugin host loaded with identities and canned responses keyed by
/// (plugin id, request name). Unscripted requests fail like a dead plugin.
#[derive(Default)]
pub struct ScriptedPluginHost {
    plugins: Mutex<Vec<PluginIdentity>>,
    responses: Mutex<HashMap<(String, String), PluginAccessResult<PluginApiResponse>>>,
    requests: Mutex<Vec<(String, PluginApiRequest)>>,
}

impl ScriptedPluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plugin(&self, identity: PluginIdentity) {
        self.plugins.lock().unwrap().push(identity);
    }

    pub fn respond_with(&self, plugin_id: &str, request_name: &str, response: PluginApiResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert((plugin_id.to_string(), request_name.to_string()), Ok(response));
    }

    pub fn fail_with(&self, plugin_id: &str, request_name: &str, error: PluginAccessError) {
        self.responses
            .lock()
            .unwrap()
            .insert((plugin_id.to_string(), request_name.to_string()), Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<(String, PluginApiRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PluginTransport for ScriptedPluginHost {
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
impl PluginDirectory for ScriptedPluginHost {
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
