//! Plugin Transport
//!
//! Request and response envelopes exchanged with plugins, and the transport
//! seam that carries them to whatever hosts the plugin code.

use async_trait::async_trait;

use crate::error::PluginAccessResult;

/// Response code a plugin returns for a handled request
pub const SUCCESS_RESPONSE_CODE: u16 = 200;

/// Response code a plugin returns when it failed internally
pub const INTERNAL_ERROR_RESPONSE_CODE: u16 = 500;

/// One request addressed to a plugin, tagged with the extension point and the
/// negotiated protocol version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginApiRequest {
    extension: String,
    extension_version: String,
    request_name: String,
    request_body: Option<String>,
}

impl PluginApiRequest {
    pub fn new(
        extension: &str,
        extension_version: &str,
        request_name: &str,
        request_body: Option<String>,
    ) -> Self {
        Self {
            extension: extension.to_string(),
            extension_version: extension_version.to_string(),
            request_name: request_name.to_string(),
            request_body,
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn extension_version(&self) -> &str {
        &self.extension_version
    }

    pub fn request_name(&self) -> &str {
        &self.request_name
    }

    pub fn request_body(&self) -> Option<&str> {
        self.request_body.as_deref()
    }
}

/// What a plugin answered: a numeric code plus an optional JSON body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginApiResponse {
    response_code: u16,
    response_body: Option<String>,
}

impl PluginApiResponse {
    pub fn new(response_code: u16, response_body: Option<String>) -> Self {
        Self {
            response_code,
            response_body,
        }
    }

    /// Successful response carrying a body
    pub fn success<S: Into<String>>(response_body: S) -> Self {
        Self::new(SUCCESS_RESPONSE_CODE, Some(response_body.into()))
    }

    pub fn response_code(&self) -> u16 {
        self.response_code
    }

    pub fn response_body(&self) -> Option<&str> {
        self.response_body.as_deref()
    }

    /// Any 2xx code counts as success
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.response_code)
    }
}

/// Delivery seam between the server and plugin code
#[async_trait]
pub trait PluginTransport: Send + Sync {
    /// Submit a request to the named plugin and wait for its response
    async fn submit(
        &self,
        plugin_id: &str,
        request: &PluginApiRequest,
    ) -> PluginAccessResult<PluginApiResponse>;
}
