//! Plugin Access Errors
//!
//! Error taxonomy for version negotiation, wire handling, and registry upkeep.

use thiserror::Error;

/// Result type for plugin access operations
pub type PluginAccessResult<T> = Result<T, PluginAccessError>;

/// Errors raised while talking to plugins or maintaining plugin registries
#[derive(Error, Debug, Clone)]
pub enum PluginAccessError {
    /// No protocol version is supported by both the server and the plugin
    #[error("Incompatible extension version: {message}")]
    IncompatibleVersion { message: String },

    /// A version was resolved but no message handler covers it
    #[error("No message handler registered: {message}")]
    HandlerNotRegistered { message: String },

    /// The plugin's response body does not match the wire contract
    #[error("Unable to de-serialize json response. {message}")]
    MalformedResponse { message: String },

    /// The request never completed or the plugin answered with a failure code
    #[error("Plugin transport failure: {message}")]
    TransportFailure { message: String },

    /// More than one extension claims the same plugin's settings
    #[error("Duplicate plugin settings owner: {message}")]
    DuplicateSettingsOwner { message: String },

    /// Plugin not known to the server
    #[error("Plugin not found: {plugin_id}")]
    PluginNotFound { plugin_id: String },

    /// Unsubscribe presented a handle nobody holds
    #[error("Listener not registered: {message}")]
    ListenerNotRegistered { message: String },
}

impl PluginAccessError {
    /// Create an incompatible version error
    pub fn incompatible_version<S: Into<String>>(message: S) -> Self {
        Self::IncompatibleVersion { message: message.into() }
    }

    /// Create a handler not registered error
    pub fn handler_not_registered<S: Into<String>>(message: S) -> Self {
        Self::HandlerNotRegistered { message: message.into() }
    }

    /// Create a malformed response error. The message is the cause only;
    /// the de-serialization preamble is part of the display form.
    pub fn malformed_response<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse { message: message.into() }
    }

    /// Create a transport failure error
    pub fn transport_failure<S: Into<String>>(message: S) -> Self {
        Self::TransportFailure { message: message.into() }
    }

    /// Create a duplicate settings owner error
    pub fn duplicate_settings_owner<S: Into<String>>(message: S) -> Self {
        Self::DuplicateSettingsOwner { message: message.into() }
    }

    /// Create a plugin not found error
    pub fn plugin_not_found<S: Into<String>>(plugin_id: S) -> Self {
        Self::PluginNotFound { plugin_id: plugin_id.into() }
    }

    /// Create a listener not registered error
    pub fn listener_not_registered<S: Into<String>>(message: S) -> Self {
        Self::ListenerNotRegistered { message: message.into() }
    }

    /// Check if the error concerns a single plugin and can be skipped in
    /// best-effort fan-out
    pub fn is_recoverable(&self) -> bool {
        matches!(self,
            PluginAccessError::MalformedResponse { .. } |
            PluginAccessError::TransportFailure { .. } |
            PluginAccessError::PluginNotFound { .. }
        )
    }

    /// Anything not recoverable must never be swallowed by fan-out
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Check if the error is a server wiring mistake that must propagate
    pub fn is_configuration_error(&self) -> bool {
        matches!(self,
            PluginAccessError::HandlerNotRegistered { .. } |
            PluginAccessError::DuplicateSettingsOwner { .. }
        )
    }

    /// Check if the error came from version negotiation
    pub fn is_version_error(&self) -> bool {
        matches!(self, PluginAccessError::IncompatibleVersion { .. })
    }
}

impl From<serde_json::Error> for PluginAccessError {
    fn from(err: serde_json::Error) -> Self {
        PluginAccessError::malformed_response(format!("Invalid JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = PluginAccessError::incompatible_version("no mutual version");
        assert!(matches!(error, PluginAccessError::IncompatibleVersion { .. }));
        assert!(error.to_string().contains("no mutual version"));
    }

    #[test]
    fn test_error_classification() {
        let handler_error = PluginAccessError::handler_not_registered("no handler for 3.0");
        assert!(handler_error.is_configuration_error());
        assert!(!handler_error.is_recoverable());

        let transport_error = PluginAccessError::transport_failure("connection reset");
        assert!(transport_error.is_recoverable());
        assert!(!transport_error.is_fatal());
        assert!(!transport_error.is_configuration_error());

        let version_error = PluginAccessError::incompatible_version("none mutual");
        assert!(version_error.is_version_error());
        assert!(!version_error.is_recoverable());
        assert!(!version_error.is_configuration_error());

        let owner_error = PluginAccessError::duplicate_settings_owner("two owners");
        assert!(owner_error.is_configuration_error());
        assert!(owner_error.is_fatal());
    }

    #[test]
    fn test_error_conversions() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: PluginAccessError = json_error.into();
        assert!(matches!(error, PluginAccessError::MalformedResponse { .. }));
        assert!(error.to_string().starts_with("Unable to de-serialize json response. Invalid JSON:"));
    }

    #[test]
    fn test_error_display() {
        let error = PluginAccessError::plugin_not_found("email.notifier");
        assert_eq!(error.to_string(), "Plugin not found: email.notifier");

        let error = PluginAccessError::malformed_response("Empty response body");
        assert_eq!(error.to_string(), "Unable to de-serialize json response. Empty response body");
    }

    #[test]
    fn test_all_error_variants() {
        // Every constructor should produce a displayable error
        let errors = vec![
            PluginAccessError::incompatible_version("version"),
            PluginAccessError::handler_not_registered("handler"),
            PluginAccessError::malformed_response("body"),
            PluginAccessError::transport_failure("transport"),
            PluginAccessError::duplicate_settings_owner("owner"),
            PluginAccessError::plugin_not_found("plugin"),
            PluginAccessError::listener_not_registered("listener"),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
