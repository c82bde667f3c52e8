//! Plugin Descriptors
//!
//! Immutable identity of a loaded plugin: its id and the protocol versions it
//! declares per extension point, plus the directory seam the server answers
//! plugin lookups through.

use std::collections::HashMap;

use async_trait::async_trait;

/// Identity and declared capabilities of one loaded plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginIdentity {
    id: String,
    extensions: HashMap<String, Vec<String>>,
}

impl PluginIdentity {
    /// Create a descriptor with no declared extensions
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            extensions: HashMap::new(),
        }
    }

    /// Declare an extension point with the protocol versions the plugin speaks
    pub fn with_extension<S: Into<String>>(mut self, extension_name: S, versions: &[&str]) -> Self {
        self.extensions.insert(
            extension_name.into(),
            versions.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn supports_extension(&self, extension_name: &str) -> bool {
        self.extensions.contains_key(extension_name)
    }

    /// Versions the plugin declared for an extension, in declaration order
    pub fn supported_versions(&self, extension_name: &str) -> Option<&[String]> {
        self.extensions.get(extension_name).map(Vec::as_slice)
    }

    /// Names of all declared extension points, sorted for stable output
    pub fn extension_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.extensions.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Lookup surface over the set of currently loaded plugins
#[async_trait]
pub trait PluginDirectory: Send + Sync {
    /// Find a plugin by id, if it is currently loaded
    async fn find_plugin(&self, plugin_id: &str) -> Option<PluginIdentity>;

    /// All loaded plugins that declare the given extension point
    async fn plugins_supporting(&self, extension_name: &str) -> Vec<PluginIdentity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_builder() {
        let identity = PluginIdentity::new("email.notifier")
            .with_extension("notification", &["1.0", "2.0"]);

        assert_eq!(identity.id(), "email.notifier");
        assert!(identity.supports_extension("notification"));
        assert!(!identity.supports_extension("config-repo"));
    }

    #[test]
    fn test_supported_versions_preserve_declaration_order() {
        let identity = PluginIdentity::new("email.notifier")
            .with_extension("notification", &["2.0", "1.0"]);

        assert_eq!(
            identity.supported_versions("notification"),
            Some(&["2.0".to_string(), "1.0".to_string()][..])
        );
        assert_eq!(identity.supported_versions("config-repo"), None);
    }

    #[test]
    fn test_extension_names_sorted() {
        let identity = PluginIdentity::new("multi")
            .with_extension("notification", &["1.0"])
            .with_extension("artifact-cleanup", &["1.0"])
            .with_extension("config-repo", &["2.0"]);

        assert_eq!(
            identity.extension_names(),
            vec!["artifact-cleanup", "config-repo", "notification"]
        );
    }
}
