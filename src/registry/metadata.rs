//! Plugin Settings Metadata Store
//!
//! Process-wide map from plugin id to the settings schema it exposed at load
//! time. One writer (the plugin monitor) mutates it through load/unload
//! callbacks while request threads read it concurrently, so the store clones
//! cheaply and every clone shares the same underlying state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::extension::settings::PluginSettingsConfiguration;

/// Settings schema one plugin exposed at load time, together with the
/// extension point that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettingsMetadata {
    pub configuration: PluginSettingsConfiguration,
    pub template: String,
    pub extension_name: String,
}

impl PluginSettingsMetadata {
    pub fn new<T: Into<String>, E: Into<String>>(
        configuration: PluginSettingsConfiguration,
        template: T,
        extension_name: E,
    ) -> Self {
        Self {
            configuration,
            template: template.into(),
            extension_name: extension_name.into(),
        }
    }
}

/// Shared store of settings metadata for all loaded plugins
#[derive(Debug, Default)]
pub struct PluginSettingsMetadataStore {
    entries: Arc<RwLock<HashMap<String, PluginSettingsMetadata>>>,
}

impl Clone for PluginSettingsMetadataStore {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl PluginSettingsMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a plugin's settings metadata, replacing any earlier entry
    pub async fn add_metadata(&self, plugin_id: &str, metadata: PluginSettingsMetadata) {
        let mut entries = self.entries.write().await;
        entries.insert(plugin_id.to_string(), metadata);
    }

    /// Drop a plugin's entry. Unknown plugins are a no-op.
    pub async fn remove_metadata(&self, plugin_id: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(plugin_id);
    }

    pub async fn has_plugin(&self, plugin_id: &str) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(plugin_id)
    }

    pub async fn configuration(&self, plugin_id: &str) -> Option<PluginSettingsConfiguration> {
        let entries = self.entries.read().await;
        entries
            .get(plugin_id)
            .map(|metadata| metadata.configuration.clone())
    }

    pub async fn template(&self, plugin_id: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries.get(plugin_id).map(|metadata| metadata.template.clone())
    }

    /// Name of the extension point that owns this plugin's settings
    pub async fn extension_owning(&self, plugin_id: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(plugin_id)
            .map(|metadata| metadata.extension_name.clone())
    }

    /// Ids of every plugin with stored metadata, sorted for stable output
    pub async fn plugin_ids(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut ids: Vec<String> = entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Test teardown only
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::settings::PluginSettingsProperty;

    fn metadata(template: &str, extension_name: &str) -> PluginSettingsMetadata {
        let mut configuration = PluginSettingsConfiguration::new();
        configuration.add(PluginSettingsProperty::new("url"));
        PluginSettingsMetadata::new(configuration, template, extension_name)
    }

    #[tokio::test]
    async fn test_add_and_query_metadata() {
        let store = PluginSettingsMetadataStore::new();
        store
            .add_metadata("email.notifier", metadata("<div/>", "notification"))
            .await;

        assert!(store.has_plugin("email.notifier").await);
        assert_eq!(store.template("email.notifier").await.as_deref(), Some("<div/>"));
        assert_eq!(
            store.extension_owning("email.notifier").await.as_deref(),
            Some("notification")
        );
        assert_eq!(
            store
                .configuration("email.notifier")
                .await
                .unwrap()
                .get("url")
                .unwrap()
                .key,
            "url"
        );
    }

    #[tokio::test]
    async fn test_missing_plugin_answers_none() {
        let store = PluginSettingsMetadataStore::new();
        assert!(!store.has_plugin("unknown").await);
        assert_eq!(store.configuration("unknown").await, None);
        assert_eq!(store.template("unknown").await, None);
        assert_eq!(store.extension_owning("unknown").await, None);
    }

    #[tokio::test]
    async fn test_add_overwrites_earlier_entry() {
        let store = PluginSettingsMetadataStore::new();
        store
            .add_metadata("p", metadata("<old/>", "notification"))
            .await;
        store
            .add_metadata("p", metadata("<new/>", "config-repo"))
            .await;

        assert_eq!(store.template("p").await.as_deref(), Some("<new/>"));
        assert_eq!(store.extension_owning("p").await.as_deref(), Some("config-repo"));
        assert_eq!(store.plugin_ids().await, vec!["p"]);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = PluginSettingsMetadataStore::new();
        store.add_metadata("a", metadata("<a/>", "notification")).await;
        store.add_metadata("b", metadata("<b/>", "notification")).await;

        store.remove_metadata("a").await;
        store.remove_metadata("never-added").await;
        assert_eq!(store.plugin_ids().await, vec!["b"]);

        store.clear().await;
        assert!(store.plugin_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = PluginSettingsMetadataStore::new();
        let clone = store.clone();
        store.add_metadata("p", metadata("<p/>", "notification")).await;

        assert!(clone.has_plugin("p").await);
    }
}
