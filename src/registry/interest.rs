//! Notification Interest Registry
//!
//! Which plugins asked for which notification names. Keyed by notification
//! name so dispatch ("who wants stage-status?") is one lookup. Updated by the
//! plugin monitor through load/unload callbacks, read by every notification
//! dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

/// Shared map of notification name to the plugins that want it
#[derive(Debug, Default)]
pub struct NotificationInterestRegistry {
    interests: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl Clone for NotificationInterestRegistry {
    fn clone(&self) -> Self {
        Self {
            interests: Arc::clone(&self.interests),
        }
    }
}

impl NotificationInterestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a plugin's interest in each named notification. Registering
    /// the same pair twice is idempotent; an empty list is a no-op.
    pub async fn register_plugin_interests(&self, plugin_id: &str, notification_names: &[String]) {
        if notification_names.is_empty() {
            return;
        }
        let mut interests = self.interests.write().await;
        for name in notification_names {
            interests
                .entry(name.clone())
                .or_default()
                .insert(plugin_id.to_string());
        }
    }

    /// Remove a plugin from every notification it signed up for. Unknown
    /// plugins are a no-op.
    pub async fn remove_plugin_interests(&self, plugin_id: &str) {
        let mut interests = self.interests.write().await;
        for plugins in interests.values_mut() {
            plugins.remove(plugin_id);
        }
        interests.retain(|_, plugins| !plugins.is_empty());
    }

    pub async fn is_any_plugin_interested_in(&self, notification_name: &str) -> bool {
        let interests = self.interests.read().await;
        interests
            .get(notification_name)
            .map(|plugins| !plugins.is_empty())
            .unwrap_or(false)
    }

    /// Plugins that asked for a notification; empty set for unknown names
    pub async fn plugins_interested_in(&self, notification_name: &str) -> HashSet<String> {
        let interests = self.interests.read().await;
        interests
            .get(notification_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Every notification name at least one plugin wants, sorted
    pub async fn notification_names(&self) -> Vec<String> {
        let interests = self.interests.read().await;
        let mut names: Vec<String> = interests.keys().cloned().collect();
        names.sort();
        names
    }

    /// Test teardown only
    pub async fn clear(&self) {
        let mut interests = self.interests.write().await;
        interests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_register_and_query() {
        let registry = NotificationInterestRegistry::new();
        registry
            .register_plugin_interests("email-plugin", &names(&["stage-status", "pipeline-status"]))
            .await;
        registry
            .register_plugin_interests("slack-plugin", &names(&["stage-status"]))
            .await;

        assert!(registry.is_any_plugin_interested_in("stage-status").await);
        let interested = registry.plugins_interested_in("stage-status").await;
        assert_eq!(interested.len(), 2);
        assert!(interested.contains("email-plugin"));
        assert!(interested.contains("slack-plugin"));

        let interested = registry.plugins_interested_in("pipeline-status").await;
        assert_eq!(interested.len(), 1);
        assert!(interested.contains("email-plugin"));
    }

    #[tokio::test]
    async fn test_unknown_name_answers_empty() {
        let registry = NotificationInterestRegistry::new();
        assert!(!registry.is_any_plugin_interested_in("agent-status").await);
        assert!(registry.plugins_interested_in("agent-status").await.is_empty());
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = NotificationInterestRegistry::new();
        let interests = names(&["stage-status"]);
        registry.register_plugin_interests("p", &interests).await;
        registry.register_plugin_interests("p", &interests).await;

        assert_eq!(registry.plugins_interested_in("stage-status").await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_interest_list_is_a_no_op() {
        let registry = NotificationInterestRegistry::new();
        registry.register_plugin_interests("p", &[]).await;
        assert!(registry.notification_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_only_touches_one_plugin() {
        let registry = NotificationInterestRegistry::new();
        registry
            .register_plugin_interests("email-plugin", &names(&["stage-status"]))
            .await;
        registry
            .register_plugin_interests("slack-plugin", &names(&["stage-status", "pipeline-status"]))
            .await;

        registry.remove_plugin_interests("slack-plugin").await;

        let interested = registry.plugins_interested_in("stage-status").await;
        assert_eq!(interested.len(), 1);
        assert!(interested.contains("email-plugin"));
        // pipeline-status lost its only subscriber
        assert!(!registry.is_any_plugin_interested_in("pipeline-status").await);
        assert_eq!(registry.notification_names().await, vec!["stage-status"]);
    }

    #[tokio::test]
    async fn test_remove_unknown_plugin_is_a_no_op() {
        let registry = NotificationInterestRegistry::new();
        registry
            .register_plugin_interests("p", &names(&["stage-status"]))
            .await;
        registry.remove_plugin_interests("never-registered").await;
        assert!(registry.is_any_plugin_interested_in("stage-status").await);
    }
}
