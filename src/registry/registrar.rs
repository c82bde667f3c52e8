//! Plugin Change Listeners
//!
//! The callback contract plugin load/unload events arrive on, a notifier
//! with an explicit subscribe/unsubscribe lifecycle, and the two listeners
//! that keep the process-wide registries in step with loaded plugins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::sync::RwLock;

use crate::descriptor::PluginIdentity;
use crate::error::{PluginAccessError, PluginAccessResult};
use crate::extension::notification::NotificationExtension;
use crate::extension::settings::SettingsAwareExtension;
use crate::extension::NOTIFICATION_EXTENSION;
use crate::registry::interest::NotificationInterestRegistry;
use crate::registry::metadata::{PluginSettingsMetadata, PluginSettingsMetadataStore};

/// Callbacks the plugin monitor fires when plugins come and go
#[async_trait]
pub trait PluginChangeListener: Send + Sync {
    async fn plugin_loaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()>;

    async fn plugin_unloaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()>;
}

/// Proof of one subscription; hand it back to unsubscribe
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ListenerRegistration {
    id: u64,
}

/// Fan-out point for plugin load/unload events. Delivery order is
/// subscription order, over a snapshot taken when the event fires.
#[derive(Default)]
pub struct PluginChangeNotifier {
    listeners: Arc<RwLock<Vec<(u64, Arc<dyn PluginChangeListener>)>>>,
    next_id: Arc<AtomicU64>,
}

impl Clone for PluginChangeNotifier {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl PluginChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener and hand back the registration that removes it again
    pub async fn subscribe(&self, listener: Arc<dyn PluginChangeListener>) -> ListenerRegistration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.listeners.write().await;
        listeners.push((id, listener));
        ListenerRegistration { id }
    }

    /// Remove a previously subscribed listener
    pub async fn unsubscribe(&self, registration: ListenerRegistration) -> PluginAccessResult<()> {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != registration.id);
        if listeners.len() == before {
            return Err(PluginAccessError::listener_not_registered(format!(
                "no listener is subscribed under handle {}",
                registration.id
            )));
        }
        Ok(())
    }

    pub async fn listener_count(&self) -> usize {
        let listeners = self.listeners.read().await;
        listeners.len()
    }

    /// Tell every listener a plugin loaded. A recoverable listener failure
    /// is logged and the loop continues; a fatal one propagates immediately.
    pub async fn notify_plugin_loaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()> {
        for listener in self.snapshot().await {
            if let Err(listener_error) = listener.plugin_loaded(plugin).await {
                if listener_error.is_fatal() {
                    error!(
                        "Listener failed handling load of plugin '{}': {}",
                        plugin.id(),
                        listener_error
                    );
                    return Err(listener_error);
                }
                warn!(
                    "Listener failed handling load of plugin '{}': {}",
                    plugin.id(),
                    listener_error
                );
            }
        }
        Ok(())
    }

    /// Tell every listener a plugin unloaded, with the same failure policy
    /// as [`notify_plugin_loaded`](Self::notify_plugin_loaded)
    pub async fn notify_plugin_unloaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()> {
        for listener in self.snapshot().await {
            if let Err(listener_error) = listener.plugin_unloaded(plugin).await {
                if listener_error.is_fatal() {
                    error!(
                        "Listener failed handling unload of plugin '{}': {}",
                        plugin.id(),
                        listener_error
                    );
                    return Err(listener_error);
                }
                warn!(
                    "Listener failed handling unload of plugin '{}': {}",
                    plugin.id(),
                    listener_error
                );
            }
        }
        Ok(())
    }

    async fn snapshot(&self) -> Vec<Arc<dyn PluginChangeListener>> {
        let listeners = self.listeners.read().await;
        listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// Keeps the notification interest registry in step with plugin lifecycle
pub struct NotificationPluginRegistrar {
    extension: Arc<NotificationExtension>,
    registry: NotificationInterestRegistry,
}

impl NotificationPluginRegistrar {
    pub fn new(extension: Arc<NotificationExtension>, registry: NotificationInterestRegistry) -> Self {
        Self {
            extension,
            registry,
        }
    }
}

#[async_trait]
impl PluginChangeListener for NotificationPluginRegistrar {
    async fn plugin_loaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()> {
        if !plugin.supports_extension(NOTIFICATION_EXTENSION) {
            return Ok(());
        }
        // Remove first so a reload replaces stale interests
        self.registry.remove_plugin_interests(plugin.id()).await;
        match self.extension.notifications_interested_in(plugin.id()).await {
            Ok(interests) => {
                debug!("Plugin '{}' asked for notifications {:?}", plugin.id(), interests);
                self.registry
                    .register_plugin_interests(plugin.id(), &interests)
                    .await;
                Ok(())
            }
            Err(extension_error) if extension_error.is_configuration_error() => Err(extension_error),
            Err(extension_error) => {
                warn!(
                    "Could not fetch notification interests from plugin '{}': {}",
                    plugin.id(),
                    extension_error
                );
                Ok(())
            }
        }
    }

    async fn plugin_unloaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()> {
        self.registry.remove_plugin_interests(plugin.id()).await;
        Ok(())
    }
}

/// Populates the settings metadata store when plugins load. Exactly one
/// extension point may claim a plugin's settings; more than one is a wiring
/// error that propagates.
pub struct PluginSettingsMetadataLoader {
    extensions: Vec<Arc<dyn SettingsAwareExtension>>,
    store: PluginSettingsMetadataStore,
}

impl PluginSettingsMetadataLoader {
    pub fn new(
        extensions: Vec<Arc<dyn SettingsAwareExtension>>,
        store: PluginSettingsMetadataStore,
    ) -> Self {
        Self { extensions, store }
    }
}

#[async_trait]
impl PluginChangeListener for PluginSettingsMetadataLoader {
    async fn plugin_loaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()> {
        let mut owners: Vec<PluginSettingsMetadata> = Vec::new();
        for extension in &self.extensions {
            if !plugin.supports_extension(extension.extension_name()) {
                continue;
            }
            let configuration = match extension.plugin_settings_configuration(plugin.id()).await {
                Ok(configuration) => configuration,
                Err(extension_error) if extension_error.is_configuration_error() => {
                    return Err(extension_error)
                }
                Err(extension_error) => {
                    debug!(
                        "Extension '{}' has no settings configuration for plugin '{}': {}",
                        extension.extension_name(),
                        plugin.id(),
                        extension_error
                    );
                    continue;
                }
            };
            let template = match extension.plugin_settings_view(plugin.id()).await {
                Ok(template) => template,
                Err(extension_error) if extension_error.is_configuration_error() => {
                    return Err(extension_error)
                }
                Err(extension_error) => {
                    debug!(
                        "Extension '{}' has no settings view for plugin '{}': {}",
                        extension.extension_name(),
                        plugin.id(),
                        extension_error
                    );
                    continue;
                }
            };
            owners.push(PluginSettingsMetadata::new(
                configuration,
                template,
                extension.extension_name(),
            ));
        }

        match owners.len() {
            0 => {
                warn!("Plugin '{}' does not expose plugin settings", plugin.id());
                Ok(())
            }
            1 => {
                let metadata = owners.remove(0);
                debug!(
                    "Extension '{}' owns the settings of plugin '{}'",
                    metadata.extension_name,
                    plugin.id()
                );
                self.store.add_metadata(plugin.id(), metadata).await;
                Ok(())
            }
            _ => {
                let claimants: Vec<&str> = owners
                    .iter()
                    .map(|metadata| metadata.extension_name.as_str())
                    .collect();
                let owner_error = PluginAccessError::duplicate_settings_owner(format!(
                    "Plugin '{}' exposes plugin settings through more than one extension: {:?}",
                    plugin.id(),
                    claimants
                ));
                error!("{}", owner_error);
                Err(owner_error)
            }
        }
    }

    async fn plugin_unloaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()> {
        self.store.remove_metadata(plugin.id()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<String>>,
        fail_with: Mutex<Option<PluginAccessError>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn fail_next(&self, error: PluginAccessError) {
            *self.fail_with.lock().unwrap() = Some(error);
        }
    }

    #[async_trait]
    impl PluginChangeListener for RecordingListener {
        async fn plugin_loaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()> {
            self.events.lock().unwrap().push(format!("loaded:{}", plugin.id()));
            match self.fail_with.lock().unwrap().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        async fn plugin_unloaded(&self, plugin: &PluginIdentity) -> PluginAccessResult<()> {
            self.events.lock().unwrap().push(format!("unloaded:{}", plugin.id()));
            Ok(())
        }
    }

    fn plugin(id: &str) -> PluginIdentity {
        PluginIdentity::new(id).with_extension(NOTIFICATION_EXTENSION, &["1.0"])
    }

    #[tokio::test]
    async fn test_subscribed_listeners_see_events_in_order() {
        let notifier = PluginChangeNotifier::new();
        let listener = Arc::new(RecordingListener::default());
        notifier.subscribe(listener.clone()).await;

        notifier.notify_plugin_loaded(&plugin("a")).await.unwrap();
        notifier.notify_plugin_unloaded(&plugin("a")).await.unwrap();

        assert_eq!(listener.events(), vec!["loaded:a", "unloaded:a"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let notifier = PluginChangeNotifier::new();
        let first = Arc::new(RecordingListener::default());
        let second = Arc::new(RecordingListener::default());
        let registration = notifier.subscribe(first.clone()).await;
        notifier.subscribe(second.clone()).await;
        assert_eq!(notifier.listener_count().await, 2);

        notifier.unsubscribe(registration).await.unwrap();
        notifier.notify_plugin_loaded(&plugin("a")).await.unwrap();

        assert!(first.events().is_empty());
        assert_eq!(second.events(), vec!["loaded:a"]);
        assert_eq!(notifier.listener_count().await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_handle_errors() {
        let notifier = PluginChangeNotifier::new();
        let registration = notifier.subscribe(Arc::new(RecordingListener::default())).await;
        notifier.unsubscribe(registration).await.unwrap();

        // The handle was consumed; a second notifier never saw this one
        let other = PluginChangeNotifier::new();
        let stale = other.subscribe(Arc::new(RecordingListener::default())).await;
        let result = notifier.unsubscribe(stale).await;
        assert!(matches!(
            result.unwrap_err(),
            PluginAccessError::ListenerNotRegistered { .. }
        ));
    }

    #[tokio::test]
    async fn test_recoverable_listener_failure_does_not_block_the_rest() {
        let notifier = PluginChangeNotifier::new();
        let failing = Arc::new(RecordingListener::default());
        let healthy = Arc::new(RecordingListener::default());
        notifier.subscribe(failing.clone()).await;
        notifier.subscribe(healthy.clone()).await;

        failing.fail_next(PluginAccessError::transport_failure("plugin host down"));
        notifier.notify_plugin_loaded(&plugin("a")).await.unwrap();

        assert_eq!(healthy.events(), vec!["loaded:a"]);
    }

    #[tokio::test]
    async fn test_fatal_listener_failure_propagates() {
        let notifier = PluginChangeNotifier::new();
        let failing = Arc::new(RecordingListener::default());
        let never_reached = Arc::new(RecordingListener::default());
        notifier.subscribe(failing.clone()).await;
        notifier.subscribe(never_reached.clone()).await;

        failing.fail_next(PluginAccessError::duplicate_settings_owner("two claimants"));
        let result = notifier.notify_plugin_loaded(&plugin("a")).await;

        assert!(matches!(
            result.unwrap_err(),
            PluginAccessError::DuplicateSettingsOwner { .. }
        ));
        assert!(never_reached.events().is_empty());
    }
}
