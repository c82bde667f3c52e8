//! Plugin Extension and Versioning Bridge
//!
//! Connects the Conveyor server to external plugins whose wire formats change
//! between protocol versions. Each extension point negotiates the version to
//! speak per plugin, routes messages through the JSON handler frozen for that
//! version, and keeps the process-wide registries (settings metadata,
//! notification interest) in step with plugin load/unload events.
//!
//! # Example Usage
//!
//! ```no_run
//! use conveyor_plugin_access::{NotificationInterestRegistry, PluginSettingsMetadataStore};
//! use conveyor_plugin_access::PluginChangeNotifier;
//!
//! // Registries are plain values wired in by the caller, cloned handles
//! // share the same state
//! let interest_registry = NotificationInterestRegistry::new();
//! let metadata_store = PluginSettingsMetadataStore::new();
//! let notifier = PluginChangeNotifier::new();
//!
//! // Subscribe registrars, then feed plugin load/unload events through
//! // the notifier:
//! // let registration = notifier.subscribe(Arc::new(registrar)).await;
//! // notifier.notify_plugin_loaded(&plugin).await?;
//! ```

pub mod descriptor;
pub mod error;
pub mod extension;
pub mod registry;
pub mod transport;
pub mod version;

#[cfg(test)]
pub mod tests;

// Re-export core types for easier access
pub use descriptor::{PluginDirectory, PluginIdentity};
pub use error::{PluginAccessError, PluginAccessResult};
pub use transport::{PluginApiRequest, PluginApiResponse, PluginTransport, SUCCESS_RESPONSE_CODE};
pub use version::resolve_extension_version;

// Extension points and their domain types
pub use extension::artifact_cleanup::{ArtifactCleanupExtension, StageConfiguration};
pub use extension::config_repo::{
    ConfigParseError, ConfigRepoCapabilities, ConfigRepoExtension, ConfigurationProperty,
    ParsedDirectory, PipelineEntry,
};
pub use extension::notification::{NotificationExtension, NotificationResult, StageNotification};
pub use extension::settings::{
    PluginSettingsConfiguration, PluginSettingsProperty, SettingsAwareExtension, ValidationError,
    ValidationResult,
};
pub use extension::{
    PluginRequestHelper, ARTIFACT_CLEANUP_EXTENSION, CONFIG_REPO_EXTENSION, NOTIFICATION_EXTENSION,
};

// Registries and lifecycle glue
pub use registry::registrar::{
    ListenerRegistration, NotificationPluginRegistrar, PluginChangeListener, PluginChangeNotifier,
    PluginSettingsMetadataLoader,
};
pub use registry::{NotificationInterestRegistry, PluginSettingsMetadata, PluginSettingsMetadataStore};
