//! Process-Wide Plugin Registries
//!
//! Shared, thread-safe state kept in step with plugin load/unload events:
//! which extension owns which plugin's settings schema, and which plugins
//! want which notifications. The lifecycle glue that feeds both lives in
//! [`registrar`].

pub mod interest;
pub mod metadata;
pub mod registrar;

pub use interest::NotificationInterestRegistry;
pub use metadata::{PluginSettingsMetadata, PluginSettingsMetadataStore};
pub use registrar::{
    ListenerRegistration, NotificationPluginRegistrar, PluginChangeListener, PluginChangeNotifier,
    PluginSettingsMetadataLoader,
};
