//! Plugin Access Tests
//!
//! Cross-module tests running the extensions and registries against a
//! scripted plugin host that stands in for the real transport and directory.

pub mod mock_transport;
