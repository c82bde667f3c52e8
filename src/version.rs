//! Extension Version Resolution
//!
//! Picks the single protocol version the server speaks with a plugin for one
//! extension point: the highest version both sides support. Resolution is
//! pure and never touches the transport, so an incompatible plugin fails
//! before any request is built.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{PluginAccessError, PluginAccessResult};

/// Resolve the protocol version for one (plugin, extension) pair.
///
/// Returns the highest version present in both lists, compared segment by
/// segment so "10.0" outranks "2.0". Declaration order on either side does
/// not matter. An empty intersection is an error that names both sides'
/// versions.
pub fn resolve_extension_version(
    plugin_id: &str,
    extension_name: &str,
    server_supported: &[String],
    plugin_supported: &[String],
) -> PluginAccessResult<String> {
    let server: HashSet<&str> = server_supported.iter().map(String::as_str).collect();
    let mut mutual: Vec<&str> = plugin_supported
        .iter()
        .map(String::as_str)
        .filter(|version| server.contains(version))
        .collect();
    mutual.sort_by(|a, b| compare_versions(a, b));
    mutual.dedup();

    match mutual.last() {
        Some(version) => Ok((*version).to_string()),
        None => Err(PluginAccessError::incompatible_version(format!(
            "Could not find matching extension version between plugin '{}' and the server for the '{}' extension. Server supports {:?}, plugin supports {:?}",
            plugin_id, extension_name, server_supported, plugin_supported
        ))),
    }
}

/// Segment-wise version comparison: numeric where both segments parse,
/// lexicographic otherwise. More segments outrank a shared prefix.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(ln), Ok(rn)) => ln.cmp(&rn),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}
