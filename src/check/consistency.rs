//! Internal consistency between the paths of one mechanism.
//!
//! Each path's protocol set is reduced to a canonical key over the fields that
//! matter for that mechanism; paths agree when they share one key.

use serde::Serialize;

use crate::models::{MethodConfig, ProtocolInfo};

/// Which key fields a mechanism is compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFields {
    /// Type, server, port, encryption and SSL
    Autodiscover,
    /// Type, server, port and SSL
    Autoconfig,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct KeyEntry<'a> {
    #[serde(rename = "Type")]
    protocol_type: &'a str,
    server: &'a str,
    port: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption: Option<&'a str>,
    #[serde(rename = "SSL")]
    ssl: &'a str,
}

/// Sorts `protocols` in place and returns their canonical key.
///
/// The key is independent of the original element order. An empty set
/// yields an empty key.
pub fn protocol_key(protocols: &mut [ProtocolInfo], fields: KeyFields) -> String {
    if protocols.is_empty() {
        return String::new();
    }
    match fields {
        KeyFields::Autodiscover => protocols.sort_by(|a, b| {
            (&a.protocol_type, &a.server, &a.port, &a.encryption, &a.ssl).cmp(&(
                &b.protocol_type,
                &b.server,
                &b.port,
                &b.encryption,
                &b.ssl,
            ))
        }),
        KeyFields::Autoconfig => protocols.sort_by(|a, b| {
            (&a.protocol_type, &a.server, &a.port, &a.ssl).cmp(&(
                &b.protocol_type,
                &b.server,
                &b.port,
                &b.ssl,
            ))
        }),
    }

    let entries: Vec<KeyEntry<'_>> = protocols
        .iter()
        .map(|p| KeyEntry {
            protocol_type: &p.protocol_type,
            server: &p.server,
            port: &p.port,
            encryption: (fields == KeyFields::Autodiscover).then_some(p.encryption.as_str()),
            ssl: &p.ssl,
        })
        .collect();
    serde_json::to_string(&entries).unwrap_or_default()
}

/// Collapses `configs` to one entry per distinct key.
///
/// Returns whether the paths were consistent (at most one distinct key) and
/// the surviving configs in first-seen key order; the last config seen for a
/// key wins.
pub fn dedup_configs(configs: Vec<MethodConfig>, fields: KeyFields) -> (bool, Vec<MethodConfig>) {
    let mut unique: Vec<(String, MethodConfig)> = Vec::new();
    for mut config in configs {
        let key = protocol_key(&mut config.protocols, fields);
        match unique.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = config,
            None => unique.push((key, config)),
        }
    }
    let consistent = unique.len() <= 1;
    (consistent, unique.into_iter().map(|(_, c)| c).collect())
}
