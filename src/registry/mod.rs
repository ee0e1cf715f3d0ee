//! Container registry store (test facility): a keyed JSON mapping of
//! container names to addresses, not an authoritative service registry or
//! DNS server.
//!
//! Persisted at a well-known path and guarded by an advisory file lock so
//! concurrent writers serialize through the host filesystem rather than
//! corrupting the JSON object; per the container registry's test-facility
//! status, that's the only consistency guarantee on offer.

use crate::error::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

/// A single registered container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    pub network: String,
}

/// `network -> name -> entry`.
pub type RegistryMap = HashMap<String, HashMap<String, RegistryEntry>>;

fn registry_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ocivisor")
        .join("registry.json")
}

fn registry_lock_path() -> PathBuf {
    registry_path().with_extension("json.lock")
}

fn acquire_lock(exclusive: bool) -> Result<File> {
    let lock_path = registry_lock_path();
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)?;
    if exclusive {
        file.lock_exclusive()?;
    } else {
        file.lock_shared()?;
    }
    Ok(file)
}

/// Load the registry, taking a shared advisory lock for the read. Returns
/// an empty map if the store has never been written.
pub fn load() -> Result<RegistryMap> {
    let path = registry_path();
    if !path.exists() {
        return Ok(RegistryMap::new());
    }
    let _lock = acquire_lock(false)?;
    let data = fs::read_to_string(&path)?;
    serde_json::from_str(&data).map_err(|e| Error::RegistryLoad(e.to_string()))
}

/// Persist the registry, taking an exclusive advisory lock for the write.
pub fn save(map: &RegistryMap) -> Result<()> {
    let path = registry_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let _lock = acquire_lock(true)?;
    let data =
        serde_json::to_string_pretty(map).map_err(|e| Error::RegistrySave(e.to_string()))?;
    fs::write(&path, data)?;
    Ok(())
}

/// Register (insert or replace) an entry.
pub fn register(network: &str, name: &str, ip_address: &str) -> Result<()> {
    let mut map = load()?;
    map.entry(network.to_string()).or_default().insert(
        name.to_string(),
        RegistryEntry {
            name: name.to_string(),
            ip_address: ip_address.to_string(),
            network: network.to_string(),
        },
    );
    save(&map)
}

/// Remove an entry, returning it if it was present.
pub fn unregister(network: &str, name: &str) -> Result<Option<RegistryEntry>> {
    let mut map = load()?;
    let removed = map.get_mut(network).and_then(|entries| entries.remove(name));
    if removed.is_some() {
        save(&map)?;
    }
    Ok(removed)
}

/// List entries, optionally filtered to one network, sorted by network
/// then name.
pub fn list(network: Option<&str>) -> Result<Vec<RegistryEntry>> {
    let map = load()?;
    let mut entries: Vec<RegistryEntry> = match network {
        Some(net) => map
            .get(net)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default(),
        None => map.values().flat_map(|entries| entries.values().cloned()).collect(),
    };
    entries.sort_by(|a, b| a.network.cmp(&b.network).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_json_round_trip() {
        let entry = RegistryEntry {
            name: "web".to_string(),
            ip_address: "10.0.0.2".to_string(),
            network: "default".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: RegistryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn map_nests_by_network_then_name() {
        let mut map = RegistryMap::new();
        map.entry("default".to_string()).or_default().insert(
            "web".to_string(),
            RegistryEntry {
                name: "web".to_string(),
                ip_address: "10.0.0.2".to_string(),
                network: "default".to_string(),
            },
        );
        assert_eq!(map["default"]["web"].ip_address, "10.0.0.2");
    }

    #[test]
    fn list_sorts_by_network_then_name() {
        let mut map = RegistryMap::new();
        for (network, name) in [("b", "z"), ("a", "y"), ("a", "x")] {
            map.entry(network.to_string()).or_default().insert(
                name.to_string(),
                RegistryEntry {
                    name: name.to_string(),
                    ip_address: "10.0.0.1".to_string(),
                    network: network.to_string(),
                },
            );
        }
        let mut entries: Vec<_> = map.values().flat_map(|e| e.values().cloned()).collect();
        entries.sort_by(|a, b| a.network.cmp(&b.network).then_with(|| a.name.cmp(&b.name)));
        let ordered: Vec<_> = entries.iter().map(|e| (e.network.as_str(), e.name.as_str())).collect();
        assert_eq!(ordered, vec![("a", "x"), ("a", "y"), ("b", "z")]);
    }
}
