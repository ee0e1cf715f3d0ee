//! Host-side ocivisor configuration.
//!
//! Persisted defaults used when launching new containers. Distinct from
//! the container registry store (see [`crate::registry`]), which is its
//! own simple JSON test facility keyed by network and name.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "ocivisor";

/// Global ocivisor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcivisorConfig {
    /// Configuration format version.
    pub version: u8,

    /// Default number of vCPUs for new containers.
    pub default_cpus: u8,

    /// Default memory in MiB for new containers.
    pub default_mem: u32,

    /// Default DNS server for containers with network egress.
    pub default_dns: String,
}

impl Default for OcivisorConfig {
    fn default() -> Self {
        Self {
            version: 1,
            default_cpus: 1,
            default_mem: 512,
            default_dns: "1.1.1.1".to_string(),
        }
    }
}

impl OcivisorConfig {
    /// Load configuration from disk, falling back to defaults if absent.
    pub fn load() -> Result<Self> {
        confy::load(APP_NAME, None).map_err(|e| Error::ConfigLoad(e.to_string()))
    }

    /// Save configuration to disk.
    pub fn save(&self) -> Result<()> {
        confy::store(APP_NAME, None, self).map_err(|e| Error::ConfigSave(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = OcivisorConfig::default();
        assert_eq!(config.version, 1);
        assert_eq!(config.default_cpus, 1);
        assert_eq!(config.default_mem, 512);
        assert_eq!(config.default_dns, "1.1.1.1");
    }

    #[test]
    fn serializes_round_trip() {
        let config = OcivisorConfig {
            version: 2,
            default_cpus: 4,
            default_mem: 2048,
            default_dns: "9.9.9.9".to_string(),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: OcivisorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
