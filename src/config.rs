//! Static bus configuration.
//!
//! The address table is loaded once at start-up. Lookup order is an explicit
//! path, then `CASEBUS_CONFIG`, then `~/.casebus/bus.json`, and finally the
//! defaults compiled into the binary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::envelope::BROADCAST;
use crate::error::ConfigError;

const EMBEDDED_BUS_CONFIG: &str = include_str!("../config/bus.json");

/// Environment variable pointing at a bus config file.
pub const CONFIG_ENV_VAR: &str = "CASEBUS_CONFIG";

/// One statically declared address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressEntry {
    pub address: String,
    pub kind: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusConfig {
    #[serde(default = "default_bus_address")]
    pub bus_address: String,
    #[serde(default = "default_alert_address")]
    pub alert_address: String,
    /// How many recent faults the SOS status view returns.
    #[serde(default = "default_fault_display_limit")]
    pub fault_display_limit: usize,
    /// Successful radio checks slower than this mark the address degraded.
    #[serde(default)]
    pub degraded_after_ms: Option<u64>,
    #[serde(default)]
    pub addresses: Vec<AddressEntry>,
}

fn default_bus_address() -> String {
    "MASTER".to_string()
}

fn default_alert_address() -> String {
    "ERROR_DISPLAY".to_string()
}

fn default_fault_display_limit() -> usize {
    10
}

impl BusConfig {
    /// The configuration compiled into the crate.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(EMBEDDED_BUS_CONFIG)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: BusConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Minimal config holding only the bus address, for tests and embedding.
    pub fn minimal(bus_address: &str) -> Self {
        Self {
            bus_address: bus_address.to_string(),
            alert_address: default_alert_address(),
            fault_display_limit: default_fault_display_limit(),
            degraded_after_ms: None,
            addresses: vec![AddressEntry {
                address: bus_address.to_string(),
                kind: "core_controller".to_string(),
                display_name: "Master System Controller".to_string(),
                parent: None,
            }],
        }
    }

    /// Check the address table is self-consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus_address.trim().is_empty() {
            return Err(ConfigError::Invalid("busAddress is required".into()));
        }
        if self.fault_display_limit == 0 {
            return Err(ConfigError::Invalid(
                "faultDisplayLimit must be at least 1".into(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for entry in &self.addresses {
            if entry.address.trim().is_empty() {
                return Err(ConfigError::Invalid("Empty address in address table".into()));
            }
            if entry.address == BROADCAST {
                return Err(ConfigError::Invalid(format!(
                    "'{}' is reserved for broadcast",
                    BROADCAST
                )));
            }
            if let Some(parent) = &entry.parent {
                // Parents must be declared before their children.
                if !seen.contains(parent.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "Parent '{}' of '{}' is not declared before it",
                        parent, entry.address
                    )));
                }
            }
            if !seen.insert(entry.address.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate address: {}",
                    entry.address
                )));
            }
        }

        if !seen.contains(self.bus_address.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Bus address '{}' is not declared in the address table",
                self.bus_address
            )));
        }

        Ok(())
    }
}

/// Default on-disk config location (~/.casebus/bus.json).
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".casebus").join("bus.json"))
}

/// Resolve and load the bus config.
///
/// An explicit path or `CASEBUS_CONFIG` must exist; the home-directory file
/// is optional and falls back to the embedded defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<BusConfig, ConfigError> {
    if let Some(path) = explicit {
        log::info!("Loading bus config from {}", path.display());
        return BusConfig::from_path(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            log::info!("Loading bus config from ${} ({})", CONFIG_ENV_VAR, path);
            return BusConfig::from_path(Path::new(&path));
        }
    }

    if let Some(path) = config_path() {
        if path.exists() {
            log::info!("Loading bus config from {}", path.display());
            return BusConfig::from_path(&path);
        }
    }

    log::debug!("Using embedded bus config");
    BusConfig::embedded()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_is_valid() {
        let config = BusConfig::embedded().expect("embedded config should load");
        assert_eq!(config.bus_address, "MASTER");
        assert_eq!(config.alert_address, "ERROR_DISPLAY");
        assert!(config.addresses.iter().any(|a| a.address == "SECTION-1"));
    }

    #[test]
    fn test_defaults_applied() {
        let config = BusConfig::from_json(
            r#"{"addresses": [{"address": "MASTER", "kind": "core", "displayName": "M"}]}"#,
        )
        .expect("config");
        assert_eq!(config.bus_address, "MASTER");
        assert_eq!(config.fault_display_limit, 10);
        assert!(config.degraded_after_ms.is_none());
    }

    #[test]
    fn test_rejects_duplicate_address() {
        let result = BusConfig::from_json(
            r#"{"addresses": [
                {"address": "MASTER", "kind": "core", "displayName": "M"},
                {"address": "MASTER", "kind": "core", "displayName": "M2"}
            ]}"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("Duplicate")));
    }

    #[test]
    fn test_rejects_undeclared_parent() {
        let result = BusConfig::from_json(
            r#"{"addresses": [
                {"address": "MASTER", "kind": "core", "displayName": "M"},
                {"address": "SECTION-1", "kind": "report_section", "displayName": "S1", "parent": "SECTION"}
            ]}"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_missing_bus_address() {
        let result = BusConfig::from_json(
            r#"{"busAddress": "HUB", "addresses": [{"address": "A", "kind": "k", "displayName": "A"}]}"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("HUB")));
    }

    #[test]
    fn test_rejects_broadcast_marker_as_address() {
        let result = BusConfig::from_json(
            r#"{"addresses": [
                {"address": "MASTER", "kind": "core", "displayName": "M"},
                {"address": "ALL", "kind": "core", "displayName": "everyone"}
            ]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bus.json");
        std::fs::write(
            &path,
            r#"{"busAddress": "HUB", "addresses": [{"address": "HUB", "kind": "core", "displayName": "Hub"}]}"#,
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.bus_address, "HUB");
        assert_eq!(config.addresses.len(), 1);
    }

    #[test]
    fn test_load_from_missing_path_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = load_config(Some(&dir.path().join("nope.json")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
