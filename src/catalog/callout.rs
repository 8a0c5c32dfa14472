use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const EMBEDDED_CALLOUT_CODES: &str = include_str!("../../config/callout_codes.json");

/// Timeout used when a signal references a code the catalog doesn't know.
pub const FALLBACK_TIMEOUT_MS: u64 = 5000;

pub const RADIO_CHECK: &str = "10-2";
pub const ACKNOWLEDGE: &str = "10-4";
pub const EMERGENCY: &str = "10-33";
pub const ROLLCALL: &str = "10-36";
pub const GENERAL: &str = "10-70";

/// A signal code: its meaning, whether an answer is mandatory, and how long
/// to wait for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalloutCode {
    pub code: String,
    pub meaning: String,
    pub response_required: bool,
    pub default_timeout_ms: u64,
}

impl CalloutCode {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CalloutCatalog {
    codes: BTreeMap<String, CalloutCode>,
}

impl CalloutCatalog {
    /// Load the catalog compiled into the crate.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(EMBEDDED_CALLOUT_CODES)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let codes: Vec<CalloutCode> = serde_json::from_str(json)?;
        Self::from_codes(codes)
    }

    pub fn from_codes(codes: Vec<CalloutCode>) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for code in codes {
            if code.code.is_empty() {
                return Err(ConfigError::Invalid("Callout code must not be empty".into()));
            }
            if code.default_timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "Callout code {} has a zero timeout",
                    code.code
                )));
            }
            if let Some(existing) = map.insert(code.code.clone(), code) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate callout code: {}",
                    existing.code
                )));
            }
        }
        Ok(Self { codes: map })
    }

    pub fn get(&self, code: &str) -> Option<&CalloutCode> {
        self.codes.get(code)
    }

    /// Default timeout for a code, falling back to `FALLBACK_TIMEOUT_MS`.
    pub fn timeout_for(&self, code: &str) -> Duration {
        self.get(code)
            .map(CalloutCode::default_timeout)
            .unwrap_or(Duration::from_millis(FALLBACK_TIMEOUT_MS))
    }

    pub fn response_required(&self, code: &str) -> bool {
        self.get(code).map(|c| c.response_required).unwrap_or(false)
    }

    /// Shortest default timeout in the catalog.
    pub fn minimum_timeout(&self) -> Duration {
        self.codes
            .values()
            .map(CalloutCode::default_timeout)
            .min()
            .unwrap_or(Duration::from_millis(FALLBACK_TIMEOUT_MS))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalloutCode> {
        self.codes.values()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
