use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const EMBEDDED_DIAGNOSTIC_CODES: &str = include_str!("../../config/diagnostic_codes.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticCode {
    pub code: u16,
    pub description: String,
}

/// Subsystem band, taken from the thousands digit of a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticBand {
    System,
    Communication,
    Evidence,
    Section,
    Interface,
    Resource,
    Emergency,
    Unclassified,
}

impl DiagnosticBand {
    pub fn of(code: u16) -> Self {
        match code / 1000 {
            1 => DiagnosticBand::System,
            2 => DiagnosticBand::Communication,
            3 => DiagnosticBand::Evidence,
            4 => DiagnosticBand::Section,
            5 => DiagnosticBand::Interface,
            6 => DiagnosticBand::Resource,
            9 => DiagnosticBand::Emergency,
            _ => DiagnosticBand::Unclassified,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticCatalog {
    codes: BTreeMap<u16, DiagnosticCode>,
}

impl DiagnosticCatalog {
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(EMBEDDED_DIAGNOSTIC_CODES)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let codes: Vec<DiagnosticCode> = serde_json::from_str(json)?;
        let mut map = BTreeMap::new();
        for code in codes {
            if map.insert(code.code, code.clone()).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate diagnostic code: {}",
                    code.code
                )));
            }
        }
        Ok(Self { codes: map })
    }

    /// Parse the string form used in fault reports (e.g. `"6001"`).
    pub fn parse_code(code: &str) -> Option<u16> {
        code.trim().parse().ok()
    }

    pub fn get(&self, code: u16) -> Option<&DiagnosticCode> {
        self.codes.get(&code)
    }

    /// Human-readable text for a code, even if the catalog lacks it.
    pub fn describe(&self, code: u16) -> String {
        self.get(code)
            .map(|c| c.description.clone())
            .unwrap_or_else(|| format!("Unknown diagnostic code {}", code))
    }

    /// Same as `describe`, for the string codes carried by fault reports.
    pub fn describe_str(&self, code: &str) -> String {
        match Self::parse_code(code) {
            Some(n) => self.describe(n),
            None => format!("Unknown diagnostic code {}", code),
        }
    }

    pub fn band_of(&self, code: u16) -> DiagnosticBand {
        DiagnosticBand::of(code)
    }

    pub fn by_band(&self, band: DiagnosticBand) -> Vec<&DiagnosticCode> {
        self.codes
            .values()
            .filter(|c| DiagnosticBand::of(c.code) == band)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagnosticCode> {
        self.codes.values()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
