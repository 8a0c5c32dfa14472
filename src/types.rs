//! Shared types used across the registry, router and protocols.

use serde::{Deserialize, Serialize};

/// Liveness of a registered component, as last observed by a probe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AddressStatus {
    Active,
    Degraded,
    Offline,
    #[default]
    Unknown,
}

impl AddressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AddressStatus::Active => "active",
            AddressStatus::Degraded => "degraded",
            AddressStatus::Offline => "offline",
            AddressStatus::Unknown => "unknown",
        }
    }
}

/// What kind of signal an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    RadioCheck,
    Rollcall,
    SosFault,
    Generic,
}

impl SignalType {
    /// Prefix used when generating signal ids of this type.
    pub fn id_prefix(self) -> &'static str {
        match self {
            SignalType::RadioCheck => "RC",
            SignalType::Rollcall => "RL",
            SignalType::SosFault => "SOS",
            SignalType::Generic => "SIG",
        }
    }
}

/// Opaque data carried by envelopes and fault reports.
///
/// The bus never looks inside; the shape of a payload is agreed between
/// sender and target handler.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Payload {
    #[default]
    Empty,
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Payload::Text(value.into())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}
