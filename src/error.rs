//! Error types for bus operations
//!
//! Errors are classified by how calling protocols treat them:
//! - Absent response: the target could not be reached or did not answer.
//!   Sweeps record these per address and carry on.
//! - Caller errors: registration conflicts and resolve-without-fault.
//!   These are returned straight to whoever issued the call.

use thiserror::Error;

/// Errors raised while loading static configuration or catalogs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Error types for registry, routing and protocol operations
#[derive(Debug, Error)]
pub enum BusError {
    // Absent-response errors
    #[error("Address not found: {0}")]
    UnknownAddress(String),

    #[error("No handler bound for address: {0}")]
    HandlerUnavailable(String),

    #[error("No response from {address} within {timeout_ms} ms")]
    Timeout { address: String, timeout_ms: u64 },

    #[error("No response from {address}: {reason}")]
    NoResponse { address: String, reason: String },

    // Caller errors
    #[error("Address already registered: {0}")]
    DuplicateAddress(String),

    #[error("Parent address {parent} of {address} is not registered")]
    DanglingParent { address: String, parent: String },

    #[error("No active fault for address: {0}")]
    NoActiveFault(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BusError {
    /// Returns true if this error means the target produced no response.
    /// Protocols record these as a failed outcome instead of aborting.
    pub fn is_absent_response(&self) -> bool {
        matches!(
            self,
            BusError::UnknownAddress(_)
                | BusError::HandlerUnavailable(_)
                | BusError::Timeout { .. }
                | BusError::NoResponse { .. }
        )
    }

    /// Diagnostic code describing this error (see `catalog::diagnostic`).
    pub fn diagnostic_code(&self) -> u16 {
        match self {
            BusError::NoResponse { .. } => 2001,
            BusError::Timeout { .. } => 2002,
            BusError::HandlerUnavailable(_) => 2003,
            BusError::UnknownAddress(_) => 2004,
            BusError::Config(_) => 1002,
            BusError::DuplicateAddress(_) => 1004,
            BusError::DanglingParent { .. } => 1005,
            BusError::NoActiveFault(_) => 9004,
        }
    }
}

/// Serializable error representation for status surfaces
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusErrorView {
    pub message: String,
    pub diagnostic_code: u16,
    pub absent_response: bool,
}

impl From<&BusError> for BusErrorView {
    fn from(err: &BusError) -> Self {
        BusErrorView {
            message: err.to_string(),
            diagnostic_code: err.diagnostic_code(),
            absent_response: err.is_absent_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_response_classification() {
        assert!(BusError::UnknownAddress("X".into()).is_absent_response());
        assert!(BusError::HandlerUnavailable("X".into()).is_absent_response());
        assert!(BusError::Timeout {
            address: "X".into(),
            timeout_ms: 10
        }
        .is_absent_response());
        assert!(!BusError::DuplicateAddress("X".into()).is_absent_response());
        assert!(!BusError::NoActiveFault("X".into()).is_absent_response());
    }

    #[test]
    fn test_unknown_address_maps_to_address_not_found() {
        let err = BusError::UnknownAddress("SECTION_99".into());
        assert_eq!(err.diagnostic_code(), 2004);

        let view = BusErrorView::from(&err);
        assert_eq!(view.message, "Address not found: SECTION_99");
        assert!(view.absent_response);
    }

    #[test]
    fn test_config_error_from_json() {
        let err: ConfigError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
