//! Signal envelopes and id generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::catalog::CalloutCatalog;
use crate::types::{Payload, SignalType};

/// Target marker for signals addressed to every registered component.
pub const BROADCAST: &str = "ALL";

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique id: `<prefix>-<utc millis timestamp>-<counter>`.
///
/// The counter keeps ids distinct when several are issued in the same
/// millisecond.
pub fn next_signal_id(prefix: &str) -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{:06}", prefix, Utc::now().format("%Y%m%d%H%M%S%3f"), seq)
}

/// The unit of exchange between components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    pub signal_id: String,
    pub caller_address: String,
    pub target_address: String,
    pub bus_address: String,
    pub signal_type: SignalType,
    pub radio_code: String,
    pub message: String,
    pub payload: Payload,
    pub response_expected: bool,
    pub timeout_ms: u64,
}

impl SignalEnvelope {
    pub fn builder(
        caller: &str,
        target: &str,
        bus: &str,
        signal_type: SignalType,
        radio_code: &str,
    ) -> EnvelopeBuilder {
        EnvelopeBuilder {
            caller: caller.to_string(),
            target: target.to_string(),
            bus: bus.to_string(),
            signal_type,
            radio_code: radio_code.to_string(),
            message: String::new(),
            payload: Payload::Empty,
            response_expected: None,
            timeout: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_broadcast(&self) -> bool {
        self.target_address == BROADCAST
    }

    /// Copy this envelope for a single concrete target, with a fresh id.
    pub fn for_target(&self, target: &str) -> SignalEnvelope {
        SignalEnvelope {
            signal_id: next_signal_id(self.signal_type.id_prefix()),
            target_address: target.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    caller: String,
    target: String,
    bus: String,
    signal_type: SignalType,
    radio_code: String,
    message: String,
    payload: Payload,
    response_expected: Option<bool>,
    timeout: Option<Duration>,
}

impl EnvelopeBuilder {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn response_expected(mut self, expected: bool) -> Self {
        self.response_expected = Some(expected);
        self
    }

    /// Override the callout's default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fill unset fields from the referenced callout code.
    pub fn build(self, callouts: &CalloutCatalog) -> SignalEnvelope {
        let timeout = self
            .timeout
            .unwrap_or_else(|| callouts.timeout_for(&self.radio_code));
        let response_expected = self
            .response_expected
            .unwrap_or_else(|| callouts.response_required(&self.radio_code));
        let message = if self.message.is_empty() {
            callouts
                .get(&self.radio_code)
                .map(|c| c.meaning.clone())
                .unwrap_or_default()
        } else {
            self.message
        };

        SignalEnvelope {
            signal_id: next_signal_id(self.signal_type.id_prefix()),
            caller_address: self.caller,
            target_address: self.target,
            bus_address: self.bus,
            signal_type: self.signal_type,
            radio_code: self.radio_code,
            message,
            payload: self.payload,
            response_expected,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
