//! Radio check: point-to-point and system-wide liveness probing.
//!
//! Each check records the latest outcome per address. A failed check never
//! aborts a sweep; every address is probed independently.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::ProtocolContext;
use crate::catalog::callout::RADIO_CHECK;
use crate::envelope::SignalEnvelope;
use crate::types::{AddressStatus, Payload, SignalType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioCheckResult {
    pub address: String,
    pub response_time_ms: u64,
    pub response_payload: Option<Payload>,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of `check_all`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioSweep {
    pub timestamp: DateTime<Utc>,
    /// Registry size, including the bus's own address.
    pub total_systems: usize,
    pub responses_received: usize,
    pub responses_missing: usize,
    pub results: BTreeMap<String, RadioCheckResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioCheckStatus {
    pub total_systems: usize,
    pub systems_checked: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: BTreeMap<String, RadioCheckResult>,
}

pub struct RadioCheck {
    ctx: ProtocolContext,
    degraded_after: Option<Duration>,
    results: RwLock<BTreeMap<String, RadioCheckResult>>,
}

impl RadioCheck {
    pub fn new(ctx: ProtocolContext) -> Self {
        Self {
            ctx,
            degraded_after: None,
            results: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mark successful but slower responders as degraded.
    pub fn with_degraded_after(mut self, threshold: Duration) -> Self {
        self.degraded_after = Some(threshold);
        self
    }

    /// Probe one address. Never fails; problems show up as `Failed`.
    ///
    /// Results are only stored for registered addresses.
    pub fn check_one(&self, target: &str) -> RadioCheckResult {
        let envelope = SignalEnvelope::builder(
            &self.ctx.bus_address,
            target,
            &self.ctx.bus_address,
            SignalType::RadioCheck,
            RADIO_CHECK,
        )
        .message(format!("Radio check for {}", target))
        .response_expected(true)
        .build(&self.ctx.callouts);

        let started = Instant::now();
        let outcome = self.ctx.router.route(&envelope);
        let elapsed = started.elapsed();
        let response_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let timestamp = Utc::now();

        let result = match outcome {
            Ok(payload) => RadioCheckResult {
                address: target.to_string(),
                response_time_ms,
                response_payload: Some(payload),
                status: CheckStatus::Success,
                error: None,
                timestamp,
            },
            Err(e) => {
                log::debug!("RadioCheck: {} failed: {}", target, e);
                RadioCheckResult {
                    address: target.to_string(),
                    response_time_ms,
                    response_payload: None,
                    status: CheckStatus::Failed,
                    error: Some(e.to_string()),
                    timestamp,
                }
            }
        };

        if self.ctx.registry.contains(target) {
            let status = self.address_status(&result, elapsed);
            if let Err(e) = self.ctx.registry.set_status(target, status, timestamp) {
                log::warn!("RadioCheck: could not update status for {}: {}", target, e);
            }
            self.results.write().insert(target.to_string(), result.clone());
        }

        result
    }

    fn address_status(&self, result: &RadioCheckResult, elapsed: Duration) -> AddressStatus {
        match (result.status, self.degraded_after) {
            (CheckStatus::Failed, _) => AddressStatus::Offline,
            (CheckStatus::Success, Some(threshold)) if elapsed > threshold => {
                AddressStatus::Degraded
            }
            (CheckStatus::Success, _) => AddressStatus::Active,
        }
    }

    /// Probe every address except the bus, in lexicographic order.
    pub fn check_all(&self) -> RadioSweep {
        // Counts come from this snapshot; later registrations wait for the next sweep.
        let addresses = self.ctx.registry.all_addresses(&[]);
        let total_systems = addresses.clone().count();

        let mut results = BTreeMap::new();
        for address in addresses.filter(|a| *a != self.ctx.bus_address) {
            let result = self.check_one(&address);
            results.insert(address, result);
        }

        let responses_received = results
            .values()
            .filter(|r| r.status == CheckStatus::Success)
            .count();
        let responses_missing = results.len() - responses_received;

        log::info!(
            "RadioCheck: sweep complete, {} responding, {} missing",
            responses_received,
            responses_missing
        );

        RadioSweep {
            timestamp: Utc::now(),
            total_systems,
            responses_received,
            responses_missing,
            results,
        }
    }

    pub fn last_result(&self, address: &str) -> Option<RadioCheckResult> {
        self.results.read().get(address).cloned()
    }

    pub fn status(&self) -> RadioCheckStatus {
        let results = self.results.read().clone();
        let successful = results
            .values()
            .filter(|r| r.status == CheckStatus::Success)
            .count();

        RadioCheckStatus {
            total_systems: self.ctx.registry.len(),
            systems_checked: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::CalloutCatalog;
    use crate::registry::{AddressRecord, AddressRegistry};
    use crate::router::SignalRouter;

    fn context() -> ProtocolContext {
        let registry = Arc::new(AddressRegistry::new());
        registry
            .register(AddressRecord::new("MASTER", "core_controller", "Master"))
            .expect("register");
        registry
            .register_with_handler(
                AddressRecord::new("A", "report_section", "A"),
                Arc::new(|_: &SignalEnvelope| Some(Payload::text("10-4"))),
            )
            .expect("register");
        registry
            .register(AddressRecord::new("B", "report_section", "B"))
            .expect("register");

        ProtocolContext {
            router: Arc::new(SignalRouter::new(registry.clone())),
            registry,
            callouts: Arc::new(CalloutCatalog::embedded().expect("catalog")),
            bus_address: "MASTER".to_string(),
        }
    }

    #[test]
    fn test_check_one_responsive() {
        let ctx = context();
        let radio = RadioCheck::new(ctx.clone());

        let result = radio.check_one("A");
        assert_eq!(result.status, CheckStatus::Success);
        assert_eq!(result.response_payload, Some(Payload::text("10-4")));
        assert!(result.error.is_none());

        let record = ctx.registry.lookup("A").expect("lookup");
        assert_eq!(record.status, AddressStatus::Active);
        assert_eq!(record.last_check, Some(result.timestamp));
    }

    #[test]
    fn test_check_one_without_handler_fails_quietly() {
        let ctx = context();
        let radio = RadioCheck::new(ctx.clone());

        let result = radio.check_one("B");
        assert_eq!(result.status, CheckStatus::Failed);
        assert!(result.response_payload.is_none());
        assert_eq!(
            ctx.registry.lookup("B").expect("lookup").status,
            AddressStatus::Offline
        );
    }

    #[test]
    fn test_check_one_unknown_address_not_recorded() {
        let radio = RadioCheck::new(context());
        let result = radio.check_one("GHOST");
        assert_eq!(result.status, CheckStatus::Failed);
        assert!(radio.last_result("GHOST").is_none());
        assert_eq!(radio.status().systems_checked, 0);
    }

    #[test]
    fn test_latest_result_wins() {
        let ctx = context();
        let radio = RadioCheck::new(ctx.clone());
        assert_eq!(radio.check_one("B").status, CheckStatus::Failed);

        ctx.registry
            .bind_handler("B", Arc::new(|_: &SignalEnvelope| Some(Payload::Empty)))
            .expect("bind");
        assert_eq!(radio.check_one("B").status, CheckStatus::Success);

        let status = radio.status();
        assert_eq!(status.systems_checked, 1);
        assert_eq!(status.successful, 1);
        assert_eq!(status.failed, 0);
    }

    #[test]
    fn test_check_all_counts() {
        let radio = RadioCheck::new(context());
        let sweep = radio.check_all();

        assert_eq!(sweep.total_systems, 3);
        assert_eq!(sweep.results.len(), 2);
        assert!(!sweep.results.contains_key("MASTER"));
        assert_eq!(sweep.results["A"].status, CheckStatus::Success);
        assert_eq!(sweep.results["B"].status, CheckStatus::Failed);
        assert_eq!(
            sweep.responses_received + sweep.responses_missing,
            sweep.total_systems - 1
        );

        let status = radio.status();
        assert_eq!(status.systems_checked, 2);
        assert_eq!(status.successful, 1);
        assert_eq!(status.failed, 1);
    }

    fn short_timeout_context() -> ProtocolContext {
        let ctx = context();
        let callouts = CalloutCatalog::from_json(
            r#"[{ "code": "10-2", "meaning": "Radio check", "responseRequired": true, "defaultTimeoutMs": 50 }]"#,
        )
        .expect("catalog");
        ProtocolContext {
            callouts: Arc::new(callouts),
            ..ctx
        }
    }

    #[test]
    fn test_non_responsive_handlers_fail_without_raising() {
        let ctx = short_timeout_context();
        ctx.registry
            .register_with_handler(
                AddressRecord::new("SILENT", "report_section", "Silent"),
                Arc::new(|_: &SignalEnvelope| -> Option<Payload> { None }),
            )
            .expect("register");
        ctx.registry
            .register_with_handler(
                AddressRecord::new("SLOW", "report_section", "Slow"),
                Arc::new(|_: &SignalEnvelope| {
                    std::thread::sleep(Duration::from_millis(300));
                    Some(Payload::Empty)
                }),
            )
            .expect("register");
        ctx.registry
            .register_with_handler(
                AddressRecord::new("BROKEN", "report_section", "Broken"),
                Arc::new(|_: &SignalEnvelope| -> Option<Payload> { panic!("handler crashed") }),
            )
            .expect("register");

        let radio = RadioCheck::new(ctx.clone());
        for address in ["SILENT", "SLOW", "BROKEN"] {
            let result = radio.check_one(address);
            assert_eq!(result.status, CheckStatus::Failed, "{}", address);
            assert!(result.response_payload.is_none());
            assert!(result.error.is_some());
            assert_eq!(
                ctx.registry.lookup(address).expect("lookup").status,
                AddressStatus::Offline
            );
        }

        let sweep = radio.check_all();
        assert_eq!(sweep.responses_received, 1);
        assert_eq!(sweep.responses_missing, 4);
        assert_eq!(sweep.results["SLOW"].status, CheckStatus::Failed);
        assert_eq!(sweep.results["SILENT"].status, CheckStatus::Failed);
    }

    #[test]
    fn test_sweep_counts_fixed_at_start() {
        let ctx = context();
        let registry = ctx.registry.clone();
        ctx.registry
            .bind_handler(
                "A",
                Arc::new(move |_: &SignalEnvelope| {
                    let late = AddressRecord::new("LATE", "report_section", "Late");
                    if let Err(e) = registry.register(late) {
                        log::debug!("already registered: {}", e);
                    }
                    Some(Payload::Empty)
                }),
            )
            .expect("bind");

        let radio = RadioCheck::new(ctx.clone());
        let sweep = radio.check_all();

        assert!(ctx.registry.contains("LATE"));
        assert_eq!(sweep.total_systems, 3);
        assert!(!sweep.results.contains_key("LATE"));
        assert_eq!(
            sweep.responses_received + sweep.responses_missing,
            sweep.total_systems - 1
        );
    }

    #[test]
    fn test_slow_response_marks_degraded() {
        let ctx = context();
        ctx.registry
            .bind_handler(
                "B",
                Arc::new(|_: &SignalEnvelope| {
                    std::thread::sleep(Duration::from_millis(60));
                    Some(Payload::Empty)
                }),
            )
            .expect("bind");

        let radio = RadioCheck::new(ctx.clone()).with_degraded_after(Duration::from_millis(20));
        let result = radio.check_one("B");

        assert_eq!(result.status, CheckStatus::Success);
        assert!(result.response_time_ms >= 60);
        assert_eq!(
            ctx.registry.lookup("B").expect("lookup").status,
            AddressStatus::Degraded
        );
    }
}
