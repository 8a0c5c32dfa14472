//! Master system controller: one handle over the registry, catalogs and
//! protocols.
//!
//! Holds nothing of its own beyond the composed parts; every operation is a
//! straight delegation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{CalloutCatalog, DiagnosticCatalog};
use crate::config::BusConfig;
use crate::envelope::SignalEnvelope;
use crate::error::BusError;
use crate::protocols::{
    FaultReport, ProtocolContext, RadioCheck, RadioCheckResult, RadioCheckStatus, RadioSweep,
    Rollcall, RollcallStatus, RollcallSummary, SosFault, SosStatus,
};
use crate::registry::{AddressRecord, AddressRegistry, SignalHandler};
use crate::router::SignalRouter;
use crate::types::{Payload, SignalType};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    pub total_systems: usize,
    pub by_status: BTreeMap<String, usize>,
}

/// Everything observable about the bus at one instant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub captured_at: DateTime<Utc>,
    pub bus_address: String,
    pub registry: RegistryStatus,
    pub radio_check: RadioCheckStatus,
    pub rollcall: RollcallStatus,
    pub sos: SosStatus,
}

pub struct MasterController {
    registry: Arc<AddressRegistry>,
    router: Arc<SignalRouter>,
    callouts: Arc<CalloutCatalog>,
    diagnostics: Arc<DiagnosticCatalog>,
    bus_address: String,
    radio_check: RadioCheck,
    rollcall: Rollcall,
    sos: SosFault,
}

impl MasterController {
    pub fn new(
        config: &BusConfig,
        callouts: CalloutCatalog,
        diagnostics: DiagnosticCatalog,
    ) -> Result<Self, BusError> {
        config.validate()?;

        let registry = Arc::new(AddressRegistry::from_config(config)?);
        let router = Arc::new(SignalRouter::new(registry.clone()));
        let callouts = Arc::new(callouts);
        let diagnostics = Arc::new(diagnostics);

        let ctx = ProtocolContext {
            registry: registry.clone(),
            router: router.clone(),
            callouts: callouts.clone(),
            bus_address: config.bus_address.clone(),
        };

        let mut radio_check = RadioCheck::new(ctx.clone());
        if let Some(ms) = config.degraded_after_ms {
            radio_check = radio_check.with_degraded_after(std::time::Duration::from_millis(ms));
        }
        let rollcall = Rollcall::new(ctx.clone());
        let sos = SosFault::new(
            ctx,
            diagnostics.clone(),
            &config.alert_address,
            config.fault_display_limit,
        );

        log::info!(
            "Controller: bus {} up with {} addresses, alerts to {}",
            config.bus_address,
            registry.len(),
            config.alert_address
        );

        Ok(Self {
            registry,
            router,
            callouts,
            diagnostics,
            bus_address: config.bus_address.clone(),
            radio_check,
            rollcall,
            sos,
        })
    }

    /// Controller over the embedded config and catalogs.
    pub fn from_embedded() -> Result<Self, BusError> {
        Self::new(
            &BusConfig::embedded()?,
            CalloutCatalog::embedded()?,
            DiagnosticCatalog::embedded()?,
        )
    }

    // -- read access --------------------------------------------------------

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    pub fn callouts(&self) -> &CalloutCatalog {
        &self.callouts
    }

    pub fn diagnostics(&self) -> &DiagnosticCatalog {
        &self.diagnostics
    }

    pub fn bus_address(&self) -> &str {
        &self.bus_address
    }

    pub fn alert_address(&self) -> &str {
        self.sos.alert_address()
    }

    pub fn lookup(&self, address: &str) -> Result<AddressRecord, BusError> {
        self.registry.lookup(address)
    }

    // -- registration -------------------------------------------------------

    pub fn register(
        &self,
        record: AddressRecord,
        handler: Option<Arc<dyn SignalHandler>>,
    ) -> Result<(), BusError> {
        match handler {
            Some(handler) => self.registry.register_with_handler(record, handler),
            None => self.registry.register(record),
        }
    }

    pub fn bind_handler(
        &self,
        address: &str,
        handler: Arc<dyn SignalHandler>,
    ) -> Result<(), BusError> {
        self.registry.bind_handler(address, handler)
    }

    // -- signalling ---------------------------------------------------------

    /// Send a generic signal from `caller` to one concrete `target`.
    ///
    /// When the callout does not require an answer, a silent or slow
    /// handler yields `Payload::Empty`. Unknown targets are always errors.
    pub fn send(
        &self,
        caller: &str,
        target: &str,
        radio_code: &str,
        message: &str,
        payload: Payload,
    ) -> Result<Payload, BusError> {
        let envelope =
            SignalEnvelope::builder(caller, target, &self.bus_address, SignalType::Generic, radio_code)
                .message(message)
                .payload(payload)
                .build(&self.callouts);

        match self.router.route(&envelope) {
            Err(e)
                if !envelope.response_expected
                    && e.is_absent_response()
                    && !matches!(e, BusError::UnknownAddress(_)) =>
            {
                log::debug!(
                    "Controller: {} sent no reply to {} ({}), none required",
                    target,
                    radio_code,
                    e
                );
                Ok(Payload::Empty)
            }
            outcome => outcome,
        }
    }

    pub fn radio_check(&self, address: &str) -> RadioCheckResult {
        self.radio_check.check_one(address)
    }

    pub fn radio_check_all(&self) -> RadioSweep {
        self.radio_check.check_all()
    }

    pub fn rollcall(&self) -> RollcallSummary {
        self.rollcall.broadcast()
    }

    pub fn report_fault(
        &self,
        reporting_address: &str,
        fault_code: &str,
        description: &str,
        details: Payload,
    ) -> FaultReport {
        self.sos
            .report_fault(reporting_address, fault_code, description, details)
    }

    pub fn resolve_fault(
        &self,
        reporting_address: &str,
        resolution_details: &str,
    ) -> Result<FaultReport, BusError> {
        self.sos.resolve_fault(reporting_address, resolution_details)
    }

    pub fn faults_for(&self, reporting_address: &str) -> Vec<FaultReport> {
        self.sos.faults_for(reporting_address)
    }

    // -- status -------------------------------------------------------------

    pub fn radio_check_status(&self) -> RadioCheckStatus {
        self.radio_check.status()
    }

    pub fn rollcall_status(&self) -> RollcallStatus {
        self.rollcall.status()
    }

    pub fn sos_status(&self) -> SosStatus {
        self.sos.status()
    }

    pub fn registry_status(&self) -> RegistryStatus {
        let by_status = self
            .registry
            .status_counts()
            .into_iter()
            .map(|(status, count)| (status.as_str().to_string(), count))
            .collect();
        RegistryStatus {
            total_systems: self.registry.len(),
            by_status,
        }
    }

    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            captured_at: Utc::now(),
            bus_address: self.bus_address.clone(),
            registry: self.registry_status(),
            radio_check: self.radio_check_status(),
            rollcall: self.rollcall_status(),
            sos: self.sos_status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::callout::ACKNOWLEDGE;
    use crate::protocols::CheckStatus;
    use crate::types::AddressStatus;

    fn ack() -> Arc<dyn SignalHandler> {
        Arc::new(|_: &SignalEnvelope| Some(Payload::text("10-4")))
    }

    #[test]
    fn test_from_embedded_builds_registry() {
        let controller = MasterController::from_embedded().expect("controller");
        assert_eq!(controller.bus_address(), "MASTER");
        assert_eq!(controller.alert_address(), "ERROR_DISPLAY");
        assert!(controller.lookup("SECTION-3").is_ok());
        assert!(controller.callouts().len() >= 5);
        assert!(controller.diagnostics().get(2004).is_some());
    }

    #[test]
    fn test_send_generic_signal() {
        let controller = MasterController::from_embedded().expect("controller");
        controller
            .bind_handler(
                "EVIDENCE-1",
                Arc::new(|env: &SignalEnvelope| {
                    assert_eq!(env.signal_type, SignalType::Generic);
                    Some(Payload::text(format!("received {}", env.message)))
                }),
            )
            .expect("bind");

        let reply = controller
            .send("SECTION-1", "EVIDENCE-1", "10-50", "contract.pdf", Payload::Empty)
            .expect("reply");
        assert_eq!(reply, Payload::text("received contract.pdf"));

        let missing = controller.send("SECTION-1", "NOPE", ACKNOWLEDGE, "hello", Payload::Empty);
        assert!(matches!(missing, Err(BusError::UnknownAddress(_))));
    }

    #[test]
    fn test_send_without_required_response_tolerates_silence() {
        let controller = MasterController::from_embedded().expect("controller");
        controller
            .bind_handler(
                "EVIDENCE-1",
                Arc::new(|_: &SignalEnvelope| -> Option<Payload> { None }),
            )
            .expect("bind");

        let reply = controller
            .send("SECTION-1", "EVIDENCE-1", ACKNOWLEDGE, "copy", Payload::Empty)
            .expect("acknowledgement needs no reply");
        assert_eq!(reply, Payload::Empty);

        // EVIDENCE-2 has no handler bound.
        let unbound = controller
            .send("SECTION-1", "EVIDENCE-2", ACKNOWLEDGE, "copy", Payload::Empty)
            .expect("acknowledgement needs no handler");
        assert_eq!(unbound, Payload::Empty);

        let required = controller.send("SECTION-1", "EVIDENCE-1", "10-20", "where", Payload::Empty);
        assert!(matches!(
            required,
            Err(BusError::NoResponse { ref reason, .. }) if reason == "declined"
        ));

        let unknown = controller.send("SECTION-1", "GHOST", ACKNOWLEDGE, "copy", Payload::Empty);
        assert!(matches!(unknown, Err(BusError::UnknownAddress(_))));
    }

    #[test]
    fn test_register_at_runtime() {
        let controller = MasterController::from_embedded().expect("controller");
        controller
            .register(
                AddressRecord::new("SECTION-4", "report_section", "Billing Summary").with_parent("SECTION"),
                Some(ack()),
            )
            .expect("register");

        assert!(controller
            .registry()
            .children_of("SECTION")
            .expect("children")
            .contains(&"SECTION-4".to_string()));
        assert_eq!(controller.radio_check("SECTION-4").status, CheckStatus::Success);

        let dup = controller.register(AddressRecord::new("SECTION-4", "report_section", "x"), None);
        assert!(matches!(dup, Err(BusError::DuplicateAddress(_))));
    }

    #[test]
    fn test_system_status_aggregates_protocols() {
        let controller = MasterController::from_embedded().expect("controller");
        controller.bind_handler("SECTION-1", ack()).expect("bind");
        controller.bind_handler("ERROR_DISPLAY", ack()).expect("bind");

        controller.radio_check("SECTION-1");
        controller.report_fault("SECTION-2", "4002", "missing signature", Payload::Empty);

        let status = controller.system_status();
        assert_eq!(status.bus_address, "MASTER");
        assert_eq!(status.registry.total_systems, controller.registry().len());
        assert_eq!(status.registry.by_status.get(AddressStatus::Active.as_str()), Some(&1));
        assert_eq!(status.radio_check.systems_checked, 1);
        assert!(matches!(status.rollcall, RollcallStatus::NotPerformed));
        assert_eq!(status.sos.active_addresses, vec!["SECTION-2".to_string()]);

        let json = serde_json::to_value(&status).expect("serialize");
        assert!(json.get("capturedAt").is_some());
        assert_eq!(json["sos"]["activeCount"], 1);
    }
}
