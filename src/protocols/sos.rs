//! SOS fault: emergency reports with escalation to the alert display.
//!
//! Each reporting address has at most one active fault. A new report from
//! the same address supersedes the active one: the older entry is closed
//! out as resolved with a pointer to its replacement, so nothing in the log
//! stays "active" without being tracked. The log itself is never trimmed;
//! only the status view is limited to the most recent entries.
//!
//! Notifications are best-effort. Recording a fault always succeeds.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::ProtocolContext;
use crate::catalog::callout::EMERGENCY;
use crate::catalog::DiagnosticCatalog;
use crate::envelope::{next_signal_id, SignalEnvelope};
use crate::error::BusError;
use crate::types::{Payload, SignalType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultReport {
    pub fault_id: String,
    pub reporting_address: String,
    pub fault_code: String,
    /// Catalog text for `fault_code`.
    pub fault_description: String,
    pub description: String,
    pub details: Payload,
    pub status: FaultStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SosStatus {
    pub active_count: usize,
    pub total_logged: usize,
    pub active_addresses: Vec<String>,
    pub recent_faults: Vec<FaultReport>,
    pub active_faults: BTreeMap<String, FaultReport>,
}

#[derive(Debug, Default)]
struct FaultLog {
    entries: Vec<FaultReport>,
    /// Reporting address -> index of its active fault in `entries`.
    active: BTreeMap<String, usize>,
}

pub struct SosFault {
    ctx: ProtocolContext,
    diagnostics: Arc<DiagnosticCatalog>,
    alert_address: String,
    display_limit: usize,
    log: Mutex<FaultLog>,
}

impl SosFault {
    pub fn new(
        ctx: ProtocolContext,
        diagnostics: Arc<DiagnosticCatalog>,
        alert_address: &str,
        display_limit: usize,
    ) -> Self {
        Self {
            ctx,
            diagnostics,
            alert_address: alert_address.to_string(),
            display_limit,
            log: Mutex::new(FaultLog::default()),
        }
    }

    pub fn alert_address(&self) -> &str {
        &self.alert_address
    }

    /// Record a fault for `reporting_address` and raise the alarm.
    pub fn report_fault(
        &self,
        reporting_address: &str,
        fault_code: &str,
        description: &str,
        details: Payload,
    ) -> FaultReport {
        if !self.ctx.registry.contains(reporting_address) {
            log::warn!("SOS: fault reported by unregistered address {}", reporting_address);
        }

        let now = Utc::now();
        let report = FaultReport {
            fault_id: next_signal_id("SOS"),
            reporting_address: reporting_address.to_string(),
            fault_code: fault_code.to_string(),
            fault_description: self.diagnostics.describe_str(fault_code),
            description: description.to_string(),
            details,
            status: FaultStatus::Active,
            created_at: now,
            resolved_at: None,
            resolution_details: None,
            superseded_by: None,
        };

        {
            let mut faults = self.log.lock();
            if let Some(previous) = faults.active.get(reporting_address).copied() {
                let entry = &mut faults.entries[previous];
                entry.status = FaultStatus::Resolved;
                entry.resolved_at = Some(now);
                entry.resolution_details = Some(format!("superseded by {}", report.fault_id));
                entry.superseded_by = Some(report.fault_id.clone());
                log::info!(
                    "SOS: {} superseded by {} for {}",
                    entry.fault_id,
                    report.fault_id,
                    reporting_address
                );
            }
            faults.entries.push(report.clone());
            let index = faults.entries.len() - 1;
            faults.active.insert(reporting_address.to_string(), index);
        }

        log::warn!(
            "SOS: {} from {}: {} ({}) {}",
            report.fault_id,
            reporting_address,
            report.fault_code,
            report.fault_description,
            report.description
        );

        self.notify(&report);
        report
    }

    /// Send the fault to the bus and to the alert display. Failures are
    /// logged and otherwise ignored; the two sends are independent.
    fn notify(&self, report: &FaultReport) {
        let details = match serde_json::to_value(report) {
            Ok(value) => Payload::Json(value),
            Err(e) => {
                log::warn!("SOS: could not serialize {}: {}", report.fault_id, e);
                Payload::text(report.description.clone())
            }
        };
        let timeout = self.ctx.callouts.minimum_timeout();

        for target in [self.ctx.bus_address.as_str(), self.alert_address.as_str()] {
            let envelope = SignalEnvelope::builder(
                &report.reporting_address,
                target,
                &self.ctx.bus_address,
                SignalType::SosFault,
                EMERGENCY,
            )
            .message(format!(
                "SOS {} from {}: {}",
                report.fault_code, report.reporting_address, report.description
            ))
            .payload(details.clone())
            .timeout(timeout)
            .build(&self.ctx.callouts);

            if let Err(e) = self.ctx.router.route(&envelope) {
                log::warn!("SOS: notification of {} to {} failed: {}", report.fault_id, target, e);
            }
        }
    }

    /// Close the active fault for an address.
    pub fn resolve_fault(
        &self,
        reporting_address: &str,
        resolution_details: &str,
    ) -> Result<FaultReport, BusError> {
        let mut faults = self.log.lock();
        let index = faults
            .active
            .remove(reporting_address)
            .ok_or_else(|| BusError::NoActiveFault(reporting_address.to_string()))?;

        let entry = &mut faults.entries[index];
        entry.status = FaultStatus::Resolved;
        entry.resolved_at = Some(Utc::now());
        entry.resolution_details = Some(resolution_details.to_string());

        log::info!(
            "SOS: {} for {} resolved: {}",
            entry.fault_id,
            reporting_address,
            resolution_details
        );
        Ok(entry.clone())
    }

    pub fn active_fault(&self, reporting_address: &str) -> Option<FaultReport> {
        let faults = self.log.lock();
        faults
            .active
            .get(reporting_address)
            .map(|&index| faults.entries[index].clone())
    }

    /// Every fault ever reported by an address, oldest first.
    pub fn faults_for(&self, reporting_address: &str) -> Vec<FaultReport> {
        self.log
            .lock()
            .entries
            .iter()
            .filter(|f| f.reporting_address == reporting_address)
            .cloned()
            .collect()
    }

    pub fn status(&self) -> SosStatus {
        let faults = self.log.lock();
        let active_faults: BTreeMap<String, FaultReport> = faults
            .active
            .iter()
            .map(|(address, &index)| (address.clone(), faults.entries[index].clone()))
            .collect();
        let skip = faults.entries.len().saturating_sub(self.display_limit);

        SosStatus {
            active_count: active_faults.len(),
            total_logged: faults.entries.len(),
            active_addresses: active_faults.keys().cloned().collect(),
            recent_faults: faults.entries[skip..].to_vec(),
            active_faults,
        }
    }
}
