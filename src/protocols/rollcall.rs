//! Rollcall: who is on the bus right now.
//!
//! One census envelope is fanned out to every address except the bus. The
//! snapshot answers "who is up at this moment"; it replaces the previous
//! one wholesale and keeps no history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use super::ProtocolContext;
use crate::catalog::callout::ROLLCALL;
use crate::envelope::{SignalEnvelope, BROADCAST};
use crate::types::{AddressStatus, Payload, SignalType};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollcallSummary {
    pub rollcall_id: String,
    pub timestamp: DateTime<Utc>,
    /// Addressable systems, not counting the bus itself.
    pub total_systems: usize,
    pub responding_count: usize,
    pub missing_count: usize,
    pub missing: Vec<String>,
    pub responses: BTreeMap<String, Option<Payload>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RollcallStatus {
    NotPerformed,
    #[serde(rename_all = "camelCase")]
    Completed {
        rollcall_id: String,
        timestamp: DateTime<Utc>,
        total_systems: usize,
        responding_count: usize,
        missing_count: usize,
        missing: Vec<String>,
    },
}

pub struct Rollcall {
    ctx: ProtocolContext,
    latest: RwLock<Option<RollcallSummary>>,
}

impl Rollcall {
    pub fn new(ctx: ProtocolContext) -> Self {
        Self {
            ctx,
            latest: RwLock::new(None),
        }
    }

    /// Census every non-bus address and replace the stored snapshot.
    pub fn broadcast(&self) -> RollcallSummary {
        let rollcall_id = format!("ROLLCALL-{}", Uuid::new_v4());
        let template = SignalEnvelope::builder(
            &self.ctx.bus_address,
            BROADCAST,
            &self.ctx.bus_address,
            SignalType::Rollcall,
            ROLLCALL,
        )
        .message("Rollcall: all units report")
        .payload(Payload::Json(serde_json::json!({ "rollcallId": rollcall_id })))
        .response_expected(true)
        .build(&self.ctx.callouts);

        let mut responses = BTreeMap::new();
        for address in self.ctx.peer_addresses() {
            let envelope = template.for_target(&address);
            let reply = match self.ctx.router.route(&envelope) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    log::debug!("Rollcall: {} missing: {}", address, e);
                    None
                }
            };

            let status = if reply.is_some() {
                AddressStatus::Active
            } else {
                AddressStatus::Offline
            };
            if let Err(e) = self.ctx.registry.set_status(&address, status, Utc::now()) {
                log::warn!("Rollcall: could not update status for {}: {}", address, e);
            }

            responses.insert(address, reply);
        }

        let missing: Vec<String> = responses
            .iter()
            .filter(|(_, reply)| reply.is_none())
            .map(|(address, _)| address.clone())
            .collect();
        let total_systems = responses.len();

        let summary = RollcallSummary {
            rollcall_id,
            timestamp: Utc::now(),
            total_systems,
            responding_count: total_systems - missing.len(),
            missing_count: missing.len(),
            missing,
            responses,
        };

        log::info!(
            "Rollcall: {} of {} responding ({})",
            summary.responding_count,
            summary.total_systems,
            summary.rollcall_id
        );

        *self.latest.write() = Some(summary.clone());
        summary
    }

    /// Full snapshot of the most recent rollcall, if any.
    pub fn latest(&self) -> Option<RollcallSummary> {
        self.latest.read().clone()
    }

    pub fn status(&self) -> RollcallStatus {
        match &*self.latest.read() {
            None => RollcallStatus::NotPerformed,
            Some(summary) => RollcallStatus::Completed {
                rollcall_id: summary.rollcall_id.clone(),
                timestamp: summary.timestamp,
                total_systems: summary.total_systems,
                responding_count: summary.responding_count,
                missing_count: summary.missing_count,
                missing: summary.missing.clone(),
            },
        }
    }
}
