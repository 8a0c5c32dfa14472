//! Protocols layered on the router: radio check, rollcall and SOS fault.

use std::sync::Arc;

use crate::catalog::CalloutCatalog;
use crate::registry::AddressRegistry;
use crate::router::SignalRouter;

pub mod radio_check;
pub mod rollcall;
pub mod sos;

pub use radio_check::{CheckStatus, RadioCheck, RadioCheckResult, RadioCheckStatus, RadioSweep};
pub use rollcall::{Rollcall, RollcallStatus, RollcallSummary};
pub use sos::{FaultReport, FaultStatus, SosFault, SosStatus};

/// Shared handles every protocol needs.
#[derive(Clone)]
pub struct ProtocolContext {
    pub registry: Arc<AddressRegistry>,
    pub router: Arc<SignalRouter>,
    pub callouts: Arc<CalloutCatalog>,
    pub bus_address: String,
}

impl ProtocolContext {
    /// Every registered address except the bus itself, in order.
    pub fn peer_addresses(&self) -> Vec<String> {
        self.registry
            .all_addresses(&[self.bus_address.as_str()])
            .collect()
    }
}
