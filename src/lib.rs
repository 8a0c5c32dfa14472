//! In-process signal bus for report-section handlers, evidence processors,
//! UI panels and core controllers.
//!
//! Components register under a hierarchical address and exchange short,
//! typed signals through the router. Three protocols sit on top: radio
//! check (liveness probing), rollcall (population census) and SOS fault
//! (emergency escalation). `MasterController` composes all of it.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod envelope;
pub mod error;
pub mod protocols;
pub mod registry;
pub mod router;
pub mod types;

pub use controller::{MasterController, SystemStatus};
pub use envelope::{SignalEnvelope, BROADCAST};
pub use error::{BusError, ConfigError};
pub use registry::{AddressRecord, AddressRegistry, SignalHandler};
pub use types::{AddressStatus, Payload, SignalType};
