//! Static code catalogs loaded once at start-up.
//!
//! Callout codes describe what a signal means and how long to wait for an
//! answer. Diagnostic codes give human-readable text for numeric status codes.

pub mod callout;
pub mod diagnostic;

pub use callout::{CalloutCatalog, CalloutCode};
pub use diagnostic::{DiagnosticBand, DiagnosticCatalog, DiagnosticCode};
