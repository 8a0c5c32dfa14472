//! Signal router: resolves one concrete target and invokes its handler.
//!
//! The handler runs on its own thread so the envelope timeout can be
//! enforced no matter what the handler does. A handler that overruns is
//! abandoned; its eventual reply is dropped. The router never touches
//! registry status; that is up to the calling protocol.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::envelope::SignalEnvelope;
use crate::error::BusError;
use crate::registry::AddressRegistry;
use crate::types::Payload;

pub struct SignalRouter {
    registry: Arc<AddressRegistry>,
    abandoned: AtomicUsize,
}

impl SignalRouter {
    pub fn new(registry: Arc<AddressRegistry>) -> Self {
        Self {
            registry,
            abandoned: AtomicUsize::new(0),
        }
    }

    /// Handler threads left running after their envelope timed out.
    pub fn abandoned_workers(&self) -> usize {
        self.abandoned.load(Ordering::Relaxed)
    }

    pub fn registry(&self) -> &Arc<AddressRegistry> {
        &self.registry
    }

    /// Deliver an envelope to its target and wait for the reply.
    ///
    /// Broadcast envelopes are rejected: fan-out belongs to the rollcall
    /// protocol, which routes one copy per address.
    pub fn route(&self, envelope: &SignalEnvelope) -> Result<Payload, BusError> {
        let target = envelope.target_address.as_str();

        let handler = match self.registry.handler(target) {
            Ok(Some(handler)) => handler,
            Ok(None) => {
                log::warn!("Router: no handler bound for {}", target);
                return Err(BusError::HandlerUnavailable(target.to_string()));
            }
            Err(e) => {
                log::warn!("Router: {} ({})", e, envelope.signal_id);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel();
        let request = envelope.clone();
        let spawned = thread::Builder::new()
            .name(format!("casebus-{}", target))
            .spawn(move || {
                let reply = handler.handle(&request);
                // Receiver is gone if we already timed out.
                let _ = tx.send(reply);
            });

        if let Err(e) = spawned {
            log::warn!("Router: failed to spawn handler thread for {}: {}", target, e);
            return Err(BusError::NoResponse {
                address: target.to_string(),
                reason: format!("could not start handler: {}", e),
            });
        }

        match rx.recv_timeout(envelope.timeout()) {
            Ok(Some(payload)) => {
                log::debug!("Router: {} answered {}", target, envelope.signal_id);
                Ok(payload)
            }
            Ok(None) => {
                log::debug!("Router: {} declined {}", target, envelope.signal_id);
                Err(BusError::NoResponse {
                    address: target.to_string(),
                    reason: "declined".to_string(),
                })
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The worker thread is detached, not killed; it exits whenever the handler returns.
                let abandoned = self.abandoned.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(
                    "Router: {} timed out after {} ms ({}), {} handler threads abandoned",
                    target,
                    envelope.timeout_ms,
                    envelope.signal_id,
                    abandoned
                );
                Err(BusError::Timeout {
                    address: target.to_string(),
                    timeout_ms: envelope.timeout_ms,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                log::warn!("Router: handler for {} failed ({})", target, envelope.signal_id);
                Err(BusError::NoResponse {
                    address: target.to_string(),
                    reason: "handler failed".to_string(),
                })
            }
        }
    }
}
