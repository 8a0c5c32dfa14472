//! Address registry: who is on the bus and how to reach them.
//!
//! Records are created from static configuration at start-up. Handlers are
//! bound once, at registration or shortly after, and never looked up by
//! name afterwards. Records are never removed; a component that goes away
//! is marked `Offline`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::BusConfig;
use crate::envelope::{SignalEnvelope, BROADCAST};
use crate::error::BusError;
use crate::types::{AddressStatus, Payload};

/// Capability a component registers to receive signals.
///
/// Returning `None` means "no response", including when the handler hit an
/// internal error.
pub trait SignalHandler: Send + Sync + 'static {
    fn handle(&self, envelope: &SignalEnvelope) -> Option<Payload>;
}

impl<F> SignalHandler for F
where
    F: Fn(&SignalEnvelope) -> Option<Payload> + Send + Sync + 'static,
{
    fn handle(&self, envelope: &SignalEnvelope) -> Option<Payload> {
        self(envelope)
    }
}

/// One registered component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
    pub address: String,
    pub kind: String,
    pub display_name: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub status: AddressStatus,
    pub last_check: Option<DateTime<Utc>>,
}

impl AddressRecord {
    pub fn new(address: &str, kind: &str, display_name: &str) -> Self {
        Self {
            address: address.to_string(),
            kind: kind.to_string(),
            display_name: display_name.to_string(),
            parent: None,
            children: Vec::new(),
            status: AddressStatus::Unknown,
            last_check: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }
}

struct Entry {
    record: AddressRecord,
    handler: Option<Arc<dyn SignalHandler>>,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("record", &self.record)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct AddressRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the config's address table, in declaration order.
    pub fn from_config(config: &BusConfig) -> Result<Self, BusError> {
        let registry = Self::new();
        for entry in &config.addresses {
            let mut record = AddressRecord::new(&entry.address, &entry.kind, &entry.display_name);
            record.parent = entry.parent.clone();
            registry.register(record)?;
        }
        log::info!("Registry: loaded {} addresses", registry.len());
        Ok(registry)
    }

    pub fn register(&self, record: AddressRecord) -> Result<(), BusError> {
        self.insert(record, None)
    }

    pub fn register_with_handler(
        &self,
        record: AddressRecord,
        handler: Arc<dyn SignalHandler>,
    ) -> Result<(), BusError> {
        self.insert(record, Some(handler))
    }

    fn insert(
        &self,
        mut record: AddressRecord,
        handler: Option<Arc<dyn SignalHandler>>,
    ) -> Result<(), BusError> {
        if record.address == BROADCAST {
            return Err(BusError::DuplicateAddress(record.address));
        }

        let mut entries = self.entries.write();
        if entries.contains_key(&record.address) {
            return Err(BusError::DuplicateAddress(record.address));
        }

        if let Some(parent) = &record.parent {
            match entries.get_mut(parent) {
                Some(parent_entry) => {
                    if !parent_entry.record.children.contains(&record.address) {
                        parent_entry.record.children.push(record.address.clone());
                    }
                }
                None => {
                    return Err(BusError::DanglingParent {
                        address: record.address,
                        parent: parent.clone(),
                    })
                }
            }
        }

        // Children are derived from later registrations only.
        record.children.clear();

        log::debug!(
            "Registry: registered {} ({}) handler={}",
            record.address,
            record.kind,
            handler.is_some()
        );
        entries.insert(record.address.clone(), Entry { record, handler });
        Ok(())
    }

    /// Attach or replace the handler for an already registered address.
    pub fn bind_handler(
        &self,
        address: &str,
        handler: Arc<dyn SignalHandler>,
    ) -> Result<(), BusError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(address)
            .ok_or_else(|| BusError::UnknownAddress(address.to_string()))?;
        entry.handler = Some(handler);
        Ok(())
    }

    pub fn lookup(&self, address: &str) -> Result<AddressRecord, BusError> {
        self.entries
            .read()
            .get(address)
            .map(|e| e.record.clone())
            .ok_or_else(|| BusError::UnknownAddress(address.to_string()))
    }

    /// The handler bound to an address, if any.
    pub fn handler(&self, address: &str) -> Result<Option<Arc<dyn SignalHandler>>, BusError> {
        self.entries
            .read()
            .get(address)
            .map(|e| e.handler.clone())
            .ok_or_else(|| BusError::UnknownAddress(address.to_string()))
    }

    pub fn set_status(
        &self,
        address: &str,
        status: AddressStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<(), BusError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(address)
            .ok_or_else(|| BusError::UnknownAddress(address.to_string()))?;
        entry.record.status = status;
        entry.record.last_check = Some(timestamp);
        Ok(())
    }

    /// Addresses in lexicographic order, skipping `excluding`.
    pub fn all_addresses(&self, excluding: &[&str]) -> Addresses {
        let keys: Arc<[String]> = self.entries.read().keys().cloned().collect();
        Addresses {
            keys,
            excluding: excluding.iter().map(|s| s.to_string()).collect(),
            pos: 0,
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.read().contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn children_of(&self, address: &str) -> Result<Vec<String>, BusError> {
        self.lookup(address).map(|r| r.children)
    }

    /// Parent chain from the immediate parent up to the root.
    pub fn ancestors_of(&self, address: &str) -> Result<Vec<String>, BusError> {
        let entries = self.entries.read();
        let mut current = entries
            .get(address)
            .ok_or_else(|| BusError::UnknownAddress(address.to_string()))?;

        let mut chain = Vec::new();
        while let Some(parent) = &current.record.parent {
            chain.push(parent.clone());
            match entries.get(parent) {
                Some(entry) => current = entry,
                None => break,
            }
        }
        Ok(chain)
    }

    pub fn status_counts(&self) -> HashMap<AddressStatus, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.read().values() {
            *counts.entry(entry.record.status).or_insert(0) += 1;
        }
        counts
    }

    /// All records, ordered by address.
    pub fn snapshot(&self) -> Vec<AddressRecord> {
        self.entries
            .read()
            .values()
            .map(|e| e.record.clone())
            .collect()
    }
}

/// Lazy iterator over registered addresses, captured at creation time.
///
/// Clone it (or call `restart`) to walk the same sequence again.
#[derive(Debug, Clone)]
pub struct Addresses {
    keys: Arc<[String]>,
    excluding: HashSet<String>,
    pos: usize,
}

impl Addresses {
    pub fn restart(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for Addresses {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while self.pos < self.keys.len() {
            let key = &self.keys[self.pos];
            self.pos += 1;
            if !self.excluding.contains(key) {
                return Some(key.clone());
            }
        }
        None
    }
}
