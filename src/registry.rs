//! ==============================================================================
//! registry.rs - table of known nodes
//! ==============================================================================
//!
//! purpose:
//!     one row per node id holding the last measurement text and when it was
//!     seen. rows are upserted on every recognized advertisement and dropped
//!     by a periodic sweep once older than the ttl.
//!
//! sizing:
//!     a handful to tens of nodes, so a plain vec with linear lookup.
//!
//! relationships:
//!     - used by: coordinator.rs (sole owner, single task)
//!
//! ==============================================================================

use std::time::Duration;

use crate::domain::{NodeIdentity, RegistryEntry, SnapshotRow, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

pub struct PotRegistry {
    entries: Vec<RegistryEntry>,
    ttl: Duration,
}

impl PotRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Vec::new(), ttl }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &NodeIdentity) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// overwrite or insert, whether or not the measurement changed
    pub fn upsert(&mut self, id: &NodeIdentity, measurement: &str, now: Timestamp) -> Upsert {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.id == id) {
            entry.last_measurement = measurement.to_string();
            entry.last_seen = now;
            return Upsert::Updated;
        }

        self.entries.push(RegistryEntry {
            id: id.clone(),
            last_measurement: measurement.to_string(),
            last_seen: now,
        });
        Upsert::Inserted
    }

    /// drop every entry last seen more than `ttl` before `now`
    pub fn evict_stale(&mut self, now: Timestamp) -> Vec<RegistryEntry> {
        let ttl = self.ttl;
        let (stale, fresh): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| now.saturating_duration_since(e.last_seen) > ttl);
        self.entries = fresh;
        stale
    }

    pub fn snapshot(&self, now: Timestamp) -> Vec<SnapshotRow> {
        self.entries
            .iter()
            .map(|e| SnapshotRow {
                id: e.id.to_string(),
                weight: e.last_measurement.clone(),
                seconds_since_seen: now.saturating_duration_since(e.last_seen).as_secs(),
            })
            .collect()
    }
}
