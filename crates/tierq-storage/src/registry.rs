//! Authoritative table metadata.
//!
//! The registry maps every known table name to its tier and usage counter. Entries are
//! created by discovery and afterwards only mutated, never removed. All mutations take
//! the write lock for the duration of a single map update, so a location read used for
//! routing never observes a half-applied change.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tierq_core::metrics::REGISTERED_TABLES;
use tierq_core::{CoreError, CoreResult, Location, TableEntry};

/// In-memory registry of table name → [`TableEntry`].
pub struct MetadataRegistry {
    entries: RwLock<HashMap<String, TableEntry>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a new entry with a zero usage count.
    ///
    /// Returns `false` and leaves the existing entry untouched if `name` is already
    /// registered.
    pub fn register(&self, name: &str, location: Location) -> bool {
        let inserted = {
            let mut entries = self.entries.write();
            if entries.contains_key(name) {
                false
            } else {
                entries.insert(name.to_string(), TableEntry::new(name, location));
                true
            }
        };
        if inserted {
            self.publish_gauges();
        }
        inserted
    }

    /// Inserts `name` or overwrites its location, preserving usage statistics.
    ///
    /// Discovery calls this once per source; the source applied last wins.
    pub fn merge_discovered(&self, name: &str, location: Location) {
        {
            let mut entries = self.entries.write();
            entries
                .entry(name.to_string())
                .and_modify(|entry| entry.location = location)
                .or_insert_with(|| TableEntry::new(name, location));
        }
        self.publish_gauges();
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Current location of `name`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnknownTable` if the table is not registered.
    pub fn location_of(&self, name: &str) -> CoreResult<Location> {
        self.entries
            .read()
            .get(name)
            .map(|entry| entry.location)
            .ok_or_else(|| CoreError::unknown_table(name))
    }

    /// Sets the location of a registered table. Setting the current value is a no-op.
    pub fn set_location(&self, name: &str, location: Location) -> CoreResult<()> {
        {
            let mut entries = self.entries.write();
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| CoreError::unknown_table(name))?;
            if entry.location == location {
                return Ok(());
            }
            entry.location = location;
        }
        self.publish_gauges();
        Ok(())
    }

    /// Increments the usage counter and returns the new count.
    pub fn increment_usage(&self, name: &str) -> CoreResult<u64> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| CoreError::unknown_table(name))?;
        entry.usage_count += 1;
        entry.last_used_at = Some(Utc::now());
        Ok(entry.usage_count)
    }

    pub fn get(&self, name: &str) -> Option<TableEntry> {
        self.entries.read().get(name).cloned()
    }

    /// Copy of every entry, sorted by name.
    pub fn snapshot(&self) -> Vec<TableEntry> {
        let mut entries: Vec<TableEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// `(local, remote)` entry counts.
    pub fn count_by_location(&self) -> (usize, usize) {
        let entries = self.entries.read();
        let local = entries.values().filter(|e| e.location.is_local()).count();
        (local, entries.len() - local)
    }

    fn publish_gauges(&self) {
        let (local, remote) = self.count_by_location();
        REGISTERED_TABLES
            .with_label_values(&[Location::Local.as_str()])
            .set(local as i64);
        REGISTERED_TABLES
            .with_label_values(&[Location::Remote.as_str()])
            .set(remote as i64);
    }
}

impl Default for MetadataRegistry {
    fn default() -> Self {
        Self::new()
    }
}
