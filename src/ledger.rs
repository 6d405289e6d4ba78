// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Checksum ledger.
//!
//! The ledger remembers the last observed content checksum of every Grafana
//! object, one section per [`ResourceKind`]. Sections are never patched.
//! A polling pass builds a brand new section, and swaps it in only once the
//! pass over that kind has fully succeeded. Thus, keys of deleted objects
//! vanish with the next successful pass, and a failed pass leaves the
//! previous section untouched.

use crate::resource::{ResourceKey, ResourceKind};

use std::collections::HashMap;

/// Last observed checksums of one resource kind.
pub type LedgerSection = HashMap<ResourceKey, u32>;

/// Last observed checksums of all resource kinds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChecksumLedger {
    datasources: LedgerSection,
    dashboards: LedgerSection,
}

impl ChecksumLedger {
    /// Construct new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow section of target kind.
    pub fn section(&self, kind: ResourceKind) -> &LedgerSection {
        match kind {
            ResourceKind::DataSource => &self.datasources,
            ResourceKind::Dashboard => &self.dashboards,
        }
    }

    /// Replace section of target kind wholesale.
    pub fn commit(&mut self, kind: ResourceKind, section: LedgerSection) {
        match kind {
            ResourceKind::DataSource => self.datasources = section,
            ResourceKind::Dashboard => self.dashboards = section,
        }
    }

    /// Last observed checksum of object.
    pub fn get(&self, kind: ResourceKind, key: &ResourceKey) -> Option<u32> {
        self.section(kind).get(key).copied()
    }

    /// Total number of tracked objects.
    pub fn len(&self) -> usize {
        self.datasources.len() + self.dashboards.len()
    }

    /// Check if ledger tracks no objects at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
