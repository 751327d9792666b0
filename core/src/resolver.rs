//! Driver resolver: maps normalized entries to internal driver identities.
//!
//! Fallback chain, first hit wins:
//!   1. driver id carried by the source row
//!   2. the platform's integration reference on the driver
//!   3. normalized vehicle plate
//!
//! Indices are built once per batch from the active roster and are
//! read-only afterwards.

use crate::{
    normalizer::{normalize_plate, strategy_for, NormalizedWeeklyEntry},
    roster::Driver,
    types::{DriverId, Platform},
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    DriverId,
    Integration,
    Plate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched { driver_id: DriverId, via: MatchKind },
    Unresolved,
}

/// Entries grouped by driver plus per-platform miss counts.
#[derive(Debug, Clone, Default)]
pub struct ResolvedEntries {
    pub by_driver: BTreeMap<DriverId, Vec<NormalizedWeeklyEntry>>,
    pub unresolved: BTreeMap<Platform, usize>,
}

impl ResolvedEntries {
    pub fn unresolved_total(&self) -> usize {
        self.unresolved.values().sum()
    }
}

pub struct DriverResolver {
    drivers: Vec<Driver>,
    by_id: HashMap<DriverId, usize>,
    by_integration: HashMap<Platform, HashMap<String, usize>>,
    by_plate: HashMap<String, usize>,
}

impl DriverResolver {
    /// Build indices from the roster. Inactive drivers are left out.
    pub fn build(roster: &[Driver]) -> Self {
        let mut drivers: Vec<Driver> = roster.iter().filter(|d| d.is_active()).cloned().collect();
        drivers.sort_by(|a, b| a.id.cmp(&b.id));

        let mut by_id = HashMap::new();
        let mut by_integration: HashMap<Platform, HashMap<String, usize>> = HashMap::new();
        let mut by_plate = HashMap::new();

        for (idx, driver) in drivers.iter().enumerate() {
            by_id.insert(driver.id.clone(), idx);

            for (platform, reference) in &driver.integrations {
                let key = strategy_for(*platform).reference_key(reference);
                if key.is_empty() {
                    continue;
                }
                let index = by_integration.entry(*platform).or_default();
                if let Some(&other) = index.get(&key) {
                    log::warn!(
                        "{platform} reference '{key}' shared by {} and {}; keeping {}",
                        drivers[other].id,
                        driver.id,
                        drivers[other].id
                    );
                    continue;
                }
                index.insert(key, idx);
            }

            if let Some(plate) = driver.vehicle_plate.as_deref().map(normalize_plate) {
                if !plate.is_empty() {
                    by_plate.entry(plate).or_insert(idx);
                }
            }
        }

        Self { drivers, by_id, by_integration, by_plate }
    }

    pub fn driver(&self, driver_id: &str) -> Option<&Driver> {
        self.by_id.get(driver_id).map(|&idx| &self.drivers[idx])
    }

    pub fn resolve(&self, entry: &NormalizedWeeklyEntry) -> Resolution {
        let matched = |idx: usize, via| Resolution::Matched {
            driver_id: self.drivers[idx].id.clone(),
            via,
        };

        if let Some(&idx) = entry.driver_id.as_deref().and_then(|id| self.by_id.get(id)) {
            return matched(idx, MatchKind::DriverId);
        }
        if let Some(&idx) = self
            .by_integration
            .get(&entry.platform)
            .and_then(|index| index.get(&entry.reference_id))
        {
            return matched(idx, MatchKind::Integration);
        }
        if let Some(&idx) = self.by_plate.get(&normalize_plate(&entry.reference_id)) {
            return matched(idx, MatchKind::Plate);
        }
        Resolution::Unresolved
    }

    pub fn resolve_all(&self, entries: Vec<NormalizedWeeklyEntry>) -> ResolvedEntries {
        let mut out = ResolvedEntries::default();
        for entry in entries {
            match self.resolve(&entry) {
                Resolution::Matched { driver_id, .. } => {
                    out.by_driver.entry(driver_id).or_default().push(entry);
                }
                Resolution::Unresolved => {
                    log::debug!("unresolved {} entry '{}'", entry.platform, entry.reference_id);
                    *out.unresolved.entry(entry.platform).or_default() += 1;
                }
            }
        }
        out
    }
}
