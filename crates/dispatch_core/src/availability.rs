//! Driver Availability Index: drivers by package, in registration order.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use dispatch_contracts::DriverSummary;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityState {
    Available,
    /// Holding an unanswered trip offer.
    Offered,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRecord {
    pub driver_id: String,
    pub package_slug: String,
    pub state: AvailabilityState,
    pub registered_at: DateTime<Utc>,
    #[serde(skip)]
    sequence: u64,
}

impl DriverRecord {
    pub fn summary(&self) -> DriverSummary {
        DriverSummary {
            id: self.driver_id.clone(),
            package_slug: self.package_slug.clone(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AvailabilityError {
    #[error("driver {0} is not registered")]
    UnknownDriver(String),
    #[error("driver {driver_id} is {state:?}, expected {expected:?}")]
    WrongState {
        driver_id: String,
        state: AvailabilityState,
        expected: AvailabilityState,
    },
}

/// Counts per availability state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilityCounts {
    pub available: usize,
    pub offered: usize,
    pub unavailable: usize,
}

#[derive(Debug, Default)]
struct IndexState {
    drivers: HashMap<String, DriverRecord>,
    /// package slug → registration sequence → driver id
    by_package: HashMap<String, BTreeMap<u64, String>>,
    next_sequence: u64,
}

impl IndexState {
    fn detach(&mut self, driver_id: &str) -> Option<DriverRecord> {
        let record = self.drivers.remove(driver_id)?;
        if let Some(order) = self.by_package.get_mut(&record.package_slug) {
            order.remove(&record.sequence);
            if order.is_empty() {
                self.by_package.remove(&record.package_slug);
            }
        }
        Some(record)
    }

    fn transition(
        &mut self,
        driver_id: &str,
        expected: AvailabilityState,
        next: AvailabilityState,
    ) -> Result<(), AvailabilityError> {
        let record = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AvailabilityError::UnknownDriver(driver_id.to_string()))?;
        if record.state != expected {
            return Err(AvailabilityError::WrongState {
                driver_id: driver_id.to_string(),
                state: record.state,
                expected,
            });
        }
        record.state = next;
        Ok(())
    }
}

/// In-memory driver registry. Every operation runs under one lock, so a
/// driver unregistered before [`DriverAvailabilityIndex::find_available`]
/// returns is never part of its result.
///
/// The index knows nothing about sessions: a driver stays available after its
/// connection drops unless someone unregisters it.
#[derive(Debug, Default)]
pub struct DriverAvailabilityIndex {
    state: Mutex<IndexState>,
}

impl DriverAvailabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver as available.
    ///
    /// Re-registering moves the driver to the back of its package's order
    /// and keeps an `Offered` or `Unavailable` state: a reconnect never
    /// frees a driver that holds an offer or a trip.
    pub fn register_driver(&self, driver_id: &str, package_slug: &str) -> DriverRecord {
        let mut state = self.state.lock();
        let availability = match state.detach(driver_id) {
            Some(previous) => {
                tracing::debug!(driver_id, state = ?previous.state, "re-registering driver");
                previous.state
            }
            None => AvailabilityState::Available,
        };
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let record = DriverRecord {
            driver_id: driver_id.to_string(),
            package_slug: package_slug.to_string(),
            state: availability,
            registered_at: Utc::now(),
            sequence,
        };
        state
            .by_package
            .entry(package_slug.to_string())
            .or_default()
            .insert(sequence, driver_id.to_string());
        state.drivers.insert(driver_id.to_string(), record.clone());
        tracing::info!(
            driver_id,
            package_slug,
            drivers = state.drivers.len(),
            "driver registered"
        );
        record
    }

    pub fn unregister_driver(&self, driver_id: &str) -> Option<DriverRecord> {
        let removed = self.state.lock().detach(driver_id);
        if removed.is_some() {
            tracing::info!(driver_id, "driver unregistered");
        }
        removed
    }

    /// Available drivers of `package_slug`, first registered first.
    pub fn find_available(&self, package_slug: &str) -> Vec<String> {
        let state = self.state.lock();
        let Some(order) = state.by_package.get(package_slug) else {
            return Vec::new();
        };
        order
            .values()
            .filter(|driver_id| {
                state
                    .drivers
                    .get(*driver_id)
                    .is_some_and(|record| record.state == AvailabilityState::Available)
            })
            .cloned()
            .collect()
    }

    /// Reserve an available driver for an offer.
    pub fn try_offer(&self, driver_id: &str) -> Result<(), AvailabilityError> {
        self.state.lock().transition(
            driver_id,
            AvailabilityState::Available,
            AvailabilityState::Offered,
        )
    }

    /// Return an offered driver to the pool.
    pub fn release(&self, driver_id: &str) -> Result<(), AvailabilityError> {
        self.state.lock().transition(
            driver_id,
            AvailabilityState::Offered,
            AvailabilityState::Available,
        )
    }

    /// Take a driver out of matching (it accepted a trip).
    pub fn mark_unavailable(&self, driver_id: &str) -> Result<(), AvailabilityError> {
        let mut state = self.state.lock();
        let record = state
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AvailabilityError::UnknownDriver(driver_id.to_string()))?;
        record.state = AvailabilityState::Unavailable;
        Ok(())
    }

    /// Put a driver back into matching, e.g. after a trip ends.
    pub fn mark_available(&self, driver_id: &str) -> Result<(), AvailabilityError> {
        let mut state = self.state.lock();
        let record = state
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AvailabilityError::UnknownDriver(driver_id.to_string()))?;
        record.state = AvailabilityState::Available;
        Ok(())
    }

    pub fn get(&self, driver_id: &str) -> Option<DriverRecord> {
        self.state.lock().drivers.get(driver_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> AvailabilityCounts {
        let state = self.state.lock();
        let mut counts = AvailabilityCounts::default();
        for record in state.drivers.values() {
            match record.state {
                AvailabilityState::Available => counts.available += 1,
                AvailabilityState::Offered => counts.offered += 1,
                AvailabilityState::Unavailable => counts.unavailable += 1,
            }
        }
        counts
    }
}
