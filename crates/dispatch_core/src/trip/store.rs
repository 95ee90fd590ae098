use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

use super::state::{TransitionError, TripEvent, TripRecord};

#[derive(Debug, Error)]
pub enum TripError {
    #[error("trip {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// In-memory trips by id. Events are applied under the store lock, so two
/// handlers racing on the same trip see each other's transitions in order.
#[derive(Debug, Default)]
pub struct TripStore {
    trips: Mutex<HashMap<String, TripRecord>>,
}

impl TripStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a trip.
    pub fn insert(&self, record: TripRecord) {
        self.trips.lock().insert(record.trip_id.clone(), record);
    }

    /// Keep the stored trip if there is one, otherwise store `record`.
    /// Returns the trip as stored.
    pub fn adopt(&self, record: TripRecord) -> TripRecord {
        self.trips
            .lock()
            .entry(record.trip_id.clone())
            .or_insert(record)
            .clone()
    }

    pub fn get(&self, trip_id: &str) -> Option<TripRecord> {
        self.trips.lock().get(trip_id).cloned()
    }

    /// Apply `event` to the stored trip and return the updated copy.
    pub fn apply(&self, trip_id: &str, event: &TripEvent) -> Result<TripRecord, TripError> {
        let mut trips = self.trips.lock();
        let record = trips
            .get_mut(trip_id)
            .ok_or_else(|| TripError::NotFound(trip_id.to_string()))?;
        let status = record.apply(event)?;
        tracing::debug!(trip_id, event = event.name(), %status, "trip transition");
        Ok(record.clone())
    }

    pub fn len(&self) -> usize {
        self.trips.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored trip, ordered by id.
    pub fn snapshot(&self) -> Vec<TripRecord> {
        let mut trips: Vec<_> = self.trips.lock().values().cloned().collect();
        trips.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));
        trips
    }
}
