use std::sync::Arc;

use dispatch_contracts::routing::TRIP_EVENT_CREATED;
use dispatch_contracts::{Envelope, RideFare, TripEventData};
use ulid::Ulid;

use super::state::{TripEvent, TripRecord};
use super::store::{TripError, TripStore};
use crate::availability::DriverAvailabilityIndex;
use crate::broker::EventPublisher;
use crate::error::DispatchError;

/// Creates trips from selected fares and ends them.
///
/// Ending a trip returns the driver it held to the availability pool.
#[derive(Clone)]
pub struct TripService {
    trips: Arc<TripStore>,
    index: Arc<DriverAvailabilityIndex>,
    publisher: Arc<dyn EventPublisher>,
}

impl TripService {
    pub fn new(
        trips: Arc<TripStore>,
        index: Arc<DriverAvailabilityIndex>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            trips,
            index,
            publisher,
        }
    }

    /// Store a pending trip for `fare` and announce it with `trip.created`.
    ///
    /// The trip stays stored when the announcement fails.
    pub fn create_trip(&self, fare: RideFare) -> Result<TripRecord, DispatchError> {
        let record = TripRecord::new(Ulid::new().to_string(), fare);
        self.trips.insert(record.clone());
        let envelope = Envelope::new(
            TRIP_EVENT_CREATED,
            record.user_id.clone(),
            &TripEventData {
                trip: record.summary(),
            },
        )?;
        self.publisher.publish(envelope)?;
        tracing::info!(
            trip_id = %record.trip_id,
            user_id = %record.user_id,
            package_slug = record.package_slug(),
            "trip created"
        );
        Ok(record)
    }

    pub fn cancel_trip(&self, trip_id: &str) -> Result<TripRecord, DispatchError> {
        let before = self
            .trips
            .get(trip_id)
            .ok_or_else(|| TripError::NotFound(trip_id.to_string()))?;
        let record = self.trips.apply(trip_id, &TripEvent::Cancelled)?;
        if let Some(driver_id) = before.offered_driver.as_deref() {
            if let Err(error) = self.index.release(driver_id) {
                tracing::warn!(trip_id, driver_id, %error, "could not release offered driver");
            }
        }
        self.free_assigned_driver(&record);
        tracing::info!(trip_id, "trip cancelled");
        Ok(record)
    }

    pub fn complete_trip(&self, trip_id: &str) -> Result<TripRecord, DispatchError> {
        let record = self.trips.apply(trip_id, &TripEvent::Completed)?;
        self.free_assigned_driver(&record);
        tracing::info!(trip_id, "trip completed");
        Ok(record)
    }

    pub fn get(&self, trip_id: &str) -> Option<TripRecord> {
        self.trips.get(trip_id)
    }

    fn free_assigned_driver(&self, record: &TripRecord) {
        let Some(driver_id) = record.assigned_driver.as_deref() else {
            return;
        };
        // The driver may have gone offline since accepting.
        if let Err(error) = self.index.mark_available(driver_id) {
            tracing::debug!(trip_id = %record.trip_id, driver_id, %error, "driver not returned to pool");
        }
    }
}
