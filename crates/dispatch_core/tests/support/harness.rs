use std::sync::Arc;

use dispatch_contracts::routing::{
    DRIVER_CMD_TRIP_ACCEPT, DRIVER_CMD_TRIP_DECLINE, TRIP_EVENT_CREATED,
    TRIP_EVENT_DRIVER_NOT_INTERESTED,
};
use dispatch_contracts::{DriverTripResponse, Envelope};
use dispatch_core::availability::DriverAvailabilityIndex;
use dispatch_core::broker::Delivery;
use dispatch_core::config::DispatchConfig;
use dispatch_core::coordinator::DispatchCoordinator;
use dispatch_core::error::DispatchError;
use dispatch_core::matching::MatchingPolicy;
use dispatch_core::telemetry::DispatchTelemetry;
use dispatch_core::test_helpers::{ride_fare, RecordingPublisher};
use dispatch_core::trip::{TripRecord, TripService, TripStore};

/// Coordinator wired to a recording publisher. [`DispatchHarness::pump`]
/// plays the broker: events bound for the coordinator's queues are fed back
/// to it in publish order, everything else is collected as outbound.
pub struct DispatchHarness {
    pub index: Arc<DriverAvailabilityIndex>,
    pub trips: Arc<TripStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub telemetry: Arc<DispatchTelemetry>,
    pub coordinator: DispatchCoordinator,
    pub service: TripService,
    next_tag: u64,
}

/// Builder for reproducible dispatch harnesses.
#[derive(Default)]
pub struct DispatchHarnessBuilder {
    policy: Option<Arc<dyn MatchingPolicy>>,
    config: DispatchConfig,
}

impl DispatchHarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, policy: Arc<dyn MatchingPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> DispatchHarness {
        let index = Arc::new(DriverAvailabilityIndex::new());
        let trips = Arc::new(TripStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let telemetry = Arc::new(DispatchTelemetry::default());
        let mut coordinator = DispatchCoordinator::new(
            Arc::clone(&index),
            Arc::clone(&trips),
            publisher.clone(),
            Arc::clone(&telemetry),
        )
        .with_config(self.config);
        if let Some(policy) = self.policy {
            coordinator = coordinator.with_policy(policy);
        }
        let service = TripService::new(Arc::clone(&trips), Arc::clone(&index), publisher.clone());
        DispatchHarness {
            index,
            trips,
            publisher,
            telemetry,
            coordinator,
            service,
            next_tag: 1,
        }
    }
}

impl DispatchHarness {
    pub fn new() -> Self {
        DispatchHarnessBuilder::new().build()
    }

    pub fn register_drivers(&self, package_slug: &str, driver_ids: &[&str]) {
        for driver_id in driver_ids {
            self.index.register_driver(driver_id, package_slug);
        }
    }

    /// Create a trip for `user_id` and run dispatch until it settles.
    pub fn create_trip(&mut self, user_id: &str, package_slug: &str) -> (String, Vec<Envelope>) {
        let trip = self
            .service
            .create_trip(ride_fare(user_id, package_slug))
            .expect("trip created");
        let outbound = self.pump();
        (trip.trip_id, outbound)
    }

    pub fn accept(&mut self, driver_id: &str, trip_id: &str) -> Result<Vec<Envelope>, DispatchError> {
        self.respond(DRIVER_CMD_TRIP_ACCEPT, driver_id, trip_id)
    }

    pub fn decline(&mut self, driver_id: &str, trip_id: &str) -> Result<Vec<Envelope>, DispatchError> {
        self.respond(DRIVER_CMD_TRIP_DECLINE, driver_id, trip_id)
    }

    /// Deliver a driver response as the gateway would, then settle.
    pub fn respond(
        &mut self,
        routing_key: &str,
        driver_id: &str,
        trip_id: &str,
    ) -> Result<Vec<Envelope>, DispatchError> {
        let envelope = Envelope::new(
            routing_key,
            driver_id,
            &DriverTripResponse {
                trip_id: trip_id.to_string(),
                rider_id: String::new(),
            },
        )
        .expect("response envelope");
        self.deliver(envelope)?;
        Ok(self.pump())
    }

    pub fn deliver(&mut self, envelope: Envelope) -> Result<(), DispatchError> {
        let delivery = Delivery {
            queue: "harness".to_string(),
            delivery_tag: self.next_tag,
            envelope,
        };
        self.next_tag += 1;
        self.coordinator.handle_delivery(&delivery)
    }

    /// Feed coordinator-bound events back until none are left; return the rest.
    pub fn pump(&mut self) -> Vec<Envelope> {
        let mut outbound = Vec::new();
        loop {
            let batch = self.publisher.take();
            if batch.is_empty() {
                return outbound;
            }
            for envelope in batch {
                match envelope.routing_key.as_str() {
                    TRIP_EVENT_CREATED | TRIP_EVENT_DRIVER_NOT_INTERESTED => {
                        self.deliver(envelope).expect("coordinator handles event");
                    }
                    _ => outbound.push(envelope),
                }
            }
        }
    }

    pub fn trip(&self, trip_id: &str) -> TripRecord {
        self.trips.get(trip_id).expect("trip stored")
    }
}
