//! Dispatch Coordinator: turns trip lifecycle events into driver offers.
//!
//! The coordinator consumes two queues. `find_available_drivers` carries
//! `trip.created` and `trip.driverNotInterested`, both of which run a round of
//! matching. `driver_trip_response` carries the offered driver's accept or
//! decline. Every status change goes through the [`TripStore`], every driver
//! reservation through the [`DriverAvailabilityIndex`].

use std::sync::Arc;

use dispatch_contracts::routing::{
    DRIVER_CMD_TRIP_ACCEPT, DRIVER_CMD_TRIP_DECLINE, DRIVER_CMD_TRIP_REQUEST,
    DRIVER_TRIP_RESPONSE_QUEUE, FIND_AVAILABLE_DRIVERS_QUEUE, TRIP_EVENT_CREATED,
    TRIP_EVENT_DRIVER_ASSIGNED, TRIP_EVENT_DRIVER_NOT_INTERESTED, TRIP_EVENT_NO_DRIVERS_FOUND,
};
use dispatch_contracts::payloads::TripStatus;
use dispatch_contracts::{
    DriverNotInterestedData, DriverTripResponse, Envelope, TripEventData, TripSummary,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::availability::DriverAvailabilityIndex;
use crate::broker::{
    BrokerError, Delivery, DeliveryHandler, EventPublisher, InMemoryBroker, Subscription,
};
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::matching::{FirstRegistered, MatchingPolicy};
use crate::telemetry::DispatchTelemetry;
use crate::trip::{TripError, TripEvent, TripRecord, TripStore};

/// Event-driven matcher. Clones share all state.
#[derive(Clone)]
pub struct DispatchCoordinator {
    index: Arc<DriverAvailabilityIndex>,
    trips: Arc<TripStore>,
    publisher: Arc<dyn EventPublisher>,
    policy: Arc<dyn MatchingPolicy>,
    telemetry: Arc<DispatchTelemetry>,
    config: DispatchConfig,
    expiries: TaskTracker,
    shutdown: CancellationToken,
}

impl DispatchCoordinator {
    /// A coordinator with the first-registered policy and default config.
    pub fn new(
        index: Arc<DriverAvailabilityIndex>,
        trips: Arc<TripStore>,
        publisher: Arc<dyn EventPublisher>,
        telemetry: Arc<DispatchTelemetry>,
    ) -> Self {
        Self {
            index,
            trips,
            publisher,
            policy: Arc::new(FirstRegistered),
            telemetry,
            config: DispatchConfig::default(),
            expiries: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn MatchingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn trip(&self, trip_id: &str) -> Option<TripRecord> {
        self.trips.get(trip_id)
    }

    /// Subscribe to both coordinator queues on `broker`.
    pub fn start(&self, broker: &InMemoryBroker) -> Result<CoordinatorHandle, BrokerError> {
        let subscriptions = vec![
            broker.subscribe(FIND_AVAILABLE_DRIVERS_QUEUE, self.clone())?,
            broker.subscribe(DRIVER_TRIP_RESPONSE_QUEUE, self.clone())?,
        ];
        tracing::info!(policy = self.policy.name(), "dispatch coordinator started");
        Ok(CoordinatorHandle {
            coordinator: self.clone(),
            subscriptions,
        })
    }

    /// Route one delivery by its routing key.
    pub fn handle_delivery(&self, delivery: &Delivery) -> Result<(), DispatchError> {
        match delivery.routing_key() {
            TRIP_EVENT_CREATED => {
                let Some(data) = self.decode::<TripEventData>(delivery) else {
                    return Ok(());
                };
                self.on_trip_created(&data.trip)
            }
            TRIP_EVENT_DRIVER_NOT_INTERESTED => {
                let Some(data) = self.decode::<DriverNotInterestedData>(delivery) else {
                    return Ok(());
                };
                self.on_driver_not_interested(&data)
            }
            DRIVER_CMD_TRIP_ACCEPT => {
                let Some(response) = self.decode::<DriverTripResponse>(delivery) else {
                    return Ok(());
                };
                self.on_trip_accept(delivery.owner_id(), &response.trip_id)
            }
            DRIVER_CMD_TRIP_DECLINE => {
                let Some(response) = self.decode::<DriverTripResponse>(delivery) else {
                    return Ok(());
                };
                self.on_trip_decline(delivery.owner_id(), &response.trip_id)
            }
            other => Err(DispatchError::UnexpectedRoutingKey(other.to_string())),
        }
    }

    fn decode<T: DeserializeOwned>(&self, delivery: &Delivery) -> Option<T> {
        match delivery.envelope.decode_payload() {
            Ok(data) => Some(data),
            Err(error) => {
                self.telemetry.record_decode_failure();
                tracing::warn!(
                    queue = %delivery.queue,
                    routing_key = delivery.routing_key(),
                    owner_id = delivery.owner_id(),
                    %error,
                    "dropping undecodable event"
                );
                None
            }
        }
    }

    fn on_trip_created(&self, summary: &TripSummary) -> Result<(), DispatchError> {
        let trip = self.trips.adopt(TripRecord::from_summary(summary));
        if trip.status != TripStatus::Pending {
            tracing::debug!(trip_id = %trip.trip_id, status = %trip.status, "trip already dispatched");
            return Ok(());
        }
        self.find_and_offer(&trip)
    }

    fn on_driver_not_interested(&self, data: &DriverNotInterestedData) -> Result<(), DispatchError> {
        let trip = self
            .trips
            .get(&data.trip_id)
            .ok_or_else(|| TripError::NotFound(data.trip_id.clone()))?;
        if trip.status != TripStatus::DeclinedRetry {
            tracing::debug!(trip_id = %trip.trip_id, status = %trip.status, "trip no longer waiting for a driver");
            return Ok(());
        }
        self.find_and_offer(&trip)
    }

    /// One round of matching: offer the trip to the driver the policy picks,
    /// or report that nobody is available.
    fn find_and_offer(&self, trip: &TripRecord) -> Result<(), DispatchError> {
        let mut candidates: Vec<String> = self
            .index
            .find_available(trip.package_slug())
            .into_iter()
            .filter(|driver_id| !trip.has_declined(driver_id))
            .collect();

        loop {
            let Some(driver_id) = self.policy.select_driver(trip, &candidates) else {
                return self.report_no_drivers(trip);
            };
            match self.index.try_offer(&driver_id) {
                Ok(()) => return self.send_offer(trip, &driver_id),
                Err(error) => {
                    // Taken or gone since the lookup; try the rest.
                    tracing::debug!(trip_id = %trip.trip_id, %driver_id, %error, "candidate lost");
                    let before = candidates.len();
                    candidates.retain(|candidate| *candidate != driver_id);
                    if candidates.len() == before {
                        tracing::warn!(
                            trip_id = %trip.trip_id,
                            %driver_id,
                            policy = self.policy.name(),
                            "policy picked a driver outside the candidates"
                        );
                        return self.report_no_drivers(trip);
                    }
                }
            }
        }
    }

    fn send_offer(&self, trip: &TripRecord, driver_id: &str) -> Result<(), DispatchError> {
        let event = TripEvent::OfferSent {
            driver_id: driver_id.to_string(),
        };
        let offered = match self.trips.apply(&trip.trip_id, &event) {
            Ok(offered) => offered,
            Err(error) => {
                self.release(&trip.trip_id, driver_id);
                return Err(error.into());
            }
        };
        let delivered = Envelope::new(
            DRIVER_CMD_TRIP_REQUEST,
            driver_id,
            &TripEventData {
                trip: offered.summary(),
            },
        )
        .map_err(DispatchError::from)
        .and_then(|envelope| self.publish(envelope));
        if let Err(error) = delivered {
            self.withdraw_offer(&trip.trip_id, driver_id);
            return Err(error);
        }
        self.telemetry.record_offer();
        tracing::info!(
            trip_id = %trip.trip_id,
            driver_id,
            policy = self.policy.name(),
            "trip offered"
        );
        self.schedule_expiry(&trip.trip_id, driver_id);
        Ok(())
    }

    /// Undo an offer the driver never received: the trip goes back to
    /// waiting for dispatch, then the driver back to the pool.
    fn withdraw_offer(&self, trip_id: &str, driver_id: &str) {
        let event = TripEvent::OfferWithdrawn {
            driver_id: driver_id.to_string(),
        };
        match self.trips.apply(trip_id, &event) {
            Ok(trip) => tracing::warn!(trip_id, driver_id, status = %trip.status, "offer withdrawn"),
            Err(error) => tracing::warn!(trip_id, driver_id, %error, "offer not withdrawn"),
        }
        self.release(trip_id, driver_id);
    }

    fn report_no_drivers(&self, trip: &TripRecord) -> Result<(), DispatchError> {
        let updated = self.trips.apply(&trip.trip_id, &TripEvent::NoDriversFound)?;
        let envelope = Envelope::new(
            TRIP_EVENT_NO_DRIVERS_FOUND,
            updated.user_id.clone(),
            &TripEventData {
                trip: updated.summary(),
            },
        )?;
        self.publish(envelope)?;
        self.telemetry.record_no_drivers();
        tracing::info!(
            trip_id = %updated.trip_id,
            package_slug = updated.package_slug(),
            "no drivers found"
        );
        Ok(())
    }

    fn on_trip_accept(&self, driver_id: &str, trip_id: &str) -> Result<(), DispatchError> {
        let event = TripEvent::DriverAccepted {
            driver_id: driver_id.to_string(),
        };
        let trip = self.trips.apply(trip_id, &event)?;
        if let Err(error) = self.index.mark_unavailable(driver_id) {
            tracing::warn!(trip_id, driver_id, %error, "accepting driver is no longer registered");
        }
        self.telemetry.record_assignment();
        let envelope = Envelope::new(
            TRIP_EVENT_DRIVER_ASSIGNED,
            trip.user_id.clone(),
            &TripEventData {
                trip: trip.summary(),
            },
        )?;
        self.publish(envelope)?;
        tracing::info!(trip_id, driver_id, user_id = %trip.user_id, "driver assigned");
        Ok(())
    }

    fn on_trip_decline(&self, driver_id: &str, trip_id: &str) -> Result<(), DispatchError> {
        let event = TripEvent::DriverDeclined {
            driver_id: driver_id.to_string(),
        };
        let trip = self.trips.apply(trip_id, &event)?;
        self.release(trip_id, driver_id);
        self.telemetry.record_decline();
        tracing::info!(trip_id, driver_id, "driver declined");

        let envelope = Envelope::new(
            TRIP_EVENT_DRIVER_NOT_INTERESTED,
            trip.user_id.clone(),
            &DriverNotInterestedData {
                trip_id: trip.trip_id.clone(),
                rider_id: trip.user_id.clone(),
                package_slug: trip.package_slug().to_string(),
                declined_driver_id: driver_id.to_string(),
            },
        )?;
        self.publish(envelope)
    }

    /// Treat a still-unanswered offer as declined by `driver_id`.
    fn expire_offer(&self, trip_id: &str, driver_id: &str) -> Result<(), DispatchError> {
        let still_offered = self.trips.get(trip_id).is_some_and(|trip| {
            trip.status == TripStatus::DriverRequested
                && trip.offered_driver.as_deref() == Some(driver_id)
        });
        if !still_offered {
            return Ok(());
        }
        self.telemetry.record_offer_expired();
        tracing::info!(trip_id, driver_id, "offer expired");
        self.on_trip_decline(driver_id, trip_id)
    }

    fn schedule_expiry(&self, trip_id: &str, driver_id: &str) {
        let Some(timeout) = self.config.offer_timeout else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(trip_id, "no runtime, offer will not expire");
            return;
        };
        let coordinator = self.clone();
        let token = self.shutdown.clone();
        let trip_id = trip_id.to_string();
        let driver_id = driver_id.to_string();
        let expiry = self.expiries.track_future(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Err(error) = coordinator.expire_offer(&trip_id, &driver_id) {
                        tracing::warn!(%trip_id, %driver_id, %error, "offer expiry failed");
                    }
                }
            }
        });
        runtime.spawn(expiry);
    }

    fn release(&self, trip_id: &str, driver_id: &str) {
        if let Err(error) = self.index.release(driver_id) {
            tracing::debug!(trip_id, driver_id, %error, "driver not released");
        }
    }

    fn publish(&self, envelope: Envelope) -> Result<(), DispatchError> {
        let routing_key = envelope.routing_key.clone();
        self.publisher.publish(envelope).map_err(|error| {
            self.telemetry.record_publish_failure();
            tracing::error!(%routing_key, %error, "publish failed");
            DispatchError::from(error)
        })
    }
}

impl DeliveryHandler for DispatchCoordinator {
    fn handle(&self, delivery: &Delivery) -> Result<(), DispatchError> {
        self.handle_delivery(delivery)
    }
}

/// The coordinator's running subscriptions.
pub struct CoordinatorHandle {
    coordinator: DispatchCoordinator,
    subscriptions: Vec<Subscription>,
}

impl CoordinatorHandle {
    pub fn coordinator(&self) -> &DispatchCoordinator {
        &self.coordinator
    }

    /// Stop consuming and cancel pending offer expiries.
    pub async fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe().await;
        }
        self.coordinator.shutdown.cancel();
        self.coordinator.expiries.close();
        self.coordinator.expiries.wait().await;
        tracing::info!("dispatch coordinator stopped");
    }
}
