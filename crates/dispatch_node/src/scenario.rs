//! Simulated participants driving the pipeline through real sessions.

use std::collections::BTreeMap;
use std::time::Duration;

use dispatch_contracts::routing::{
    DRIVER_CMD_REGISTER, DRIVER_CMD_TRIP_ACCEPT, DRIVER_CMD_TRIP_DECLINE,
    DRIVER_CMD_TRIP_REQUEST,
};
use dispatch_contracts::{DriverTripResponse, RideFare, SessionMessage, TripEventData};
use dispatch_core::connection::ConnectionRegistry;
use dispatch_core::gateway::{Gateway, PeerIo, SessionIo};
use dispatch_core::trip::TripService;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::{DriverSpec, TripSpec};
use crate::NodeError;

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);
const SESSION_POLL_INTERVAL: Duration = Duration::from_millis(5);
const SESSION_BUFFER: usize = 32;

/// Who connects, what they ride, and how picky the drivers are.
#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    pub drivers: Vec<DriverSpec>,
    pub trips: Vec<TripSpec>,
    pub decline_probability: f64,
    pub seed: u64,
}

/// What the simulated participants saw.
#[derive(Debug, Default)]
pub struct ScenarioReport {
    pub offers_received: usize,
    pub accepted: usize,
    pub declined: usize,
    /// rider id → notification kinds, in arrival order
    pub rider_notices: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
struct DriverOutcome {
    offers: usize,
    accepted: usize,
    declined: usize,
}

/// Running simulated participants.
pub struct Participants {
    token: CancellationToken,
    drivers: Vec<JoinHandle<DriverOutcome>>,
    riders: Vec<(String, JoinHandle<Vec<String>>)>,
}

/// Connect every driver and rider of `plan`, then request its trips.
pub async fn launch(
    gateway: &Gateway,
    service: &TripService,
    plan: &ScenarioPlan,
) -> Result<Participants, NodeError> {
    let token = CancellationToken::new();
    let mut drivers = Vec::with_capacity(plan.drivers.len());
    for (n, spec) in plan.drivers.iter().enumerate() {
        let (io, peer) = SessionIo::pair(SESSION_BUFFER);
        gateway.connect_driver(
            &format!(
                "participant_id={}&package_slug={}",
                spec.driver_id, spec.package_slug
            ),
            io,
        )?;
        let (registered_tx, registered_rx) = oneshot::channel();
        let rng = StdRng::seed_from_u64(plan.seed.wrapping_add(n as u64));
        drivers.push(tokio::spawn(simulate_driver(
            spec.driver_id.clone(),
            peer,
            rng,
            plan.decline_probability,
            registered_tx,
            token.clone(),
        )));
        // Trips are only requested once every driver is matchable.
        match tokio::time::timeout(REGISTRATION_TIMEOUT, registered_rx).await {
            Ok(Ok(())) => {}
            _ => return Err(NodeError::Registration(spec.driver_id.clone())),
        }
    }

    let mut riders = Vec::new();
    let mut seen = BTreeMap::new();
    for spec in &plan.trips {
        if seen.insert(spec.rider_id.clone(), ()).is_some() {
            continue;
        }
        let (io, peer) = SessionIo::pair(SESSION_BUFFER);
        gateway.connect_rider(&format!("participant_id={}", spec.rider_id), io)?;
        riders.push((
            spec.rider_id.clone(),
            tokio::spawn(simulate_rider(spec.rider_id.clone(), peer, token.clone())),
        ));
        // A notice published before the session exists would be missed.
        if !wait_for_session(&gateway.context().registry, &spec.rider_id).await {
            return Err(NodeError::Registration(spec.rider_id.clone()));
        }
    }

    for (n, spec) in plan.trips.iter().enumerate() {
        let trip = service.create_trip(fare_for(n, spec))?;
        tracing::info!(
            trip_id = %trip.trip_id,
            rider_id = %spec.rider_id,
            package_slug = %spec.package_slug,
            "trip requested"
        );
    }

    Ok(Participants {
        token,
        drivers,
        riders,
    })
}

impl Participants {
    /// Stop every participant and collect what they saw.
    pub async fn finish(self) -> ScenarioReport {
        self.token.cancel();
        let mut report = ScenarioReport::default();
        for driver in self.drivers {
            match driver.await {
                Ok(outcome) => {
                    report.offers_received += outcome.offers;
                    report.accepted += outcome.accepted;
                    report.declined += outcome.declined;
                }
                Err(error) => tracing::warn!(%error, "simulated driver failed"),
            }
        }
        for (rider_id, rider) in self.riders {
            match rider.await {
                Ok(notices) => {
                    report.rider_notices.insert(rider_id, notices);
                }
                Err(error) => tracing::warn!(%rider_id, %error, "simulated rider failed"),
            }
        }
        report
    }
}

/// Whether `participant_id` got a live session within the registration timeout.
async fn wait_for_session(registry: &ConnectionRegistry, participant_id: &str) -> bool {
    tokio::time::timeout(REGISTRATION_TIMEOUT, async {
        while !registry.is_connected(participant_id) {
            tokio::time::sleep(SESSION_POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

fn fare_for(n: usize, spec: &TripSpec) -> RideFare {
    RideFare::at_base_price(format!("fare-{n}"), spec.rider_id.as_str(), spec.package_slug.as_str())
}

async fn simulate_driver(
    driver_id: String,
    mut peer: PeerIo,
    mut rng: StdRng,
    decline_probability: f64,
    registered: oneshot::Sender<()>,
    token: CancellationToken,
) -> DriverOutcome {
    let mut outcome = DriverOutcome::default();
    let mut registered = Some(registered);
    loop {
        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            frame = peer.from_gateway.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };
        let message = match SessionMessage::from_text(&frame) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%driver_id, %error, "driver got a malformed frame");
                continue;
            }
        };
        match message.kind.as_str() {
            DRIVER_CMD_REGISTER => {
                if let Some(registered) = registered.take() {
                    let _ = registered.send(());
                }
            }
            DRIVER_CMD_TRIP_REQUEST => {
                let offer: TripEventData = match serde_json::from_value(message.data) {
                    Ok(offer) => offer,
                    Err(error) => {
                        tracing::warn!(%driver_id, %error, "driver got an unreadable offer");
                        continue;
                    }
                };
                outcome.offers += 1;
                let declines = rng.gen::<f64>() < decline_probability;
                let kind = if declines {
                    outcome.declined += 1;
                    DRIVER_CMD_TRIP_DECLINE
                } else {
                    outcome.accepted += 1;
                    DRIVER_CMD_TRIP_ACCEPT
                };
                let response = DriverTripResponse {
                    trip_id: offer.trip.id.clone(),
                    rider_id: offer.trip.user_id.clone(),
                };
                let reply = serde_json::to_value(&response)
                    .map(|data| SessionMessage::new(kind, data))
                    .map_err(|error| error.to_string())
                    .and_then(|reply| reply.to_text().map_err(|error| error.to_string()));
                match reply {
                    Ok(text) => {
                        if peer.to_gateway.send(text).await.is_err() {
                            break;
                        }
                        tracing::info!(%driver_id, trip_id = %offer.trip.id, %kind, "driver answered");
                    }
                    Err(error) => tracing::warn!(%driver_id, %error, "driver could not answer"),
                }
            }
            other => tracing::debug!(%driver_id, kind = other, "driver ignored message"),
        }
    }
    outcome
}

async fn simulate_rider(rider_id: String, mut peer: PeerIo, token: CancellationToken) -> Vec<String> {
    let mut notices = Vec::new();
    loop {
        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            frame = peer.from_gateway.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };
        match SessionMessage::from_text(&frame) {
            Ok(message) => {
                tracing::info!(%rider_id, kind = %message.kind, "rider notified");
                notices.push(message.kind);
            }
            Err(error) => tracing::warn!(%rider_id, %error, "rider got a malformed frame"),
        }
    }
    notices
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dispatch_contracts::routing::TRIP_EVENT_NO_DRIVERS_FOUND;
    use dispatch_core::availability::DriverAvailabilityIndex;
    use dispatch_core::broker::{EventPublisher, InMemoryBroker};
    use dispatch_core::config::{BrokerConfig, DispatchConfig};
    use dispatch_core::coordinator::DispatchCoordinator;
    use dispatch_core::gateway::GatewayContext;
    use dispatch_core::telemetry::DispatchTelemetry;
    use dispatch_core::trip::TripStore;
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn fares_follow_package_base_prices() {
        let spec = TripSpec {
            rider_id: "rider-1".to_string(),
            package_slug: "van".to_string(),
        };
        let fare = fare_for(3, &spec);
        assert_eq!(fare.id, "fare-3");
        assert_eq!(fare.user_id, "rider-1");
        assert_eq!(fare.total_price_in_cents, 400.0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_wait_times_out_without_a_connection() {
        let registry = ConnectionRegistry::new();
        assert!(!wait_for_session(&registry, "rider-1").await);

        let (tx, _rx) = mpsc::unbounded_channel();
        registry.add("rider-1", tx);
        assert!(wait_for_session(&registry, "rider-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn riders_hear_about_trips_requested_right_after_connecting() {
        let broker = InMemoryBroker::connect(&BrokerConfig::default()).expect("broker");
        let publisher: Arc<dyn EventPublisher> = Arc::new(broker.clone());
        let index = Arc::new(DriverAvailabilityIndex::new());
        let trips = Arc::new(TripStore::new());
        let telemetry = Arc::new(DispatchTelemetry::default());
        let coordinator = DispatchCoordinator::new(
            Arc::clone(&index),
            Arc::clone(&trips),
            Arc::clone(&publisher),
            Arc::clone(&telemetry),
        )
        .start(&broker)
        .expect("coordinator");
        let service = TripService::new(trips, Arc::clone(&index), publisher);
        let gateway = Gateway::new(GatewayContext {
            registry: ConnectionRegistry::new(),
            broker: broker.clone(),
            directory: index,
            telemetry: Arc::clone(&telemetry),
            config: DispatchConfig::default(),
        });
        let plan = ScenarioPlan {
            drivers: Vec::new(),
            trips: vec![TripSpec {
                rider_id: "rider-1".to_string(),
                package_slug: "luxury".to_string(),
            }],
            decline_probability: 0.0,
            seed: 7,
        };

        let participants = launch(&gateway, &service, &plan).await.expect("launched");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let report = participants.finish().await;
        gateway.shutdown().await;
        coordinator.shutdown().await;
        broker.close();

        assert_eq!(report.rider_notices["rider-1"], [TRIP_EVENT_NO_DRIVERS_FOUND]);
        assert_eq!(telemetry.snapshot().missed_notifications, 0);
        assert_eq!(telemetry.snapshot().no_drivers_found, 1);
    }
}
