use std::sync::Arc;
use std::time::Duration;

use dispatch_contracts::routing::{DRIVER_CMD_TRIP_ACCEPT, DRIVER_CMD_TRIP_DECLINE};
use dispatch_contracts::SessionMessage;
use dispatch_core::availability::DriverAvailabilityIndex;
use dispatch_core::broker::InMemoryBroker;
use dispatch_core::config::{BrokerConfig, DispatchConfig};
use dispatch_core::connection::ConnectionRegistry;
use dispatch_core::coordinator::{CoordinatorHandle, DispatchCoordinator};
use dispatch_core::gateway::{Gateway, GatewayContext, PeerIo, SessionIo};
use dispatch_core::telemetry::DispatchTelemetry;
use dispatch_core::trip::{TripService, TripStore};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// The whole pipeline on an in-process broker: coordinator, gateway, and
/// trip service.
pub struct LivePipeline {
    pub broker: InMemoryBroker,
    pub index: Arc<DriverAvailabilityIndex>,
    pub registry: ConnectionRegistry,
    pub telemetry: Arc<DispatchTelemetry>,
    pub service: TripService,
    pub gateway: Gateway,
    coordinator: CoordinatorHandle,
}

impl LivePipeline {
    pub fn start(config: DispatchConfig) -> Self {
        let broker = InMemoryBroker::connect(&BrokerConfig::default()).expect("broker");
        let index = Arc::new(DriverAvailabilityIndex::new());
        let trips = Arc::new(TripStore::new());
        let registry = ConnectionRegistry::new();
        let telemetry = Arc::new(DispatchTelemetry::default());
        let publisher = Arc::new(broker.clone());

        let coordinator = DispatchCoordinator::new(
            Arc::clone(&index),
            Arc::clone(&trips),
            publisher.clone(),
            Arc::clone(&telemetry),
        )
        .with_config(config)
        .start(&broker)
        .expect("coordinator");
        let service = TripService::new(trips, Arc::clone(&index), publisher);
        let gateway = Gateway::new(GatewayContext {
            registry: registry.clone(),
            broker: broker.clone(),
            directory: index.clone(),
            telemetry: Arc::clone(&telemetry),
            config,
        });

        Self {
            broker,
            index,
            registry,
            telemetry,
            service,
            gateway,
            coordinator,
        }
    }

    pub async fn connect_driver(&self, driver_id: &str, package_slug: &str) -> Peer {
        let (io, peer) = SessionIo::pair(16);
        self.gateway
            .connect_driver(
                &format!("participant_id={driver_id}&package_slug={package_slug}"),
                io,
            )
            .expect("driver session");
        let mut peer = Peer::new(driver_id, peer);
        let ack = peer.next_message().await;
        assert_eq!(ack.kind, "driver.cmd.register");
        peer
    }

    pub async fn connect_rider(&self, rider_id: &str) -> Peer {
        let (io, peer) = SessionIo::pair(16);
        self.gateway
            .connect_rider(&format!("participant_id={rider_id}"), io)
            .expect("rider session");
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        while !self.registry.is_connected(rider_id) {
            assert!(tokio::time::Instant::now() < deadline, "rider never registered");
            tokio::task::yield_now().await;
        }
        Peer::new(rider_id, peer)
    }

    pub async fn shutdown(self) {
        self.gateway.shutdown().await;
        self.coordinator.shutdown().await;
        self.broker.close();
    }
}

/// A connected participant, seen from its own side of the session.
pub struct Peer {
    pub id: String,
    io: PeerIo,
}

impl Peer {
    fn new(id: &str, io: PeerIo) -> Self {
        Self {
            id: id.to_string(),
            io,
        }
    }

    pub async fn next_message(&mut self) -> SessionMessage {
        let frame = tokio::time::timeout(RECV_TIMEOUT, self.io.from_gateway.recv())
            .await
            .unwrap_or_else(|_| panic!("{} got nothing in time", self.id))
            .expect("session open");
        SessionMessage::from_text(&frame).expect("session message")
    }

    /// True if nothing arrives within `wait`.
    pub async fn stays_quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.io.from_gateway.recv())
            .await
            .is_err()
    }

    pub async fn accept(&self, trip_id: &str) {
        self.send(DRIVER_CMD_TRIP_ACCEPT, trip_id).await;
    }

    pub async fn decline(&self, trip_id: &str) {
        self.send(DRIVER_CMD_TRIP_DECLINE, trip_id).await;
    }

    async fn send(&self, kind: &str, trip_id: &str) {
        let message = SessionMessage::new(kind, serde_json::json!({ "tripId": trip_id }));
        self.io
            .to_gateway
            .send(message.to_text().expect("text"))
            .await
            .expect("gateway listening");
    }

    /// Close the participant's side of the connection.
    pub fn disconnect(self) {
        drop(self.io);
    }
}
