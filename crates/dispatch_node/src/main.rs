mod cli;
mod logging;
mod scenario;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dispatch_core::availability::DriverAvailabilityIndex;
use dispatch_core::broker::{BrokerError, EventPublisher, InMemoryBroker};
use dispatch_core::config::BrokerConfig;
use dispatch_core::connection::ConnectionRegistry;
use dispatch_core::coordinator::DispatchCoordinator;
use dispatch_core::error::DispatchError;
use dispatch_core::gateway::{Gateway, GatewayContext, GatewayError};
use dispatch_core::matching::MatchingPolicyKind;
use dispatch_core::telemetry::DispatchTelemetry;
use dispatch_core::trip::{TripService, TripStore};
use thiserror::Error;

use crate::cli::Cli;
use crate::logging::LoggingError;
use crate::scenario::ScenarioPlan;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("participant `{0}` was never registered")]
    Registration(String),
    #[error("failed to wait for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    let cli = Cli::parse();
    logging::initialise(&cli.log_filter, cli.log_format)?;
    let config = cli.dispatch_config();

    let broker = InMemoryBroker::connect(&BrokerConfig::default())?;
    let publisher: Arc<dyn EventPublisher> = Arc::new(broker.clone());
    let index = Arc::new(DriverAvailabilityIndex::new());
    let trips = Arc::new(TripStore::new());
    let telemetry = Arc::new(DispatchTelemetry::default());
    let registry = ConnectionRegistry::new();

    let coordinator = DispatchCoordinator::new(
        Arc::clone(&index),
        Arc::clone(&trips),
        Arc::clone(&publisher),
        Arc::clone(&telemetry),
    )
    .with_policy(MatchingPolicyKind::from(cli.policy).build())
    .with_config(config)
    .start(&broker)?;
    let service = TripService::new(Arc::clone(&trips), Arc::clone(&index), publisher);
    let gateway = Gateway::new(GatewayContext {
        registry: registry.clone(),
        broker: broker.clone(),
        directory: index.clone(),
        telemetry: Arc::clone(&telemetry),
        config,
    });

    tracing::info!(
        policy = coordinator.coordinator().policy_name(),
        offer_timeout = ?config.offer_timeout,
        unregister_on_disconnect = config.unregister_on_disconnect,
        "dispatch node started"
    );

    let plan = ScenarioPlan {
        drivers: cli.drivers(),
        trips: cli.trips(),
        decline_probability: cli.decline_probability,
        seed: cli.seed,
    };
    let participants = scenario::launch(&gateway, &service, &plan).await?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted");
        }
        _ = tokio::time::sleep(Duration::from_secs(cli.run_for_secs)) => {}
    }

    let report = participants.finish().await;
    gateway.shutdown().await;
    coordinator.shutdown().await;
    broker.close();

    let counts = telemetry.snapshot();
    tracing::info!(
        offers_received = report.offers_received,
        accepted = report.accepted,
        declined = report.declined,
        "simulated drivers"
    );
    for (rider_id, notices) in &report.rider_notices {
        tracing::info!(%rider_id, ?notices, "simulated rider");
    }
    tracing::info!(?counts, availability = ?index.counts(), "dispatch totals");
    for trip in trips.snapshot() {
        tracing::info!(
            trip_id = %trip.trip_id,
            user_id = %trip.user_id,
            status = %trip.status,
            driver_id = trip.assigned_driver.as_deref().unwrap_or("-"),
            "trip"
        );
    }
    Ok(())
}
