//! Gateway sessions: one task per connected driver or rider.
//!
//! The transport (a websocket server, a simulator, a test) hands the gateway a
//! query string and a [`SessionIo`]. The gateway registers the participant,
//! bridges the participant's queues, forwards driver responses to the broker,
//! and tears everything down when the inbound side closes or the gateway shuts
//! down.

mod driver;
mod rider;

use std::sync::Arc;

use dispatch_contracts::{ContractError, DriverSummary, SessionParams};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::availability::DriverAvailabilityIndex;
use crate::broker::{BrokerError, InMemoryBroker};
use crate::config::DispatchConfig;
use crate::connection::{ConnectionError, ConnectionRegistry, SessionSender};
use crate::telemetry::DispatchTelemetry;

pub use driver::run_driver_session;
pub use rider::run_rider_session;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid session parameters: {0}")]
    Params(#[from] ContractError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("gateway is shutting down")]
    ShuttingDown,
}

/// Where drivers become matchable. Implemented by the availability index.
pub trait DriverDirectory: Send + Sync {
    fn register_driver(&self, driver_id: &str, package_slug: &str) -> DriverSummary;
    fn unregister_driver(&self, driver_id: &str) -> bool;
    fn available_drivers(&self, package_slug: &str) -> Vec<String>;
}

impl DriverDirectory for DriverAvailabilityIndex {
    fn register_driver(&self, driver_id: &str, package_slug: &str) -> DriverSummary {
        DriverAvailabilityIndex::register_driver(self, driver_id, package_slug).summary()
    }

    fn unregister_driver(&self, driver_id: &str) -> bool {
        DriverAvailabilityIndex::unregister_driver(self, driver_id).is_some()
    }

    fn available_drivers(&self, package_slug: &str) -> Vec<String> {
        self.find_available(package_slug)
    }
}

/// Shared services every session uses.
#[derive(Clone)]
pub struct GatewayContext {
    pub registry: ConnectionRegistry,
    pub broker: InMemoryBroker,
    pub directory: Arc<dyn DriverDirectory>,
    pub telemetry: Arc<DispatchTelemetry>,
    pub config: DispatchConfig,
}

/// Gateway side of one participant connection.
///
/// `inbound` yields text frames received from the participant; it closing
/// means the peer disconnected. Frames written to `outbound` go to the peer.
#[derive(Debug)]
pub struct SessionIo {
    pub inbound: mpsc::Receiver<String>,
    pub outbound: SessionSender,
}

/// Participant side of a [`SessionIo`] pair.
#[derive(Debug)]
pub struct PeerIo {
    pub to_gateway: mpsc::Sender<String>,
    pub from_gateway: mpsc::UnboundedReceiver<String>,
}

impl SessionIo {
    /// An in-process connection; `buffer` bounds unread inbound frames.
    pub fn pair(buffer: usize) -> (SessionIo, PeerIo) {
        let (to_gateway, inbound) = mpsc::channel(buffer);
        let (outbound, from_gateway) = mpsc::unbounded_channel();
        (
            SessionIo { inbound, outbound },
            PeerIo {
                to_gateway,
                from_gateway,
            },
        )
    }
}

/// Why a session's receive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    PeerClosed,
    Shutdown,
}

/// Accepts sessions and owns their tasks.
pub struct Gateway {
    context: GatewayContext,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(context: GatewayContext) -> Self {
        Self {
            context,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn context(&self) -> &GatewayContext {
        &self.context
    }

    /// Validate a driver's query and start its session task. Must be called
    /// inside a tokio runtime.
    pub fn connect_driver(&self, query: &str, io: SessionIo) -> Result<JoinHandle<()>, GatewayError> {
        self.ensure_open()?;
        let params = SessionParams::from_query(query)?;
        params.require_package()?;
        let context = self.context.clone();
        let token = self.shutdown.child_token();
        Ok(self.tracker.spawn(async move {
            let participant_id = params.participant_id.clone();
            match run_driver_session(&context, params, io, token).await {
                Ok(end) => tracing::debug!(%participant_id, ?end, "driver session ended"),
                Err(error) => tracing::warn!(%participant_id, %error, "driver session failed"),
            }
        }))
    }

    /// Validate a rider's query and start its session task. Must be called
    /// inside a tokio runtime.
    pub fn connect_rider(&self, query: &str, io: SessionIo) -> Result<JoinHandle<()>, GatewayError> {
        self.ensure_open()?;
        let params = SessionParams::from_query(query)?;
        let context = self.context.clone();
        let token = self.shutdown.child_token();
        Ok(self.tracker.spawn(async move {
            let participant_id = params.participant_id.clone();
            match run_rider_session(&context, params, io, token).await {
                Ok(end) => tracing::debug!(%participant_id, ?end, "rider session ended"),
                Err(error) => tracing::warn!(%participant_id, %error, "rider session failed"),
            }
        }))
    }

    /// Sessions still running.
    pub fn active_sessions(&self) -> usize {
        self.tracker.len()
    }

    /// Close every session and wait for their teardown.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("gateway stopped");
    }

    fn ensure_open(&self) -> Result<(), GatewayError> {
        if self.shutdown.is_cancelled() {
            return Err(GatewayError::ShuttingDown);
        }
        Ok(())
    }
}

/// Wait for the next inbound frame, or for shutdown.
async fn next_frame(
    inbound: &mut mpsc::Receiver<String>,
    token: &CancellationToken,
) -> Result<String, SessionEnd> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SessionEnd::Shutdown),
        frame = inbound.recv() => frame.ok_or(SessionEnd::PeerClosed),
    }
}
