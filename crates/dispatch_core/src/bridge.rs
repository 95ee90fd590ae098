//! Queue-to-Session Bridge: relays broker deliveries to live participant sessions.

use std::sync::Arc;

use dispatch_contracts::SessionMessage;

use crate::broker::{BrokerError, Delivery, InMemoryBroker, Subscription};
use crate::connection::{ConnectionError, ConnectionRegistry};
use crate::error::DispatchError;
use crate::telemetry::DispatchTelemetry;

/// One queue subscription that pushes every delivery to the session of the
/// envelope's `owner_id`.
///
/// A delivery whose owner has no session is dropped and counted as a missed
/// notification; the bridge never buffers or retries.
#[derive(Debug)]
pub struct QueueBridge {
    subscription: Subscription,
}

impl QueueBridge {
    pub fn start(
        broker: &InMemoryBroker,
        registry: ConnectionRegistry,
        queue: &str,
        telemetry: Arc<DispatchTelemetry>,
    ) -> Result<Self, BrokerError> {
        let subscription = broker.subscribe(queue, move |delivery: &Delivery| {
            relay(&registry, &telemetry, delivery)
        })?;
        Ok(Self { subscription })
    }

    pub fn queue(&self) -> &str {
        self.subscription.queue()
    }

    pub async fn stop(self) {
        self.subscription.unsubscribe().await;
    }
}

/// Decode a delivery and unicast it to its owner's session.
///
/// Undeliverable and undecodable messages are logged and swallowed, so the
/// broker acknowledges them instead of looping.
pub fn relay(
    registry: &ConnectionRegistry,
    telemetry: &DispatchTelemetry,
    delivery: &Delivery,
) -> Result<(), DispatchError> {
    let envelope = &delivery.envelope;
    let data = match envelope.payload_json() {
        Ok(data) => data,
        Err(error) => {
            telemetry.record_decode_failure();
            tracing::warn!(
                queue = %delivery.queue,
                routing_key = %envelope.routing_key,
                owner_id = %envelope.owner_id,
                %error,
                "dropping undecodable message"
            );
            return Ok(());
        }
    };
    let message = SessionMessage::new(envelope.routing_key.clone(), data);
    match registry.send(&envelope.owner_id, &message) {
        Ok(()) => {
            tracing::debug!(
                routing_key = %envelope.routing_key,
                owner_id = %envelope.owner_id,
                "pushed to session"
            );
            Ok(())
        }
        Err(ConnectionError::NotConnected(owner_id)) => {
            telemetry.record_missed_notification();
            tracing::warn!(
                routing_key = %envelope.routing_key,
                %owner_id,
                "no session for recipient, notification dropped"
            );
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// The bridges serving one participant session.
#[derive(Debug, Default)]
pub struct SessionBridges {
    bridges: Vec<QueueBridge>,
}

impl SessionBridges {
    /// Start one bridge per queue. On failure the bridges already started are
    /// dropped, which cancels them.
    pub fn start(
        broker: &InMemoryBroker,
        registry: &ConnectionRegistry,
        queues: &[&str],
        telemetry: &Arc<DispatchTelemetry>,
    ) -> Result<Self, BrokerError> {
        let bridges = queues
            .iter()
            .map(|queue| {
                QueueBridge::start(broker, registry.clone(), queue, Arc::clone(telemetry))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { bridges })
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// Unsubscribe every bridge and wait for their consumers to stop.
    pub async fn shutdown(self) {
        for bridge in self.bridges {
            bridge.stop().await;
        }
    }
}
