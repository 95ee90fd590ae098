//! Event Broker Client: durable publish/consume over named queues.
//!
//! Publishers route an [`Envelope`] by its routing key to every queue bound to
//! that key. Consumers subscribe to a queue with a [`DeliveryHandler`]; the
//! handler's return value is logged and the delivery is acknowledged either
//! way, so a malformed message is dropped instead of being redelivered forever.

pub mod memory;

use dispatch_contracts::Envelope;
use thiserror::Error;

use crate::error::DispatchError;

pub use memory::{InMemoryBroker, Subscription};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("no queue is bound to routing key `{0}`")]
    Unroutable(String),
    #[error("queue `{0}` is not declared")]
    UnknownQueue(String),
    #[error("invalid broker topology: {0}")]
    Topology(String),
    #[error("broker is closed")]
    Closed,
}

/// A message handed to a queue consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub delivery_tag: u64,
    pub envelope: Envelope,
}

impl Delivery {
    pub fn routing_key(&self) -> &str {
        &self.envelope.routing_key
    }

    pub fn owner_id(&self) -> &str {
        &self.envelope.owner_id
    }
}

/// Publishing side of the broker. Blocks until the broker has accepted the
/// envelope or failed.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, envelope: Envelope) -> Result<(), BrokerError>;
}

/// Consumer callback. Runs on the subscription's task, one delivery at a time.
pub trait DeliveryHandler: Send + Sync + 'static {
    fn handle(&self, delivery: &Delivery) -> Result<(), DispatchError>;
}

impl<F> DeliveryHandler for F
where
    F: Fn(&Delivery) -> Result<(), DispatchError> + Send + Sync + 'static,
{
    fn handle(&self, delivery: &Delivery) -> Result<(), DispatchError> {
        self(delivery)
    }
}
