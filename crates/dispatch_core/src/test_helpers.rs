//! Test helpers shared by unit tests, integration tests and benches.

use dispatch_contracts::{Envelope, RideFare};
use parking_lot::Mutex;

use crate::broker::{BrokerError, EventPublisher};

/// Publisher that keeps every envelope instead of routing it.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Envelope>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub fn published(&self) -> Vec<Envelope> {
        self.published.lock().clone()
    }

    /// Drain the recorded envelopes.
    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.published.lock())
    }

    pub fn with_routing_key(&self, routing_key: &str) -> Vec<Envelope> {
        self.published
            .lock()
            .iter()
            .filter(|envelope| envelope.routing_key == routing_key)
            .cloned()
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, envelope: Envelope) -> Result<(), BrokerError> {
        self.published.lock().push(envelope);
        Ok(())
    }
}

/// Publisher whose broker is always gone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosedPublisher;

impl EventPublisher for ClosedPublisher {
    fn publish(&self, _envelope: Envelope) -> Result<(), BrokerError> {
        Err(BrokerError::Closed)
    }
}

/// A fare for `user_id` on `package_slug`, priced at that package's base fare.
pub fn ride_fare(user_id: &str, package_slug: &str) -> RideFare {
    RideFare::at_base_price(format!("fare-{user_id}-{package_slug}"), user_id, package_slug)
}
