use std::time::Duration;

use dispatch_contracts::routing::QUEUE_BINDINGS;

/// One durable queue and the routing keys delivered to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub name: String,
    pub routing_keys: Vec<String>,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, routing_keys: &[&str]) -> Self {
        Self {
            name: name.into(),
            routing_keys: routing_keys.iter().map(|key| key.to_string()).collect(),
        }
    }
}

/// Broker topology declared at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub queues: Vec<QueueConfig>,
}

impl Default for BrokerConfig {
    /// The production topology from [`QUEUE_BINDINGS`].
    fn default() -> Self {
        Self {
            queues: QUEUE_BINDINGS
                .iter()
                .map(|(name, keys)| QueueConfig::new(*name, keys))
                .collect(),
        }
    }
}

/// Dispatch behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Treat an unanswered offer as declined after this long. `None` leaves an
    /// offered trip in `driver_requested` until the driver answers.
    pub offer_timeout: Option<Duration>,
    /// Unregister a driver from the availability index when its session ends.
    pub unregister_on_disconnect: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offer_timeout: None,
            unregister_on_disconnect: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_contracts::routing::{FIND_AVAILABLE_DRIVERS_QUEUE, TRIP_EVENT_CREATED};

    #[test]
    fn default_topology_routes_trip_created_to_find_queue() {
        let config = BrokerConfig::default();
        let queue = config
            .queues
            .iter()
            .find(|queue| queue.name == FIND_AVAILABLE_DRIVERS_QUEUE)
            .expect("find queue");
        assert!(queue.routing_keys.iter().any(|key| key == TRIP_EVENT_CREATED));
    }

    #[test]
    fn offers_never_expire_by_default() {
        let config = DispatchConfig::default();
        assert_eq!(config.offer_timeout, None);
        assert!(config.unregister_on_disconnect);
    }
}
