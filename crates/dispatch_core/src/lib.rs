pub mod availability;
pub mod bridge;
pub mod broker;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod matching;
pub mod telemetry;
pub mod trip;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use availability::{AvailabilityState, DriverAvailabilityIndex, DriverRecord};
pub use broker::{Delivery, EventPublisher, InMemoryBroker};
pub use config::{BrokerConfig, DispatchConfig};
pub use connection::ConnectionRegistry;
pub use coordinator::{CoordinatorHandle, DispatchCoordinator};
pub use error::DispatchError;
pub use gateway::{Gateway, GatewayContext, SessionIo};
pub use telemetry::{DispatchCounts, DispatchTelemetry};
pub use trip::{TripRecord, TripService, TripStore};
