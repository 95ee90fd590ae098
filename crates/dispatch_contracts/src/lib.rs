//! Wire contracts shared by every participant of the trip dispatch pipeline.
//!
//! This crate owns the names that cross process boundaries (routing keys and
//! queue names), the envelope exchanged through the broker, the `{type, data}`
//! message pushed over participant sessions, and the payloads carried inside
//! them. It has no runtime behaviour of its own.

pub mod envelope;
pub mod error;
pub mod payloads;
pub mod routing;
pub mod session;

pub use envelope::Envelope;
pub use error::ContractError;
pub use payloads::{
    DriverNotInterestedData, DriverSummary, DriverTripResponse, RideFare, TripEventData,
    TripSummary,
};
pub use session::{SessionMessage, SessionParams};
