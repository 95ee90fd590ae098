//! Trip State Machine, trip store, and the trip-creation collaborator.

pub mod service;
pub mod state;
pub mod store;

pub use service::TripService;
pub use state::{TransitionError, TripEvent, TripRecord};
pub use store::{TripError, TripStore};
