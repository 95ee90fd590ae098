use dispatch_contracts::ContractError;
use thiserror::Error;

use crate::availability::AvailabilityError;
use crate::broker::BrokerError;
use crate::connection::ConnectionError;
use crate::gateway::GatewayError;
use crate::trip::{TransitionError, TripError};

/// Umbrella error for everything a delivery handler or session can hit.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Trip(#[from] TripError),
    #[error(transparent)]
    Availability(#[from] AvailabilityError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("unexpected routing key `{0}`")]
    UnexpectedRoutingKey(String),
}

impl From<TransitionError> for DispatchError {
    fn from(error: TransitionError) -> Self {
        DispatchError::Trip(TripError::Transition(error))
    }
}
