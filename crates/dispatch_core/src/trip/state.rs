use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dispatch_contracts::payloads::TripStatus;
use dispatch_contracts::{DriverSummary, RideFare, TripSummary};
use thiserror::Error;

/// Something that happened to a trip during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripEvent {
    OfferSent { driver_id: String },
    /// The offer never reached the driver; dispatch may try again.
    OfferWithdrawn { driver_id: String },
    NoDriversFound,
    DriverDeclined { driver_id: String },
    DriverAccepted { driver_id: String },
    Cancelled,
    Completed,
}

impl TripEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TripEvent::OfferSent { .. } => "offer_sent",
            TripEvent::OfferWithdrawn { .. } => "offer_withdrawn",
            TripEvent::NoDriversFound => "no_drivers_found",
            TripEvent::DriverDeclined { .. } => "driver_declined",
            TripEvent::DriverAccepted { .. } => "driver_accepted",
            TripEvent::Cancelled => "cancelled",
            TripEvent::Completed => "completed",
        }
    }
}

/// A rejected transition. The trip is left exactly as it was.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("trip {trip_id}: `{event}` is not allowed while {from}")]
    InvalidTransition {
        trip_id: String,
        from: TripStatus,
        event: &'static str,
    },
    #[error("trip {trip_id}: driver {driver_id} does not hold the offer")]
    NotOfferedDriver { trip_id: String, driver_id: String },
    #[error("trip {trip_id}: driver {driver_id} already declined this trip")]
    AlreadyDeclined { trip_id: String, driver_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub trip_id: String,
    pub user_id: String,
    pub status: TripStatus,
    pub selected_fare: RideFare,
    pub assigned_driver: Option<String>,
    /// Driver currently holding the offer, while `driver_requested`.
    pub offered_driver: Option<String>,
    /// Drivers that declined this trip; never offered it again.
    pub declined_drivers: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl TripRecord {
    pub fn new(trip_id: impl Into<String>, fare: RideFare) -> Self {
        Self {
            trip_id: trip_id.into(),
            user_id: fare.user_id.clone(),
            status: TripStatus::Pending,
            selected_fare: fare,
            assigned_driver: None,
            offered_driver: None,
            declined_drivers: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Adopt a trip announced by another service. Only a pending trip can be
    /// dispatched, so the announced status is not trusted.
    pub fn from_summary(summary: &TripSummary) -> Self {
        let mut record = Self::new(summary.id.clone(), summary.selected_fare.clone());
        record.user_id = summary.user_id.clone();
        record
    }

    pub fn package_slug(&self) -> &str {
        &self.selected_fare.package_slug
    }

    pub fn has_declined(&self, driver_id: &str) -> bool {
        self.declined_drivers.contains(driver_id)
    }

    pub fn summary(&self) -> TripSummary {
        TripSummary {
            id: self.trip_id.clone(),
            user_id: self.user_id.clone(),
            status: self.status,
            selected_fare: self.selected_fare.clone(),
            driver: self.assigned_driver.as_ref().map(|driver_id| DriverSummary {
                id: driver_id.clone(),
                package_slug: self.selected_fare.package_slug.clone(),
            }),
        }
    }

    /// Apply `event`, returning the new status. Out-of-order events are
    /// rejected and leave the record unchanged.
    pub fn apply(&mut self, event: &TripEvent) -> Result<TripStatus, TransitionError> {
        use TripStatus::*;

        let next = match (self.status, event) {
            (Pending | DeclinedRetry, TripEvent::OfferSent { driver_id }) => {
                if self.has_declined(driver_id) {
                    return Err(TransitionError::AlreadyDeclined {
                        trip_id: self.trip_id.clone(),
                        driver_id: driver_id.clone(),
                    });
                }
                self.offered_driver = Some(driver_id.clone());
                DriverRequested
            }
            (DriverRequested, TripEvent::OfferWithdrawn { driver_id }) => {
                self.ensure_offered(driver_id)?;
                self.offered_driver = None;
                // Only a decline leads to declined_retry, so the set tells
                // which status the offer was made from.
                if self.declined_drivers.is_empty() {
                    Pending
                } else {
                    DeclinedRetry
                }
            }
            (Pending | DeclinedRetry, TripEvent::NoDriversFound) => NoDrivers,
            (DriverRequested, TripEvent::DriverDeclined { driver_id }) => {
                self.ensure_offered(driver_id)?;
                self.offered_driver = None;
                self.declined_drivers.insert(driver_id.clone());
                DeclinedRetry
            }
            (DriverRequested, TripEvent::DriverAccepted { driver_id }) => {
                self.ensure_offered(driver_id)?;
                self.offered_driver = None;
                self.assigned_driver = Some(driver_id.clone());
                Assigned
            }
            (Pending | DriverRequested | DeclinedRetry | Assigned, TripEvent::Cancelled) => {
                self.offered_driver = None;
                Cancelled
            }
            (Assigned, TripEvent::Completed) => Completed,
            (from, event) => {
                return Err(TransitionError::InvalidTransition {
                    trip_id: self.trip_id.clone(),
                    from,
                    event: event.name(),
                })
            }
        };
        self.status = next;
        Ok(next)
    }

    fn ensure_offered(&self, driver_id: &str) -> Result<(), TransitionError> {
        if self.offered_driver.as_deref() == Some(driver_id) {
            Ok(())
        } else {
            Err(TransitionError::NotOfferedDriver {
                trip_id: self.trip_id.clone(),
                driver_id: driver_id.to_string(),
            })
        }
    }
}
