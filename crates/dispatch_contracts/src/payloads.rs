use std::fmt;

use serde::{Deserialize, Serialize};

/// Fare selected by the rider; priced upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideFare {
    pub id: String,
    pub user_id: String,
    /// Vehicle tier, e.g. `suv`, `sedan`, `van`, `luxury`.
    pub package_slug: String,
    pub total_price_in_cents: f64,
}

impl RideFare {
    /// Base fare of a package, in cents. Unknown packages are free.
    pub fn base_price_cents(package_slug: &str) -> f64 {
        match package_slug {
            "suv" => 200.0,
            "sedan" => 350.0,
            "van" => 400.0,
            "luxury" => 1000.0,
            _ => 0.0,
        }
    }

    /// A fare priced at the package's base fare.
    pub fn at_base_price(
        id: impl Into<String>,
        user_id: impl Into<String>,
        package_slug: impl Into<String>,
    ) -> Self {
        let package_slug = package_slug.into();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            total_price_in_cents: Self::base_price_cents(&package_slug),
            package_slug,
        }
    }
}

/// Lifecycle status of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    DriverRequested,
    NoDrivers,
    Assigned,
    DeclinedRetry,
    Cancelled,
    Completed,
}

impl TripStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Pending => "pending",
            TripStatus::DriverRequested => "driver_requested",
            TripStatus::NoDrivers => "no_drivers",
            TripStatus::Assigned => "assigned",
            TripStatus::DeclinedRetry => "declined_retry",
            TripStatus::Cancelled => "cancelled",
            TripStatus::Completed => "completed",
        }
    }

    /// No further dispatch activity happens for a trip in a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TripStatus::NoDrivers | TripStatus::Cancelled | TripStatus::Completed
        )
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSummary {
    pub id: String,
    pub package_slug: String,
}

/// Trip as it travels inside events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    pub id: String,
    pub user_id: String,
    pub status: TripStatus,
    pub selected_fare: RideFare,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverSummary>,
}

/// Payload of `trip.created`, `driver.cmd.tripRequest`, `trip.noDriversFound`
/// and `notify.driver.assign`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripEventData {
    pub trip: TripSummary,
}

/// Payload a driver sends with `driver.cmd.tripAccept` / `driver.cmd.tripDecline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverTripResponse {
    pub trip_id: String,
    #[serde(default)]
    pub rider_id: String,
}

/// Payload of `trip.driverNotInterested`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverNotInterestedData {
    pub trip_id: String,
    pub rider_id: String,
    pub package_slug: String,
    pub declined_driver_id: String,
}
