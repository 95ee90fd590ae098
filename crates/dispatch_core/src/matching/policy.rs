use crate::trip::TripRecord;

/// Strategy choosing which candidate driver receives a trip offer.
///
/// The coordinator owns the event wiring; a policy only picks. Swapping the
/// policy (for distance- or load-aware matching) does not touch how offers are
/// published or how declines re-enter matching.
///
/// # Examples
///
/// ```rust
/// use dispatch_core::matching::{FirstRegistered, MatchingPolicy};
/// use dispatch_core::trip::TripRecord;
/// use dispatch_contracts::RideFare;
///
/// let trip = TripRecord::new(
///     "trip-1",
///     RideFare {
///         id: "fare-1".to_string(),
///         user_id: "rider-1".to_string(),
///         package_slug: "suv".to_string(),
///         total_price_in_cents: 200.0,
///     },
/// );
/// let candidates = vec!["d1".to_string(), "d2".to_string()];
/// assert_eq!(FirstRegistered.select_driver(&trip, &candidates), Some("d1".to_string()));
/// ```
pub trait MatchingPolicy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Pick one driver for `trip`.
    ///
    /// # Arguments
    ///
    /// * `trip` - The trip being matched; its package and declined drivers are
    ///   already applied to `candidates`.
    /// * `candidates` - Available drivers of the trip's package, in
    ///   registration order. Never contains a driver that declined this trip.
    ///
    /// # Returns
    ///
    /// `Some(driver_id)` taken from `candidates`, or `None` to report that no
    /// driver should be offered the trip.
    fn select_driver(&self, trip: &TripRecord, candidates: &[String]) -> Option<String>;
}
