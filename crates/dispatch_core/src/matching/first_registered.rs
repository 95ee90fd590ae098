use crate::trip::TripRecord;

use super::policy::MatchingPolicy;

/// First-registered, first-offered.
///
/// Returns the head of the candidate sequence, i.e. the available driver that
/// registered earliest. No distance, rating, or load weighting.
///
/// Time complexity: O(1).
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstRegistered;

impl MatchingPolicy for FirstRegistered {
    fn name(&self) -> &'static str {
        "first_registered"
    }

    fn select_driver(&self, _trip: &TripRecord, candidates: &[String]) -> Option<String> {
        candidates.first().cloned()
    }
}
