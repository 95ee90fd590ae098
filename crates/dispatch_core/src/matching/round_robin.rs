use std::sync::atomic::{AtomicUsize, Ordering};

use crate::trip::TripRecord;

use super::policy::MatchingPolicy;

/// Rotates the starting candidate on every selection, so consecutive trips
/// do not all land on the earliest-registered driver.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl MatchingPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select_driver(&self, _trip: &TripRecord, candidates: &[String]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
        candidates.get(turn % candidates.len()).cloned()
    }
}
