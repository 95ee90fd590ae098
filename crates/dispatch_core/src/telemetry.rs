//! Telemetry / KPIs: counters for dispatch outcomes and dropped notifications.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters. Cheap to update from any task; read with [`DispatchTelemetry::snapshot`].
#[derive(Debug, Default)]
pub struct DispatchTelemetry {
    offers_sent: AtomicU64,
    offers_expired: AtomicU64,
    declines: AtomicU64,
    no_drivers_found: AtomicU64,
    assignments: AtomicU64,
    missed_notifications: AtomicU64,
    decode_failures: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchTelemetry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounts {
    pub offers_sent: u64,
    pub offers_expired: u64,
    pub declines: u64,
    pub no_drivers_found: u64,
    pub assignments: u64,
    pub missed_notifications: u64,
    pub decode_failures: u64,
    pub publish_failures: u64,
}

impl DispatchTelemetry {
    pub fn record_offer(&self) {
        self.offers_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_offer_expired(&self) {
        self.offers_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decline(&self) {
        self.declines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_drivers(&self) {
        self.no_drivers_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_assignment(&self) {
        self.assignments.fetch_add(1, Ordering::Relaxed);
    }

    /// A push addressed to a participant with no registered session.
    pub fn record_missed_notification(&self) {
        self.missed_notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            offers_sent: self.offers_sent.load(Ordering::Relaxed),
            offers_expired: self.offers_expired.load(Ordering::Relaxed),
            declines: self.declines.load(Ordering::Relaxed),
            no_drivers_found: self.no_drivers_found.load(Ordering::Relaxed),
            assignments: self.assignments.load(Ordering::Relaxed),
            missed_notifications: self.missed_notifications.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}
