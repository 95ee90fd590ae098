mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dispatch_contracts::payloads::TripStatus;
use dispatch_contracts::routing::{
    DRIVER_CMD_TRIP_REQUEST, TRIP_EVENT_DRIVER_ASSIGNED, TRIP_EVENT_NO_DRIVERS_FOUND,
};
use dispatch_contracts::TripEventData;
use dispatch_core::availability::{AvailabilityState, DriverAvailabilityIndex};
use dispatch_core::connection::ConnectionRegistry;
use dispatch_core::matching::{MatchingPolicy, MatchingPolicyKind};
use dispatch_core::trip::TripRecord;
use support::harness::{DispatchHarness, DispatchHarnessBuilder};
use tokio::sync::mpsc;

fn offered_to(outbound: &[dispatch_contracts::Envelope]) -> Vec<String> {
    outbound
        .iter()
        .filter(|envelope| envelope.routing_key == DRIVER_CMD_TRIP_REQUEST)
        .map(|envelope| envelope.owner_id.clone())
        .collect()
}

#[test]
fn trip_is_offered_to_the_first_registered_driver() {
    let mut harness = DispatchHarness::new();
    harness.register_drivers("suv", &["d1", "d2"]);

    let (trip_id, outbound) = harness.create_trip("rider-1", "suv");

    assert_eq!(offered_to(&outbound), ["d1"]);
    let offer: TripEventData = outbound[0].decode_payload().expect("offer payload");
    assert_eq!(offer.trip.id, trip_id);
    assert_eq!(offer.trip.selected_fare.package_slug, "suv");
    assert_eq!(harness.trip(&trip_id).status, TripStatus::DriverRequested);
}

#[test]
fn trip_without_matching_drivers_notifies_the_rider() {
    let mut harness = DispatchHarness::new();
    harness.register_drivers("suv", &["d1"]);

    let (trip_id, outbound) = harness.create_trip("rider-7", "luxury");

    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].routing_key, TRIP_EVENT_NO_DRIVERS_FOUND);
    assert_eq!(outbound[0].owner_id, "rider-7");
    let data: TripEventData = outbound[0].decode_payload().expect("payload");
    assert_eq!(data.trip.user_id, "rider-7");
    assert_eq!(data.trip.status, TripStatus::NoDrivers);
    assert_eq!(harness.trip(&trip_id).status, TripStatus::NoDrivers);
    assert_eq!(harness.telemetry.snapshot().no_drivers_found, 1);
}

#[test]
fn decline_moves_the_offer_on_and_accept_assigns() {
    let mut harness = DispatchHarness::new();
    harness.register_drivers("suv", &["d1", "d2"]);
    let (trip_id, _) = harness.create_trip("rider-1", "suv");

    let after_decline = harness.decline("d1", &trip_id).expect("decline");
    assert_eq!(offered_to(&after_decline), ["d2"]);
    assert_eq!(harness.trip(&trip_id).status, TripStatus::DriverRequested);

    let after_accept = harness.accept("d2", &trip_id).expect("accept");
    assert_eq!(after_accept.len(), 1);
    assert_eq!(after_accept[0].routing_key, TRIP_EVENT_DRIVER_ASSIGNED);
    assert_eq!(after_accept[0].owner_id, "rider-1");
    let assigned: TripEventData = after_accept[0].decode_payload().expect("payload");
    assert_eq!(assigned.trip.driver.expect("driver").id, "d2");

    let trip = harness.trip(&trip_id);
    assert_eq!(trip.status, TripStatus::Assigned);
    assert_eq!(trip.assigned_driver.as_deref(), Some("d2"));
    assert_eq!(
        harness.index.get("d2").expect("d2").state,
        AvailabilityState::Unavailable
    );
    assert_eq!(
        harness.index.get("d1").expect("d1").state,
        AvailabilityState::Available
    );
}

#[test]
fn dropped_connection_leaves_driver_available_in_the_index() {
    let index = DriverAvailabilityIndex::new();
    let registry = ConnectionRegistry::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    registry.add("d1", tx);
    index.register_driver("d1", "suv");

    registry.remove("d1").expect("connection removed");

    assert!(!registry.is_connected("d1"));
    assert_eq!(index.get("d1").expect("d1").state, AvailabilityState::Available);
    assert_eq!(index.find_available("suv"), ["d1"]);
}

#[test]
fn every_driver_declining_ends_in_no_drivers() {
    let mut harness = DispatchHarness::new();
    harness.register_drivers("van", &["d1", "d2", "d3"]);
    let (trip_id, outbound) = harness.create_trip("rider-1", "van");

    let mut offers = offered_to(&outbound);
    let mut last = Vec::new();
    while let Some(driver_id) = offers.pop() {
        last = harness.decline(&driver_id, &trip_id).expect("decline");
        offers = offered_to(&last);
    }

    assert_eq!(last.len(), 1);
    assert_eq!(last[0].routing_key, TRIP_EVENT_NO_DRIVERS_FOUND);
    let trip = harness.trip(&trip_id);
    assert_eq!(trip.status, TripStatus::NoDrivers);
    assert_eq!(trip.declined_drivers.len(), 3);
    assert_eq!(harness.telemetry.snapshot().offers_sent, 3);
    assert_eq!(harness.telemetry.snapshot().declines, 3);
}

#[test]
fn declined_driver_is_not_reoffered_even_after_re_registering() {
    let mut harness = DispatchHarness::new();
    harness.register_drivers("suv", &["d1", "d2"]);
    let (trip_id, _) = harness.create_trip("rider-1", "suv");
    harness.decline("d1", &trip_id).expect("d1 declines");

    harness.index.register_driver("d1", "suv");
    let outbound = harness.decline("d2", &trip_id).expect("d2 declines");

    assert!(offered_to(&outbound).is_empty());
    assert_eq!(outbound[0].routing_key, TRIP_EVENT_NO_DRIVERS_FOUND);
}

#[test]
fn trip_without_drivers_can_never_be_assigned() {
    let mut harness = DispatchHarness::new();
    let (trip_id, _) = harness.create_trip("rider-1", "sedan");

    harness.register_drivers("sedan", &["late"]);
    assert!(harness.accept("late", &trip_id).is_err());
    assert_eq!(harness.trip(&trip_id).status, TripStatus::NoDrivers);
    assert_eq!(harness.telemetry.snapshot().assignments, 0);
}

#[test]
fn duplicate_accept_is_rejected_and_changes_nothing() {
    let mut harness = DispatchHarness::new();
    harness.register_drivers("suv", &["d1"]);
    let (trip_id, _) = harness.create_trip("rider-1", "suv");
    harness.accept("d1", &trip_id).expect("first accept");

    assert!(harness.accept("d1", &trip_id).is_err());
    assert!(harness.decline("d1", &trip_id).is_err());
    assert_eq!(harness.trip(&trip_id).status, TripStatus::Assigned);
    assert_eq!(harness.telemetry.snapshot().assignments, 1);
}

/// Picks the head candidate, but lets another dispatcher grab it first once.
struct RacingPolicy {
    index: Arc<DriverAvailabilityIndex>,
    raced: AtomicBool,
}

impl MatchingPolicy for RacingPolicy {
    fn name(&self) -> &'static str {
        "racing"
    }

    fn select_driver(&self, _trip: &TripRecord, candidates: &[String]) -> Option<String> {
        let head = candidates.first()?.clone();
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.index.try_offer(&head).expect("rival reserves the driver");
        }
        Some(head)
    }
}

#[test]
fn candidate_taken_between_lookup_and_offer_is_skipped() {
    let mut harness = DispatchHarness::new();
    let policy = Arc::new(RacingPolicy {
        index: Arc::clone(&harness.index),
        raced: AtomicBool::new(false),
    });
    harness.coordinator = harness.coordinator.clone().with_policy(policy);
    harness.register_drivers("suv", &["d1", "d2"]);

    let (trip_id, outbound) = harness.create_trip("rider-1", "suv");

    assert_eq!(offered_to(&outbound), ["d2"]);
    assert_eq!(harness.trip(&trip_id).offered_driver.as_deref(), Some("d2"));
}

#[test]
fn round_robin_policy_spreads_consecutive_trips() {
    let mut harness = DispatchHarnessBuilder::new()
        .policy(MatchingPolicyKind::RoundRobin.build())
        .build();
    harness.register_drivers("sedan", &["d1", "d2", "d3"]);

    let (first, first_out) = harness.create_trip("rider-1", "sedan");
    let after_decline = harness.decline("d1", &first).expect("decline");
    let (second, second_out) = harness.create_trip("rider-2", "sedan");

    assert_eq!(harness.coordinator.policy_name(), "round_robin");
    assert_eq!(offered_to(&first_out), ["d1"]);
    // Turn 1 over [d2, d3], then turn 2 over [d1, d2] while d3 holds an offer.
    assert_eq!(offered_to(&after_decline), ["d3"]);
    assert_eq!(offered_to(&second_out), ["d1"]);
    assert_eq!(harness.trip(&first).offered_driver.as_deref(), Some("d3"));
    assert_eq!(harness.trip(&second).offered_driver.as_deref(), Some("d1"));
}
