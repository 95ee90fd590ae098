//! Performance benchmarks for dispatch_core using Criterion.rs.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispatch_contracts::routing::{FIND_AVAILABLE_DRIVERS_QUEUE, TRIP_EVENT_CREATED};
use dispatch_contracts::{Envelope, TripEventData};
use dispatch_core::availability::DriverAvailabilityIndex;
use dispatch_core::broker::Delivery;
use dispatch_core::coordinator::DispatchCoordinator;
use dispatch_core::telemetry::DispatchTelemetry;
use dispatch_core::test_helpers::{ride_fare, RecordingPublisher};
use dispatch_core::trip::{TripRecord, TripStore};

const PACKAGES: [&str; 4] = ["suv", "sedan", "van", "luxury"];

fn populated_index(drivers: usize) -> DriverAvailabilityIndex {
    let index = DriverAvailabilityIndex::new();
    for n in 0..drivers {
        index.register_driver(&format!("driver-{n}"), PACKAGES[n % PACKAGES.len()]);
    }
    index
}

fn bench_find_available(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_available");
    for drivers in [100, 1_000, 10_000] {
        let index = populated_index(drivers);
        group.bench_with_input(BenchmarkId::from_parameter(drivers), &index, |b, index| {
            b.iter(|| black_box(index.find_available("suv")));
        });
    }
    group.finish();
}

fn bench_offer_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("offer_round");
    for drivers in [100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(drivers), &drivers, |b, &drivers| {
            let index = Arc::new(populated_index(drivers));
            let publisher = Arc::new(RecordingPublisher::new());
            let coordinator = DispatchCoordinator::new(
                Arc::clone(&index),
                Arc::new(TripStore::new()),
                publisher.clone(),
                Arc::new(DispatchTelemetry::default()),
            );
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                let trip = TripRecord::new(format!("trip-{n}"), ride_fare("rider", "suv"));
                let delivery = Delivery {
                    queue: FIND_AVAILABLE_DRIVERS_QUEUE.to_string(),
                    delivery_tag: n,
                    envelope: Envelope::new(
                        TRIP_EVENT_CREATED,
                        "rider",
                        &TripEventData {
                            trip: trip.summary(),
                        },
                    )
                    .expect("envelope"),
                };
                black_box(coordinator.handle_delivery(&delivery)).ok();
                // Put every driver back so each round sees the same pool.
                for driver_id in publisher.take().iter().map(|envelope| &envelope.owner_id) {
                    let _ = index.release(driver_id);
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_find_available, bench_offer_round);
criterion_main!(benches);
