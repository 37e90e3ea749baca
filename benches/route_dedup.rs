use chrono::DateTime;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use squadrun_core::geo_utils::haversine_distance;
use squadrun_core::models::{dedup_consecutive, RoutePoint};

fn synthetic_route(len: usize, duplicate_every: usize) -> Vec<RoutePoint> {
    (0..len)
        .map(|i| {
            // Every nth point repeats the previous coordinate.
            let step = if duplicate_every > 0 && i % duplicate_every == 0 && i > 0 {
                i - 1
            } else {
                i
            };
            RoutePoint {
                latitude: 37.4 + step as f64 * 0.00005,
                longitude: -122.1 + step as f64 * 0.00003,
                altitude: None,
                speed_mps: Some(3.0),
                horizontal_accuracy_m: Some(10.0),
                timestamp: DateTime::from_timestamp(1_750_000_000 + i as i64, 0).unwrap(),
            }
        })
        .collect()
}

fn benchmark_route_processing(c: &mut Criterion) {
    // A two-hour run at one fix per second.
    let route = synthetic_route(7200, 10);

    let mut group = c.benchmark_group("route_processing");

    group.bench_function("dedup_7200_points", |b| {
        b.iter(|| dedup_consecutive(black_box(route.clone())))
    });

    group.bench_function("distance_accumulation_7200_points", |b| {
        b.iter(|| {
            route
                .windows(2)
                .map(|w| {
                    haversine_distance(
                        w[0].latitude,
                        w[0].longitude,
                        w[1].latitude,
                        w[1].longitude,
                    )
                })
                .sum::<f64>()
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_route_processing);
criterion_main!(benches);
