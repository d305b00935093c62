//! Benchmarks for snapshot formatting and sleep accumulation
//!
//! Run with: cargo bench

use chrono::{Duration, Local, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use vitalsync::{
    render, HealthSnapshot, Sample, SleepSample, SleepStage, SleepStageAccumulator, Slot, Window,
};

fn create_samples(count: usize) -> Vec<Sample> {
    let base = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let start = base + Duration::seconds(i as i64 * 60);
            Sample::new(start, start + Duration::seconds(60), 60.0 + (i % 40) as f64)
        })
        .collect()
}

fn create_sleep_samples(count: usize) -> Vec<SleepSample> {
    let base = Utc.with_ymd_and_hms(2026, 3, 13, 22, 0, 0).unwrap();
    let stages = [
        SleepStage::InBed,
        SleepStage::Core,
        SleepStage::Deep,
        SleepStage::Rem,
        SleepStage::Awake,
    ];
    (0..count)
        .map(|i| {
            let start = base + Duration::seconds(i as i64 * 300);
            SleepSample {
                stage: stages[i % stages.len()],
                start,
                end: start + Duration::seconds(300),
                source_name: "Apple Watch".to_string(),
            }
        })
        .collect()
}

fn snapshot_with_series(count: usize) -> HealthSnapshot {
    HealthSnapshot {
        captured_at: Local.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
        user_name: "Bench User".to_string(),
        steps: Slot::Data(create_samples(count)),
        sleep: Slot::Data(SleepStageAccumulator::new()),
        workouts: Slot::Data(vec![]),
        heart_rate: Slot::Data(create_samples(count)),
        resting_heart_rate: Slot::Data(vec![]),
        active_energy: Slot::Data(create_samples(count)),
        basal_energy: Slot::Data(create_samples(count)),
        stand_time: Slot::Data(vec![]),
        distance: Slot::Data(create_samples(count)),
        exercise_time: Slot::Data(create_samples(count)),
        flights_climbed: Slot::Data(vec![]),
        height: Slot::Data(None),
        weight: Slot::Data(None),
        diagnostics: vec![],
    }
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for size in [10, 100, 1000] {
        let snapshot = snapshot_with_series(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("render_{}", size), |b| {
            b.iter(|| render(black_box(&snapshot)))
        });
    }

    group.finish();
}

fn bench_sleep_accumulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("sleep");

    for size in [10, 100, 1000] {
        let samples = create_sleep_samples(size);
        let window = Window::new(
            Utc.with_ymd_and_hms(2026, 3, 13, 18, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap(),
        );
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("accumulate_{}", size), |b| {
            b.iter(|| SleepStageAccumulator::from_samples(black_box(&samples), &window))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_render, bench_sleep_accumulation);
criterion_main!(benches);
