//! Snapshot Aggregator
//!
//! Fans out to every metric source concurrently, waits for all of them
//! to settle, and merges the results into one [`HealthSnapshot`]. A
//! single failing source never aborts the collection: its slot is
//! populated with [`Slot::NoData`] and the failure is recorded in the
//! snapshot's diagnostics list.

use crate::metrics::{
    HealthStore, QuantityKind, Sample, SleepStageAccumulator, SourceError, Window, WorkoutSample,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One metric slot of a snapshot. Absence is always explicit - a slot
/// is never omitted from the snapshot, so formatting is total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Slot<T> {
    Data(T),
    NoData,
}

impl<T> Slot<T> {
    pub fn as_data(&self) -> Option<&T> {
        match self {
            Slot::Data(value) => Some(value),
            Slot::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Slot::NoData)
    }
}

/// A source failure absorbed during collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// The aggregate of one collection cycle. Every metric slot is present
/// even when its underlying fetch failed or returned nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub captured_at: DateTime<Local>,
    pub user_name: String,
    pub steps: Slot<Vec<Sample>>,
    pub sleep: Slot<SleepStageAccumulator>,
    pub workouts: Slot<Vec<WorkoutSample>>,
    pub heart_rate: Slot<Vec<Sample>>,
    pub resting_heart_rate: Slot<Vec<Sample>>,
    pub active_energy: Slot<Vec<Sample>>,
    pub basal_energy: Slot<Vec<Sample>>,
    pub stand_time: Slot<Vec<Sample>>,
    pub distance: Slot<Vec<Sample>>,
    pub exercise_time: Slot<Vec<Sample>>,
    pub flights_climbed: Slot<Vec<Sample>>,
    pub height: Slot<Option<Sample>>,
    pub weight: Slot<Option<Sample>>,
    pub diagnostics: Vec<SourceFailure>,
}

impl HealthSnapshot {
    /// Number of slots that ended up without data.
    pub fn no_data_slots(&self) -> usize {
        let mut count = 0;
        count += self.steps.is_no_data() as usize;
        count += self.sleep.is_no_data() as usize;
        count += self.workouts.is_no_data() as usize;
        count += self.heart_rate.is_no_data() as usize;
        count += self.resting_heart_rate.is_no_data() as usize;
        count += self.active_energy.is_no_data() as usize;
        count += self.basal_energy.is_no_data() as usize;
        count += self.stand_time.is_no_data() as usize;
        count += self.distance.is_no_data() as usize;
        count += self.exercise_time.is_no_data() as usize;
        count += self.flights_climbed.is_no_data() as usize;
        count += self.height.is_no_data() as usize;
        count += self.weight.is_no_data() as usize;
        count
    }
}

/// Fan-out/fan-in collector over a [`HealthStore`].
pub struct Aggregator {
    store: Arc<dyn HealthStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self { store }
    }

    /// Collect one snapshot.
    ///
    /// All source fetches are issued concurrently and the last one to
    /// settle gates the return - there is no early exit, and no fetch
    /// can block another. `window` covers the quantity sources; sleep
    /// queries its own evening window derived from `captured_at`.
    pub async fn collect(
        &self,
        window: Window,
        captured_at: DateTime<Local>,
        user_name: &str,
    ) -> HealthSnapshot {
        let sleep_window = Window::sleep_local(captured_at);
        let store = &self.store;

        let (
            steps,
            sleep,
            workouts,
            heart_rate,
            resting_heart_rate,
            active_energy,
            basal_energy,
            stand_time,
            distance,
            exercise_time,
            flights_climbed,
            height,
            weight,
        ) = tokio::join!(
            store.quantity_samples(QuantityKind::Steps, window),
            store.sleep_samples(sleep_window),
            store.workouts(window),
            store.quantity_samples(QuantityKind::HeartRate, window),
            store.quantity_samples(QuantityKind::RestingHeartRate, window),
            store.quantity_samples(QuantityKind::ActiveEnergy, window),
            store.quantity_samples(QuantityKind::BasalEnergy, window),
            store.quantity_samples(QuantityKind::StandTime, window),
            store.quantity_samples(QuantityKind::Distance, window),
            store.quantity_samples(QuantityKind::ExerciseTime, window),
            store.quantity_samples(QuantityKind::FlightsClimbed, window),
            store.latest_quantity(QuantityKind::Height),
            store.latest_quantity(QuantityKind::Weight),
        );

        let mut diagnostics = Vec::new();

        let sleep = match sleep {
            Ok(samples) => Slot::Data(SleepStageAccumulator::from_samples(
                &samples,
                &sleep_window,
            )),
            Err(e) => {
                record_failure(&mut diagnostics, "sleep", &e);
                Slot::NoData
            }
        };
        let workouts = match workouts {
            Ok(sessions) => Slot::Data(sessions),
            Err(e) => {
                record_failure(&mut diagnostics, "workouts", &e);
                Slot::NoData
            }
        };

        let snapshot = HealthSnapshot {
            captured_at,
            user_name: user_name.to_string(),
            steps: series_slot(QuantityKind::Steps, steps, &mut diagnostics),
            sleep,
            workouts,
            heart_rate: series_slot(QuantityKind::HeartRate, heart_rate, &mut diagnostics),
            resting_heart_rate: series_slot(
                QuantityKind::RestingHeartRate,
                resting_heart_rate,
                &mut diagnostics,
            ),
            active_energy: series_slot(QuantityKind::ActiveEnergy, active_energy, &mut diagnostics),
            basal_energy: series_slot(QuantityKind::BasalEnergy, basal_energy, &mut diagnostics),
            stand_time: series_slot(QuantityKind::StandTime, stand_time, &mut diagnostics),
            distance: series_slot(QuantityKind::Distance, distance, &mut diagnostics),
            exercise_time: series_slot(QuantityKind::ExerciseTime, exercise_time, &mut diagnostics),
            flights_climbed: series_slot(
                QuantityKind::FlightsClimbed,
                flights_climbed,
                &mut diagnostics,
            ),
            height: latest_slot(QuantityKind::Height, height, &mut diagnostics),
            weight: latest_slot(QuantityKind::Weight, weight, &mut diagnostics),
            diagnostics,
        };

        if !snapshot.diagnostics.is_empty() {
            tracing::warn!(
                failed_sources = snapshot.diagnostics.len(),
                "Some metric sources were unavailable during collection"
            );
        }

        snapshot
    }
}

fn record_failure(diagnostics: &mut Vec<SourceFailure>, source: &str, error: &SourceError) {
    tracing::debug!(source, error = %error, "Metric source fetch failed");
    diagnostics.push(SourceFailure {
        source: source.to_string(),
        error: error.to_string(),
    });
}

fn series_slot(
    kind: QuantityKind,
    result: Result<Vec<Sample>, SourceError>,
    diagnostics: &mut Vec<SourceFailure>,
) -> Slot<Vec<Sample>> {
    match result {
        Ok(samples) => Slot::Data(samples),
        Err(e) => {
            record_failure(diagnostics, kind.label(), &e);
            Slot::NoData
        }
    }
}

fn latest_slot(
    kind: QuantityKind,
    result: Result<Option<Sample>, SourceError>,
    diagnostics: &mut Vec<SourceFailure>,
) -> Slot<Option<Sample>> {
    match result {
        Ok(sample) => Slot::Data(sample),
        Err(e) => {
            record_failure(diagnostics, kind.label(), &e);
            Slot::NoData
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MemoryHealthStore;
    use chrono::{TimeZone, Utc};

    fn captured_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    fn window() -> Window {
        Window::today_local(captured_at())
    }

    #[tokio::test]
    async fn every_slot_populated_when_all_sources_fail() {
        let store = Arc::new(MemoryHealthStore::new().deny_all());
        let aggregator = Aggregator::new(store);

        let snapshot = aggregator.collect(window(), captured_at(), "Jane Doe").await;

        // All 13 slots present, all marked NoData, all failures recorded
        assert_eq!(snapshot.no_data_slots(), 13);
        assert_eq!(snapshot.diagnostics.len(), 13);
        assert_eq!(snapshot.user_name, "Jane Doe");
    }

    #[tokio::test]
    async fn empty_store_yields_empty_series_not_failures() {
        let store = Arc::new(MemoryHealthStore::new());
        let aggregator = Aggregator::new(store);

        let snapshot = aggregator.collect(window(), captured_at(), "Jane Doe").await;

        assert!(snapshot.diagnostics.is_empty());
        assert_eq!(snapshot.no_data_slots(), 0);
        assert_eq!(snapshot.steps.as_data().unwrap().len(), 0);
        assert_eq!(snapshot.height.as_data().unwrap(), &None);
        // Sleep slot holds the full five-stage accumulator even with no data
        let sleep = snapshot.sleep.as_data().unwrap();
        assert_eq!(sleep.stages().count(), 5);
        assert!(!sleep.has_data());
    }

    #[tokio::test]
    async fn one_failing_source_does_not_abort_the_rest() {
        let start = Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap();
        let store = Arc::new(
            MemoryHealthStore::new()
                .with_quantity(
                    QuantityKind::HeartRate,
                    vec![Sample::new(start, start, 72.0)],
                )
                .deny(QuantityKind::Steps),
        );
        let aggregator = Aggregator::new(store);

        let snapshot = aggregator.collect(window(), captured_at(), "Jane Doe").await;

        assert!(snapshot.steps.is_no_data());
        assert_eq!(snapshot.diagnostics.len(), 1);
        assert_eq!(snapshot.diagnostics[0].source, "steps");
        assert_eq!(snapshot.heart_rate.as_data().unwrap().len(), 1);
    }
}
