//! In-Memory Health Store
//!
//! A [`HealthStore`] backed by plain maps. Used by the test suite and
//! by the CLI's dry-run mode, where no device health store exists.

use super::{HealthStore, QuantityKind, Sample, SleepSample, SourceError, Window, WorkoutSample};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// In-memory health data store.
///
/// Built with the `with_*` constructors; `deny` marks a quantity kind
/// as permission-denied so failure paths can be exercised.
#[derive(Debug, Default)]
pub struct MemoryHealthStore {
    quantities: HashMap<QuantityKind, Vec<Sample>>,
    sleep: Vec<SleepSample>,
    workouts: Vec<WorkoutSample>,
    denied: HashSet<QuantityKind>,
    sleep_denied: bool,
    workouts_denied: bool,
}

impl MemoryHealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quantity(mut self, kind: QuantityKind, samples: Vec<Sample>) -> Self {
        self.quantities.insert(kind, samples);
        self
    }

    pub fn with_sleep(mut self, samples: Vec<SleepSample>) -> Self {
        self.sleep = samples;
        self
    }

    pub fn with_workouts(mut self, workouts: Vec<WorkoutSample>) -> Self {
        self.workouts = workouts;
        self
    }

    /// Mark a quantity kind as permission-denied.
    pub fn deny(mut self, kind: QuantityKind) -> Self {
        self.denied.insert(kind);
        self
    }

    pub fn deny_sleep(mut self) -> Self {
        self.sleep_denied = true;
        self
    }

    pub fn deny_workouts(mut self) -> Self {
        self.workouts_denied = true;
        self
    }

    /// Deny every source. Models a user who declined all permissions.
    pub fn deny_all(mut self) -> Self {
        for kind in [
            QuantityKind::Steps,
            QuantityKind::HeartRate,
            QuantityKind::RestingHeartRate,
            QuantityKind::ActiveEnergy,
            QuantityKind::BasalEnergy,
            QuantityKind::StandTime,
            QuantityKind::Distance,
            QuantityKind::ExerciseTime,
            QuantityKind::FlightsClimbed,
            QuantityKind::Height,
            QuantityKind::Weight,
        ] {
            self.denied.insert(kind);
        }
        self.sleep_denied = true;
        self.workouts_denied = true;
        self
    }

    fn check(&self, kind: QuantityKind) -> Result<(), SourceError> {
        if self.denied.contains(&kind) {
            Err(SourceError::PermissionDenied(kind.label().to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HealthStore for MemoryHealthStore {
    async fn quantity_samples(
        &self,
        kind: QuantityKind,
        window: Window,
    ) -> Result<Vec<Sample>, SourceError> {
        self.check(kind)?;
        Ok(self
            .quantities
            .get(&kind)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.start >= window.start && s.start < window.end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_quantity(&self, kind: QuantityKind) -> Result<Option<Sample>, SourceError> {
        self.check(kind)?;
        Ok(self
            .quantities
            .get(&kind)
            .and_then(|samples| samples.iter().max_by_key(|s| s.end).copied()))
    }

    async fn sleep_samples(&self, window: Window) -> Result<Vec<SleepSample>, SourceError> {
        if self.sleep_denied {
            return Err(SourceError::PermissionDenied("sleep".to_string()));
        }
        Ok(self
            .sleep
            .iter()
            .filter(|s| s.end > window.start && s.start < window.end)
            .cloned()
            .collect())
    }

    async fn workouts(&self, window: Window) -> Result<Vec<WorkoutSample>, SourceError> {
        if self.workouts_denied {
            return Err(SourceError::PermissionDenied("workouts".to_string()));
        }
        Ok(self
            .workouts
            .iter()
            .filter(|w| w.start >= window.start && w.start < window.end)
            .cloned()
            .collect())
    }
}
