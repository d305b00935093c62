//! Health Metric Data Model
//!
//! Types shared by the aggregation pipeline:
//! - [`Sample`]: one time-stamped reading from a quantity source
//! - [`Window`]: the `[start, end)` range a source is queried over
//! - [`HealthStore`]: the device-local health data collaborator
//!
//! Sleep-specific types live in [`sleep`].

pub mod memory;
pub mod sleep;

pub use memory::MemoryHealthStore;
pub use sleep::{SleepSample, SleepStage, SleepStageAccumulator, StageSummary};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Quantity-valued metric kinds read from the health store.
///
/// Sleep and workouts carry richer shapes and have dedicated accessors
/// on [`HealthStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QuantityKind {
    Steps,
    HeartRate,
    RestingHeartRate,
    ActiveEnergy,
    BasalEnergy,
    StandTime,
    Distance,
    ExerciseTime,
    FlightsClimbed,
    Height,
    Weight,
}

impl QuantityKind {
    /// Unit the store must deliver values in for this kind.
    pub fn unit(&self) -> &'static str {
        match self {
            QuantityKind::Steps => "count",
            QuantityKind::HeartRate => "bpm",
            QuantityKind::RestingHeartRate => "bpm",
            QuantityKind::ActiveEnergy => "kcal",
            QuantityKind::BasalEnergy => "kcal",
            QuantityKind::StandTime => "minutes",
            QuantityKind::Distance => "km",
            QuantityKind::ExerciseTime => "minutes",
            QuantityKind::FlightsClimbed => "count",
            QuantityKind::Height => "cm",
            QuantityKind::Weight => "kg",
        }
    }

    /// Human-readable name used in diagnostics and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            QuantityKind::Steps => "steps",
            QuantityKind::HeartRate => "heart_rate",
            QuantityKind::RestingHeartRate => "resting_heart_rate",
            QuantityKind::ActiveEnergy => "active_energy",
            QuantityKind::BasalEnergy => "basal_energy",
            QuantityKind::StandTime => "stand_time",
            QuantityKind::Distance => "distance",
            QuantityKind::ExerciseTime => "exercise_time",
            QuantityKind::FlightsClimbed => "flights_climbed",
            QuantityKind::Height => "height",
            QuantityKind::Weight => "weight",
        }
    }
}

/// One reading from a quantity source. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, value: f64) -> Self {
        Self { start, end, value }
    }
}

/// A completed workout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSample {
    pub activity: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: f64,
    pub energy_kcal: f64,
    pub distance_m: f64,
}

/// Query range for a metric fetch: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Start of the local calendar day through `now`. The default window
    /// for every quantity source.
    pub fn today_local(now: DateTime<Local>) -> Self {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).single())
            .unwrap_or(now);
        Self {
            start: midnight.with_timezone(&Utc),
            end: now.with_timezone(&Utc),
        }
    }

    /// 18:00 local yesterday through 18:00 local today. Sleep sessions
    /// straddle midnight, so the sleep source queries this fixed evening
    /// window instead of the calendar-day one.
    pub fn sleep_local(now: DateTime<Local>) -> Self {
        let today_six_pm = now
            .date_naive()
            .and_hms_opt(18, 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).single())
            .unwrap_or(now);
        Self {
            start: (today_six_pm - Duration::days(1)).with_timezone(&Utc),
            end: today_six_pm.with_timezone(&Utc),
        }
    }

    /// Clip a sample's range to this window. Returns `None` when the
    /// clipped range has non-positive duration.
    pub fn clip(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let clipped_start = start.max(self.start);
        let clipped_end = end.min(self.end);
        if clipped_start < clipped_end {
            Some((clipped_start, clipped_end))
        } else {
            None
        }
    }
}

/// Failure modes of a metric source. "No data in window" is not an
/// error and is reported as an empty result instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("permission not granted for {0}")]
    PermissionDenied(String),

    #[error("{0} is not supported on this device")]
    Unsupported(String),

    #[error("health store unavailable")]
    Unavailable,
}

/// Device-local health data store.
///
/// Implementations must not fail for "no data in window" - they return
/// an empty vector (or `None` for latest-sample queries) and reserve
/// [`SourceError`] for genuine unavailability such as a missing
/// permission grant.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// All samples of `kind` within `window`, in store order.
    async fn quantity_samples(
        &self,
        kind: QuantityKind,
        window: Window,
    ) -> Result<Vec<Sample>, SourceError>;

    /// Most recent sample of `kind` regardless of age (limit 1).
    /// Used for height and weight.
    async fn latest_quantity(&self, kind: QuantityKind) -> Result<Option<Sample>, SourceError>;

    /// Raw categorical sleep samples within `window`, unfiltered and
    /// unmerged. Each carries the name of the device that recorded it.
    async fn sleep_samples(&self, window: Window) -> Result<Vec<SleepSample>, SourceError>;

    /// Workout sessions within `window`.
    async fn workouts(&self, window: Window) -> Result<Vec<WorkoutSample>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    #[test]
    fn clip_inside_window_is_identity() {
        let window = Window::new(utc(0, 0), utc(12, 0));
        assert_eq!(
            window.clip(utc(3, 0), utc(4, 0)),
            Some((utc(3, 0), utc(4, 0)))
        );
    }

    #[test]
    fn clip_truncates_overhang() {
        let window = Window::new(utc(6, 0), utc(12, 0));
        assert_eq!(
            window.clip(utc(5, 0), utc(7, 0)),
            Some((utc(6, 0), utc(7, 0)))
        );
        assert_eq!(
            window.clip(utc(11, 0), utc(13, 0)),
            Some((utc(11, 0), utc(12, 0)))
        );
    }

    #[test]
    fn clip_rejects_disjoint_and_degenerate_ranges() {
        let window = Window::new(utc(6, 0), utc(12, 0));
        assert_eq!(window.clip(utc(1, 0), utc(2, 0)), None);
        assert_eq!(window.clip(utc(13, 0), utc(14, 0)), None);
        // Touching the boundary yields zero duration
        assert_eq!(window.clip(utc(1, 0), utc(6, 0)), None);
    }

    #[test]
    fn sleep_window_spans_one_day() {
        let now = Local.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let window = Window::sleep_local(now);
        assert_eq!(window.end - window.start, Duration::days(1));
    }

    #[test]
    fn today_window_ends_now() {
        let now = Local.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let window = Window::today_local(now);
        assert_eq!(window.end, now.with_timezone(&Utc));
        assert!(window.start < window.end);
    }
}
