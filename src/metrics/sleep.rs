//! Sleep Stage Accumulation
//!
//! Raw categorical sleep samples are filtered to watch-class recording
//! devices, clipped to the query window, and merged per stage. The
//! accumulator always carries exactly the five known stages; a stage
//! with no contributing samples stays present with zero duration so
//! formatting never has to handle a missing key.

use super::Window;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fixed set of sleep stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SleepStage {
    InBed,
    Rem,
    Core,
    Deep,
    Awake,
}

impl SleepStage {
    pub const ALL: [SleepStage; 5] = [
        SleepStage::InBed,
        SleepStage::Rem,
        SleepStage::Core,
        SleepStage::Deep,
        SleepStage::Awake,
    ];

    /// Wire label, exactly as uploaded documents spell it.
    pub fn label(&self) -> &'static str {
        match self {
            SleepStage::InBed => "In Bed",
            SleepStage::Rem => "REM Sleep",
            SleepStage::Core => "Core Sleep",
            SleepStage::Deep => "Deep Sleep",
            SleepStage::Awake => "Awake",
        }
    }
}

/// One raw categorical sample from the health store, tagged with the
/// name of the device that recorded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSample {
    pub stage: SleepStage,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source_name: String,
}

/// Source-name tokens identifying watch-class health trackers. Phone
/// motion estimates duplicate the watch data and are dropped.
const TRACKER_TOKENS: [&str; 3] = ["Watch", "Health", "Connect"];

/// Whether a sample came from an accepted tracking device
/// (substring match against [`TRACKER_TOKENS`]).
pub fn is_tracker_sample(sample: &SleepSample) -> bool {
    TRACKER_TOKENS
        .iter()
        .any(|token| sample.source_name.contains(token))
}

/// Accumulated per-stage totals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StageSummary {
    pub first_start: Option<DateTime<Utc>>,
    pub last_end: Option<DateTime<Utc>>,
    pub minutes: f64,
}

impl StageSummary {
    pub fn is_empty(&self) -> bool {
        self.minutes <= 0.0
    }
}

/// Per-stage merge of clipped sleep samples.
///
/// The merge is commutative: `first_start` is the minimum start,
/// `last_end` the maximum end, and minutes a plain sum, so feeding the
/// same samples in any order yields identical totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepStageAccumulator {
    stages: BTreeMap<SleepStage, StageSummary>,
}

impl SleepStageAccumulator {
    /// New accumulator with all five stages present at zero duration.
    pub fn new() -> Self {
        let mut stages = BTreeMap::new();
        for stage in SleepStage::ALL {
            stages.insert(stage, StageSummary::default());
        }
        Self { stages }
    }

    /// Merge one raw sample, clipping it to `window` first. Samples
    /// that fall outside the window (or collapse to non-positive
    /// duration after clipping) are discarded.
    pub fn accumulate(&mut self, sample: &SleepSample, window: &Window) {
        let Some((start, end)) = window.clip(sample.start, sample.end) else {
            return;
        };

        let summary = self
            .stages
            .entry(sample.stage)
            .or_insert_with(StageSummary::default);
        summary.first_start = Some(match summary.first_start {
            Some(existing) => existing.min(start),
            None => start,
        });
        summary.last_end = Some(match summary.last_end {
            Some(existing) => existing.max(end),
            None => end,
        });
        summary.minutes += (end - start).num_seconds() as f64 / 60.0;
    }

    /// Filter raw samples to tracker devices and merge them all.
    pub fn from_samples(samples: &[SleepSample], window: &Window) -> Self {
        let mut acc = Self::new();
        for sample in samples.iter().filter(|s| is_tracker_sample(s)) {
            acc.accumulate(sample, window);
        }
        acc
    }

    pub fn get(&self, stage: SleepStage) -> StageSummary {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    /// All five stages in fixed order.
    pub fn stages(&self) -> impl Iterator<Item = (SleepStage, StageSummary)> + '_ {
        SleepStage::ALL
            .into_iter()
            .map(move |stage| (stage, self.get(stage)))
    }

    /// Whether any stage accumulated a positive duration.
    pub fn has_data(&self) -> bool {
        self.stages().any(|(_, summary)| !summary.is_empty())
    }
}

impl Default for SleepStageAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    fn watch_sample(stage: SleepStage, start: DateTime<Utc>, end: DateTime<Utc>) -> SleepSample {
        SleepSample {
            stage,
            start,
            end,
            source_name: "Apple Watch".to_string(),
        }
    }

    fn night_window() -> Window {
        Window::new(utc(0, 0), utc(12, 0))
    }

    #[test]
    fn all_five_stages_present_when_empty() {
        let acc = SleepStageAccumulator::new();
        assert_eq!(acc.stages().count(), 5);
        assert!(acc.stages().all(|(_, s)| s.is_empty()));
        assert!(!acc.has_data());
    }

    #[test]
    fn non_overlapping_samples_sum_durations() {
        let window = night_window();
        let mut acc = SleepStageAccumulator::new();
        acc.accumulate(&watch_sample(SleepStage::Core, utc(1, 0), utc(1, 30)), &window);
        acc.accumulate(&watch_sample(SleepStage::Core, utc(2, 0), utc(2, 45)), &window);

        let core = acc.get(SleepStage::Core);
        assert_eq!(core.minutes, 75.0);
        assert_eq!(core.first_start, Some(utc(1, 0)));
        assert_eq!(core.last_end, Some(utc(2, 45)));
        // Other stages stay present at zero
        assert!(acc.get(SleepStage::Deep).is_empty());
    }

    #[test]
    fn accumulation_is_order_independent() {
        let window = night_window();
        let samples = vec![
            watch_sample(SleepStage::Deep, utc(3, 0), utc(3, 40)),
            watch_sample(SleepStage::Deep, utc(1, 0), utc(1, 20)),
            watch_sample(SleepStage::Rem, utc(4, 0), utc(4, 15)),
            watch_sample(SleepStage::Deep, utc(5, 0), utc(5, 10)),
        ];

        let forward = SleepStageAccumulator::from_samples(&samples, &window);
        let mut reversed = samples.clone();
        reversed.reverse();
        let backward = SleepStageAccumulator::from_samples(&reversed, &window);

        assert_eq!(forward, backward);
        assert_eq!(forward.get(SleepStage::Deep).minutes, 70.0);
        assert_eq!(forward.get(SleepStage::Deep).first_start, Some(utc(1, 0)));
        assert_eq!(forward.get(SleepStage::Deep).last_end, Some(utc(5, 10)));
    }

    #[test]
    fn samples_are_clipped_to_window() {
        let window = Window::new(utc(1, 0), utc(2, 0));
        let mut acc = SleepStageAccumulator::new();
        // Straddles both boundaries; only the in-window hour counts
        acc.accumulate(&watch_sample(SleepStage::InBed, utc(0, 30), utc(2, 30)), &window);
        assert_eq!(acc.get(SleepStage::InBed).minutes, 60.0);
        assert_eq!(acc.get(SleepStage::InBed).first_start, Some(utc(1, 0)));
        assert_eq!(acc.get(SleepStage::InBed).last_end, Some(utc(2, 0)));
    }

    #[test]
    fn out_of_window_samples_are_discarded() {
        let window = Window::new(utc(1, 0), utc(2, 0));
        let mut acc = SleepStageAccumulator::new();
        acc.accumulate(&watch_sample(SleepStage::Awake, utc(3, 0), utc(4, 0)), &window);
        assert!(!acc.has_data());
    }

    #[test]
    fn phone_samples_are_filtered_out() {
        let window = night_window();
        let samples = vec![
            SleepSample {
                stage: SleepStage::Core,
                start: utc(1, 0),
                end: utc(2, 0),
                source_name: "iPhone".to_string(),
            },
            SleepSample {
                stage: SleepStage::Core,
                start: utc(2, 0),
                end: utc(2, 30),
                source_name: "Galaxy Watch".to_string(),
            },
            SleepSample {
                stage: SleepStage::Deep,
                start: utc(3, 0),
                end: utc(3, 30),
                source_name: "Health Connect".to_string(),
            },
        ];

        let acc = SleepStageAccumulator::from_samples(&samples, &window);
        assert_eq!(acc.get(SleepStage::Core).minutes, 30.0);
        assert_eq!(acc.get(SleepStage::Deep).minutes, 30.0);
    }
}
