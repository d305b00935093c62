//! Snapshot Formatter
//!
//! Deterministically renders a [`HealthSnapshot`] into the canonical
//! upload document. Pure function of its input: the capture timestamp
//! travels inside the snapshot, so repeated renders of an unchanged
//! snapshot are byte-identical.
//!
//! The document shape is a wire contract consumed downstream. Field
//! names, placeholder messages, and the empty-series policy (a
//! placeholder object instead of an empty array) must not change.

use crate::aggregator::{HealthSnapshot, Slot};
use crate::metrics::{Sample, SleepStageAccumulator, WorkoutSample};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde_json::{json, Map, Value};

/// Short date+time format used for every rendered timestamp.
const SHORT_DATETIME: &str = "%d/%m/%Y, %H:%M";

/// The canonical serialized form of a snapshot: a self-contained JSON
/// document plus its storage key.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadDocument {
    pub key: String,
    pub body: Value,
}

impl UploadDocument {
    /// Serialize the document body for upload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.body)
    }
}

/// Storage key for one user and calendar day:
/// `{normalized-name}/{YYYY-MM-DD}.json`. A second upload on the same
/// day targets the same key and overwrites (last-write-wins).
pub fn storage_key(user_name: &str, date: NaiveDate) -> String {
    format!(
        "{}/{}.json",
        normalize_user(user_name),
        date.format("%Y-%m-%d")
    )
}

fn normalize_user(user_name: &str) -> String {
    user_name.trim().to_lowercase()
}

/// Render a snapshot into its upload document.
pub fn render(snapshot: &HealthSnapshot) -> UploadDocument {
    let mut body = Map::new();

    body.insert("User Name".into(), json!(snapshot.user_name));
    body.insert("Steps Data".into(), json!(total_steps(&snapshot.steps)));
    body.insert(
        "Upload Date".into(),
        json!(snapshot.captured_at.format(SHORT_DATETIME).to_string()),
    );
    body.insert(
        "Sleep Data".into(),
        sleep_field(&snapshot.sleep, "No sleep data available"),
    );
    body.insert(
        "Workout Data".into(),
        workout_field(&snapshot.workouts, "No workout data available"),
    );
    body.insert(
        "Heart Rate Data".into(),
        series_field(
            &snapshot.heart_rate,
            "Heart Rate (bpm)",
            "No heart rate data available",
        ),
    );
    body.insert(
        "Resting Heart Rate Data".into(),
        series_field(
            &snapshot.resting_heart_rate,
            "Resting Heart Rate (bpm)",
            "No resting heart rate data available",
        ),
    );
    body.insert(
        "Active Energy Data".into(),
        series_field(
            &snapshot.active_energy,
            "Active Energy (kcal)",
            "No active energy data available",
        ),
    );
    body.insert(
        "Resting Energy Data".into(),
        series_field(
            &snapshot.basal_energy,
            "Basal Energy (kcal)",
            "No basal energy data available",
        ),
    );
    body.insert(
        "Stand Time Data".into(),
        series_field(
            &snapshot.stand_time,
            "Stand Time (minutes)",
            "No stand time data available",
        ),
    );
    body.insert(
        "Distance Data".into(),
        series_field(
            &snapshot.distance,
            "Distance (km)",
            "No distance data available",
        ),
    );
    body.insert(
        "Exercise Minutes Data".into(),
        exercise_field(&snapshot.exercise_time),
    );
    body.insert(
        "Flights Climbed Data".into(),
        series_field(
            &snapshot.flights_climbed,
            "Flights Climbed",
            "No flights climbed data available",
        ),
    );
    body.insert(
        "Height Data".into(),
        latest_field(&snapshot.height, "Height (cm)", "No height data available"),
    );
    body.insert(
        "Weight Data".into(),
        latest_field(&snapshot.weight, "Weight (kg)", "No weight data available"),
    );

    UploadDocument {
        key: storage_key(&snapshot.user_name, snapshot.captured_at.date_naive()),
        body: Value::Object(body),
    }
}

fn fmt_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format(SHORT_DATETIME).to_string()
}

/// Sum of the step series, rounded to an integer. A missing or empty
/// series contributes zero steps rather than a placeholder.
fn total_steps(slot: &Slot<Vec<Sample>>) -> i64 {
    match slot.as_data() {
        Some(samples) => samples.iter().map(|s| s.value).sum::<f64>().round() as i64,
        None => 0,
    }
}

fn placeholder(message: &str) -> Value {
    json!({ "Message": message })
}

fn sample_record(sample: &Sample, value_key: &str) -> Value {
    json!({
        "Start Time": fmt_time(sample.start),
        "End Time": fmt_time(sample.end),
        value_key: format!("{}", sample.value),
    })
}

fn series_field(slot: &Slot<Vec<Sample>>, value_key: &str, empty_message: &str) -> Value {
    let records: Vec<Value> = slot
        .as_data()
        .map(|samples| samples.iter().map(|s| sample_record(s, value_key)).collect())
        .unwrap_or_default();

    if records.is_empty() {
        placeholder(empty_message)
    } else {
        Value::Array(records)
    }
}

/// Exercise-time records carry the literal duration "1.0" per sample.
/// Downstream consumers count records, not minutes; the literal is
/// part of the wire contract.
fn exercise_field(slot: &Slot<Vec<Sample>>) -> Value {
    let records: Vec<Value> = slot
        .as_data()
        .map(|samples| {
            samples
                .iter()
                .map(|s| {
                    json!({
                        "Start Time": fmt_time(s.start),
                        "End Time": fmt_time(s.end),
                        "Exercise Time (minutes)": "1.0",
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if records.is_empty() {
        placeholder("No exercise time data available")
    } else {
        Value::Array(records)
    }
}

/// Sleep renders one record per stage with nonzero duration. The
/// accumulator keeps all five stages, but zero-duration stages are
/// dropped here.
fn sleep_field(slot: &Slot<SleepStageAccumulator>, empty_message: &str) -> Value {
    let records: Vec<Value> = slot
        .as_data()
        .map(|acc| {
            acc.stages()
                .filter(|(_, summary)| !summary.is_empty())
                .map(|(stage, summary)| {
                    let minutes = summary.minutes as i64;
                    json!({
                        "Stage": stage.label(),
                        "Start Time": summary.first_start.map(fmt_time).unwrap_or_default(),
                        "End Time": summary.last_end.map(fmt_time).unwrap_or_default(),
                        "Duration": format!("{}h {}m", minutes / 60, minutes % 60),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if records.is_empty() {
        placeholder(empty_message)
    } else {
        Value::Array(records)
    }
}

fn workout_field(slot: &Slot<Vec<WorkoutSample>>, empty_message: &str) -> Value {
    let records: Vec<Value> = slot
        .as_data()
        .map(|workouts| {
            workouts
                .iter()
                .map(|w| {
                    json!({
                        "Type": w.activity,
                        "Start Time": fmt_time(w.start),
                        "End Time": fmt_time(w.end),
                        "Duration (minutes)": format!("{} min", w.duration_minutes as i64),
                        "Total Energy Burned (kcal)": format!("{} kcal", w.energy_kcal),
                        "Total Distance (m)": format!("{} m", w.distance_m),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if records.is_empty() {
        placeholder(empty_message)
    } else {
        Value::Array(records)
    }
}

fn latest_field(slot: &Slot<Option<Sample>>, value_key: &str, empty_message: &str) -> Value {
    let value = match slot.as_data() {
        Some(Some(sample)) => format!("{}", sample.value),
        _ => empty_message.to_string(),
    };
    json!({ value_key: value })
}
