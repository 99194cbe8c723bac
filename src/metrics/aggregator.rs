//! Session-level figures derived from the snapshot and sample history.
//!
//! Nothing here holds state: [`DerivedMetrics::compute`] is recomputed on
//! demand whenever a consumer asks. Every division and power conversion is
//! guarded so an undefined result comes back as `None` rather than an
//! infinity or NaN.

use super::power::PowerModel;
use super::snapshot::MetricsSnapshot;
use super::workout::Workout;
use crate::protocol::Metric;
use crate::session::SessionRecorder;
use serde::Serialize;

/// Output of the aggregator. `None` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    /// Meters since session start.
    pub session_distance: Option<f64>,
    /// Strokes since session start.
    pub session_stroke_count: Option<f64>,
    /// Elapsed seconds.
    pub elapsed_time: Option<f64>,
    /// Current pace, seconds per 500m.
    pub instantaneous_pace: Option<f64>,
    /// Average pace, seconds per 500m.
    pub average_pace: Option<f64>,
    /// Current watts.
    pub instantaneous_power: Option<f64>,
    /// Average watts.
    pub average_power: Option<f64>,
    /// Average strokes per minute.
    pub average_stroke_rate: Option<f64>,
    /// Meters left to the workout target.
    pub distance_to_go: Option<f64>,
    /// Projected seconds to finish the target distance at average pace.
    pub predicted_finish_time: Option<f64>,
}

impl DerivedMetrics {
    /// Derive every figure from the current state.
    #[must_use]
    pub fn compute(
        snapshot: &MetricsSnapshot,
        recorder: &SessionRecorder,
        workout: Option<&Workout>,
        power: &PowerModel,
    ) -> Self {
        let session_distance = recorder.session_distance(snapshot);
        let session_stroke_count = recorder.session_stroke_count(snapshot);

        let elapsed_time = snapshot
            .get(Metric::ElapsedTime)
            .or_else(|| recorder.samples().back().map(|sample| sample.time));

        let instantaneous_pace = snapshot.get(Metric::InstantaneousPace);
        let average_pace = snapshot
            .get(Metric::AveragePace)
            .or_else(|| pace_from_distance(elapsed_time, session_distance));

        let instantaneous_power = snapshot
            .get(Metric::InstantaneousPower)
            .or_else(|| power.watts_for(instantaneous_pace));
        let average_power = snapshot
            .get(Metric::AveragePower)
            .or_else(|| power.watts_for(average_pace));

        let average_stroke_rate = snapshot
            .get(Metric::AverageStrokeRate)
            .or_else(|| finite_mean(recorder.samples().iter().filter_map(|s| s.stroke_rate)));

        let target_distance = workout.and_then(Workout::target_distance);
        let target_time = workout.and_then(Workout::target_time);

        let distance_to_go = match (target_distance, session_distance) {
            (Some(target), Some(rowed)) => Some((target - rowed).max(0.0)),
            _ => remaining_distance_for_time(target_time, elapsed_time, average_pace),
        };

        let predicted_finish_time = match (target_distance, average_pace) {
            (Some(target), Some(pace)) if pace > 0.0 => finite(target / 500.0 * pace),
            _ => None,
        };

        Self {
            session_distance,
            session_stroke_count,
            elapsed_time,
            instantaneous_pace,
            average_pace,
            instantaneous_power,
            average_power,
            average_stroke_rate,
            distance_to_go,
            predicted_finish_time,
        }
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// `elapsed / (distance / 500)`; needs both positive.
fn pace_from_distance(elapsed: Option<f64>, distance: Option<f64>) -> Option<f64> {
    match (elapsed, distance) {
        (Some(elapsed), Some(distance)) if elapsed > 0.0 && distance > 0.0 => {
            finite(elapsed / (distance / 500.0))
        }
        _ => None,
    }
}

/// Distance coverable in the time left at the average pace.
fn remaining_distance_for_time(
    target_time: Option<f64>,
    elapsed: Option<f64>,
    average_pace: Option<f64>,
) -> Option<f64> {
    match (target_time, elapsed, average_pace) {
        (Some(target), Some(elapsed), Some(pace)) if pace > 0.0 => {
            let remaining = (target - elapsed).max(0.0);
            finite(remaining / pace * 500.0)
        }
        _ => None,
    }
}

fn finite_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        finite(sum / f64::from(count))
    }
}
