//! Session recording for the active workout.
//!
//! A session starts by capturing a baseline from the cumulative counters the
//! ergometer reports, so distance and stroke count can be shown relative to the
//! start. While recording, each processed frame appends one [`Sample`] to a
//! bounded FIFO buffer.
//!
//! ## Time Source
//!
//! Samples are keyed by elapsed time. The first frame recorded after `start()`
//! fixes where that time comes from for the rest of the session:
//!
//! - **`Device`**: the frame carried an elapsed-time field; later samples keep
//!   using the device clock (falling back to the last known device value).
//! - **`WallClock`**: it did not; later samples use whole seconds since
//!   `start()`, even if the device begins reporting elapsed time mid-session.
//!
//! ## Summaries
//!
//! [`SessionSummary`] is what the logbook collaborator persists. The core never
//! writes it anywhere itself.

use crate::metrics::{DerivedMetrics, MetricsSnapshot};
use crate::metrics::workout::Workout;
use crate::protocol::{DecodedFields, Metric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use uuid::Uuid;

/// Default bound on buffered samples.
pub const MAX_SAMPLES: usize = 300;

/// Default number of points kept in a summary.
pub const SUMMARY_POINTS: usize = 240;

/// One point of session history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Elapsed seconds.
    pub time: f64,
    /// Instantaneous watts, as reported by the device.
    pub power: Option<f64>,
    /// Instantaneous pace, seconds per 500m.
    pub pace: Option<f64>,
    /// Distance in meters (cumulative in the raw buffer, session-relative in
    /// [`SessionRecorder::session_samples`]).
    pub distance: Option<f64>,
    /// Strokes per minute.
    pub stroke_rate: Option<f64>,
}

/// Cumulative counters captured at session start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    /// Cumulative meters at start.
    pub distance_offset: f64,
    /// Cumulative strokes at start.
    pub stroke_count_offset: f64,
}

impl Baseline {
    fn capture(snapshot: &MetricsSnapshot) -> Self {
        Self {
            distance_offset: snapshot.get(Metric::TotalDistance).unwrap_or(0.0),
            stroke_count_offset: snapshot.get(Metric::StrokeCount).unwrap_or(0.0),
        }
    }
}

/// Where sample timestamps come from for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeSource {
    /// Elapsed-time field reported by the ergometer.
    Device,
    /// Whole seconds since `start()`.
    WallClock,
}

/// Owns the sample buffer and session lifecycle.
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    samples: VecDeque<Sample>,
    capacity: usize,
    baseline: Baseline,
    recording: bool,
    started_at: Option<Instant>,
    time_source: Option<TimeSource>,
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRecorder {
    /// Recorder holding at most [`MAX_SAMPLES`] samples.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_SAMPLES)
    }

    /// Recorder holding at most `capacity` samples (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            baseline: Baseline::default(),
            recording: false,
            started_at: None,
            time_source: None,
        }
    }

    /// Start a session now.
    pub fn start(&mut self, snapshot: &MetricsSnapshot) {
        self.start_at(snapshot, Instant::now());
    }

    /// Start a session: capture the baseline, clear history, begin recording.
    pub fn start_at(&mut self, snapshot: &MetricsSnapshot, now: Instant) {
        self.baseline = Baseline::capture(snapshot);
        self.samples.clear();
        self.started_at = Some(now);
        self.time_source = None;
        self.recording = true;
        tracing::info!(
            distance_offset = self.baseline.distance_offset,
            stroke_count_offset = self.baseline.stroke_count_offset,
            "Session started"
        );
    }

    /// Stop recording. Samples stay until the next `start()`.
    pub fn stop(&mut self) {
        if self.recording {
            tracing::info!(samples = self.samples.len(), "Session stopped");
        }
        self.recording = false;
    }

    /// Drop buffered samples and restart the session clock on the next sample.
    ///
    /// The recording flag and baseline are left as they are.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.started_at = None;
        self.time_source = None;
    }

    /// Record a processed frame now.
    pub fn record(&mut self, fields: &DecodedFields, snapshot: &MetricsSnapshot) -> Option<Sample> {
        self.record_at(fields, snapshot, Instant::now())
    }

    /// Record a processed frame.
    ///
    /// Returns the appended sample, or `None` when not recording or when no
    /// usable time exists for this frame.
    pub fn record_at(
        &mut self,
        fields: &DecodedFields,
        snapshot: &MetricsSnapshot,
        now: Instant,
    ) -> Option<Sample> {
        if !self.recording {
            return None;
        }
        let started_at = *self.started_at.get_or_insert(now);
        let source = *self.time_source.get_or_insert_with(|| {
            if fields.get(Metric::ElapsedTime).is_some() {
                TimeSource::Device
            } else {
                TimeSource::WallClock
            }
        });

        let time = match source {
            TimeSource::Device => fields
                .get(Metric::ElapsedTime)
                .or_else(|| snapshot.get(Metric::ElapsedTime)),
            TimeSource::WallClock => Some(now.saturating_duration_since(started_at).as_secs_f64().round()),
        };
        let Some(time) = time else {
            tracing::debug!("Skipping sample without a usable elapsed time");
            return None;
        };

        let sample = Sample {
            time,
            power: fields.get(Metric::InstantaneousPower),
            pace: fields.get(Metric::InstantaneousPace),
            distance: fields.get(Metric::TotalDistance),
            stroke_rate: fields.get(Metric::StrokeRate),
        };
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        tracing::trace!(time, buffered = self.samples.len(), "Sample recorded");
        Some(sample)
    }

    /// Whether a session is recording.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Baseline of the current (or last) session.
    #[must_use]
    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    /// Time source chosen for the current session, once decided.
    #[must_use]
    pub fn time_source(&self) -> Option<TimeSource> {
        self.time_source
    }

    /// Maximum buffered samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw buffered samples, oldest first. Distances are cumulative.
    #[must_use]
    pub fn samples(&self) -> &VecDeque<Sample> {
        &self.samples
    }

    /// Buffered samples with distance made session-relative.
    #[must_use]
    pub fn session_samples(&self) -> Vec<Sample> {
        self.samples
            .iter()
            .map(|sample| Sample {
                distance: sample
                    .distance
                    .map(|d| relative(d, self.baseline.distance_offset)),
                ..*sample
            })
            .collect()
    }

    /// Meters rowed since start, never negative.
    #[must_use]
    pub fn session_distance(&self, snapshot: &MetricsSnapshot) -> Option<f64> {
        snapshot
            .get(Metric::TotalDistance)
            .map(|d| relative(d, self.baseline.distance_offset))
    }

    /// Strokes taken since start, never negative.
    #[must_use]
    pub fn session_stroke_count(&self, snapshot: &MetricsSnapshot) -> Option<f64> {
        snapshot
            .get(Metric::StrokeCount)
            .map(|count| relative(count, self.baseline.stroke_count_offset))
    }
}

fn relative(cumulative: f64, offset: f64) -> f64 {
    (cumulative - offset).max(0.0)
}

/// Keep at most `max_points` items by taking every `ceil(len / max_points)`-th
/// one, starting with the first.
#[must_use]
pub fn downsample<T: Clone>(items: &[T], max_points: usize) -> Vec<T> {
    if max_points == 0 || items.len() <= max_points {
        return items.to_vec();
    }
    let step = items.len().div_ceil(max_points);
    items.iter().step_by(step).cloned().collect()
}

/// Final figures of a session, handed to the logbook collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Unique entry id.
    pub id: Uuid,
    /// When the summary was taken.
    pub recorded_at: DateTime<Utc>,
    /// Workout the session followed, if any.
    pub workout: Option<Workout>,
    /// Session meters.
    pub distance: Option<f64>,
    /// Elapsed seconds.
    pub elapsed_time: Option<f64>,
    /// Seconds per 500m.
    pub average_pace: Option<f64>,
    /// Watts.
    pub average_power: Option<f64>,
    /// Strokes per minute.
    pub average_stroke_rate: Option<f64>,
    /// Session strokes.
    pub stroke_count: Option<f64>,
    /// Damper setting reported by the device.
    pub resistance_level: Option<f64>,
    /// Downsampled, session-relative history.
    pub samples: Vec<Sample>,
}

impl SessionSummary {
    /// Build a summary, or `None` if nothing was recorded.
    #[must_use]
    pub fn build(
        recorder: &SessionRecorder,
        snapshot: &MetricsSnapshot,
        derived: &DerivedMetrics,
        workout: Option<&Workout>,
        max_points: usize,
    ) -> Option<Self> {
        if recorder.samples().is_empty() {
            return None;
        }
        Some(Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            workout: workout.cloned(),
            distance: derived.session_distance,
            elapsed_time: derived.elapsed_time,
            average_pace: derived.average_pace,
            average_power: derived.average_power,
            average_stroke_rate: derived.average_stroke_rate,
            stroke_count: derived.session_stroke_count,
            resistance_level: snapshot.get(Metric::ResistanceLevel),
            samples: downsample(&recorder.session_samples(), max_points),
        })
    }

    /// Pretty JSON for persistence by the caller.
    pub fn to_json(&self) -> crate::error::AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
