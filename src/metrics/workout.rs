//! Workout target definitions.
//!
//! Workouts are authored and stored by collaborators; the core only reads the
//! distance and time targets they imply.

use serde::{Deserialize, Serialize};

/// One interval block, repeated `repeat` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    /// Work distance in meters.
    #[serde(default)]
    pub distance: Option<f64>,
    /// Work duration in seconds.
    #[serde(default)]
    pub time: Option<f64>,
    /// Rest after each repetition, in seconds.
    #[serde(default)]
    pub rest: Option<f64>,
    /// Repetitions (1 when absent).
    #[serde(default)]
    pub repeat: Option<u32>,
}

impl Interval {
    fn repeat(&self) -> f64 {
        f64::from(self.repeat.unwrap_or(1))
    }
}

/// Target kind of a workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkoutKind {
    /// Row a fixed distance.
    #[serde(rename_all = "camelCase")]
    Distance {
        /// Meters.
        target_distance: f64,
    },
    /// Row for a fixed time.
    #[serde(rename_all = "camelCase")]
    Time {
        /// Seconds.
        target_time: f64,
    },
    /// Repeated work/rest blocks.
    Interval {
        /// Blocks in order.
        intervals: Vec<Interval>,
    },
}

/// A named workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Target definition.
    #[serde(flatten)]
    pub kind: WorkoutKind,
}

impl Workout {
    /// Distance workout.
    pub fn distance(id: impl Into<String>, name: impl Into<String>, meters: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: WorkoutKind::Distance {
                target_distance: meters,
            },
        }
    }

    /// Time workout.
    pub fn time(id: impl Into<String>, name: impl Into<String>, seconds: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: WorkoutKind::Time {
                target_time: seconds,
            },
        }
    }

    /// Interval workout.
    pub fn intervals(id: impl Into<String>, name: impl Into<String>, blocks: Vec<Interval>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: WorkoutKind::Interval { intervals: blocks },
        }
    }

    /// Total distance the workout asks for, if it has a positive one.
    #[must_use]
    pub fn target_distance(&self) -> Option<f64> {
        let meters = match &self.kind {
            WorkoutKind::Distance { target_distance } => *target_distance,
            WorkoutKind::Time { .. } => return None,
            WorkoutKind::Interval { intervals } => intervals
                .iter()
                .map(|block| block.repeat() * block.distance.unwrap_or(0.0))
                .sum(),
        };
        positive(meters)
    }

    /// Total time the workout asks for (work plus rest), if it has a positive one.
    #[must_use]
    pub fn target_time(&self) -> Option<f64> {
        let seconds = match &self.kind {
            WorkoutKind::Time { target_time } => *target_time,
            WorkoutKind::Distance { .. } => return None,
            WorkoutKind::Interval { intervals } => intervals
                .iter()
                .map(|block| {
                    block.repeat() * (block.time.unwrap_or(0.0) + block.rest.unwrap_or(0.0))
                })
                .sum(),
        };
        positive(seconds)
    }
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Built-in workouts.
#[must_use]
pub fn standard_workouts() -> Vec<Workout> {
    vec![
        Workout::distance("workout-2k", "2,000m Time Trial", 2000.0),
        Workout::distance("workout-5k", "5,000m Endurance", 5000.0),
        Workout::distance("workout-10k", "10,000m Endurance", 10_000.0),
        Workout::time("workout-30min", "30 Minute Steady Row", 30.0 * 60.0),
        Workout::intervals(
            "workout-5x500",
            "5 x 500m Intervals",
            vec![Interval {
                distance: Some(500.0),
                time: None,
                rest: Some(60.0),
                repeat: Some(5),
            }],
        ),
        Workout::intervals(
            "workout-4x1k",
            "4 x 1,000m Intervals",
            vec![Interval {
                distance: Some(1000.0),
                time: None,
                rest: Some(120.0),
                repeat: Some(4),
            }],
        ),
    ]
}

/// Look up a built-in workout by id.
#[must_use]
pub fn find_standard(id: &str) -> Option<Workout> {
    standard_workouts().into_iter().find(|w| w.id == id)
}
