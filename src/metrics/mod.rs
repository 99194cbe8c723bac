//! Live metrics: the sticky snapshot, workout targets and derived figures.

pub mod aggregator;
pub mod power;
pub mod snapshot;
pub mod workout;

pub use aggregator::DerivedMetrics;
pub use power::PowerModel;
pub use snapshot::MetricsSnapshot;
pub use workout::{standard_workouts, Workout, WorkoutKind};
