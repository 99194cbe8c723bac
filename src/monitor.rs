//! The acquisition pipeline.
//!
//! [`Monitor`] is the single consumer of the source event queue. Each call to
//! [`Monitor::next_update`] takes exactly one event and carries it through
//! decode, snapshot merge and sample recording before returning, so the
//! snapshot and the sample buffer are only ever touched from here and always
//! in arrival order. Derived metrics are computed on demand from that state.

use crate::config::Config;
use crate::connection::{Acquired, ConnectionManager, ConnectionSettings, ConnectionState};
use crate::error::AppResult;
use crate::hardware::capabilities::RowerTransport;
use crate::metrics::{DerivedMetrics, MetricsSnapshot, PowerModel, Workout};
use crate::protocol::{decode, DecodedFields};
use crate::session::{Sample, SessionRecorder, SessionSummary, SUMMARY_POINTS};
use std::sync::Arc;

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorUpdate {
    /// A frame or synthetic record was merged into the snapshot.
    Metrics {
        /// What this update carried.
        fields: DecodedFields,
        /// Sample appended for it, if a session is recording.
        sample: Option<Sample>,
    },
    /// The connection moved to a new state.
    State(ConnectionState),
}

/// Live telemetry for one ergometer.
#[derive(Debug)]
pub struct Monitor {
    connection: ConnectionManager,
    snapshot: MetricsSnapshot,
    recorder: SessionRecorder,
    workout: Option<Workout>,
    power: PowerModel,
    summary_points: usize,
}

impl Monitor {
    /// Monitor over `transport` configured from `config`.
    #[must_use]
    pub fn new(transport: Arc<dyn RowerTransport>, config: &Config) -> Self {
        Self {
            connection: ConnectionManager::new(transport, ConnectionSettings::from(config)),
            snapshot: MetricsSnapshot::new(),
            recorder: SessionRecorder::with_capacity(config.session.max_samples),
            workout: None,
            power: PowerModel::new(config.power.watts_constant),
            summary_points: config.session.summary_points,
        }
    }

    /// Monitor with default settings.
    #[must_use]
    pub fn with_defaults(transport: Arc<dyn RowerTransport>) -> Self {
        Self {
            connection: ConnectionManager::new(transport, ConnectionSettings::default()),
            snapshot: MetricsSnapshot::new(),
            recorder: SessionRecorder::new(),
            workout: None,
            power: PowerModel::default(),
            summary_points: SUMMARY_POINTS,
        }
    }

    // ---- sources -----------------------------------------------------------

    /// Start connecting to the ergometer. See [`ConnectionManager::connect`].
    pub async fn connect(&mut self) -> AppResult<()> {
        self.connection.connect().await
    }

    /// Switch to the demo source.
    pub async fn start_demo(&mut self) {
        self.connection.start_demo().await;
    }

    /// Stop the demo source.
    pub async fn stop_demo(&mut self) {
        self.connection.stop_demo().await;
    }

    /// Release any source and forget the live snapshot.
    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
        self.snapshot.clear();
    }

    // ---- session -----------------------------------------------------------

    /// Start recording with the current snapshot as baseline.
    pub fn start_session(&mut self) {
        self.recorder.start(&self.snapshot);
    }

    /// Stop recording; samples are kept.
    pub fn stop_session(&mut self) {
        self.recorder.stop();
    }

    /// Clear samples without changing the recording flag.
    pub fn reset_session(&mut self) {
        self.recorder.reset();
    }

    /// Clear the snapshot and the samples.
    pub fn reset(&mut self) {
        self.snapshot.clear();
        self.recorder.reset();
    }

    /// Select the workout targets are computed against.
    pub fn set_workout(&mut self, workout: Option<Workout>) {
        if let Some(workout) = &workout {
            tracing::info!(workout = %workout.id, "Workout selected");
        }
        self.workout = workout;
    }

    // ---- event loop --------------------------------------------------------

    /// Wait for and process exactly one event.
    pub async fn next_update(&mut self) -> Option<MonitorUpdate> {
        let acquired = self.connection.next_event().await?;
        Some(self.apply(acquired))
    }

    /// Process every event that is already queued.
    pub async fn poll(&mut self) -> Vec<MonitorUpdate> {
        let mut updates = Vec::new();
        while let Some(acquired) = self.connection.try_next_event().await {
            updates.push(self.apply(acquired));
        }
        updates
    }

    fn apply(&mut self, acquired: Acquired) -> MonitorUpdate {
        match acquired {
            Acquired::Frame(frame) => self.ingest(decode(&frame)),
            Acquired::Synthetic(fields) => self.ingest(fields),
            Acquired::StateChanged(state) => MonitorUpdate::State(state),
        }
    }

    fn ingest(&mut self, fields: DecodedFields) -> MonitorUpdate {
        self.snapshot.merge(&fields);
        let sample = self.recorder.record(&fields, &self.snapshot);
        tracing::trace!(fields = fields.len(), recorded = sample.is_some(), "Update processed");
        MonitorUpdate::Metrics { fields, sample }
    }

    // ---- views -------------------------------------------------------------

    /// Figures derived from the current state.
    #[must_use]
    pub fn derived(&self) -> DerivedMetrics {
        DerivedMetrics::compute(&self.snapshot, &self.recorder, self.workout.as_ref(), &self.power)
    }

    /// Summary of the current session, if anything was recorded.
    #[must_use]
    pub fn summary(&self) -> Option<SessionSummary> {
        SessionSummary::build(
            &self.recorder,
            &self.snapshot,
            &self.derived(),
            self.workout.as_ref(),
            self.summary_points,
        )
    }

    /// Sticky per-field snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &MetricsSnapshot {
        &self.snapshot
    }

    /// Session recorder.
    #[must_use]
    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    /// Session-relative samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<Sample> {
        self.recorder.session_samples()
    }

    /// Selected workout.
    #[must_use]
    pub fn workout(&self) -> Option<&Workout> {
        self.workout.as_ref()
    }

    /// Connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Last connection error.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.connection.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockRower;
    use crate::metrics::workout::find_standard;
    use crate::protocol::{FrameBuilder, Metric};

    async fn connected() -> (MockRower, Monitor) {
        let rower = MockRower::new();
        let mut monitor = Monitor::with_defaults(Arc::new(rower.clone()));
        monitor.connect().await.unwrap();
        assert_eq!(
            monitor.next_update().await,
            Some(MonitorUpdate::State(ConnectionState::Connected))
        );
        (rower, monitor)
    }

    #[tokio::test]
    async fn fields_stick_across_sparse_frames() {
        let (rower, mut monitor) = connected().await;

        rower.emit(
            FrameBuilder::new()
                .field(Metric::StrokeRate, 22.0)
                .field(Metric::StrokeCount, 5.0)
                .field(Metric::HeartRate, 140.0)
                .build(),
        );
        rower.emit(
            FrameBuilder::new()
                .field(Metric::StrokeRate, 24.0)
                .field(Metric::StrokeCount, 6.0)
                .build(),
        );
        monitor.next_update().await;
        monitor.next_update().await;

        assert_eq!(monitor.snapshot().get(Metric::StrokeRate), Some(24.0));
        assert_eq!(monitor.snapshot().get(Metric::HeartRate), Some(140.0));
    }

    #[tokio::test]
    async fn session_distance_is_relative_to_start() {
        let (rower, mut monitor) = connected().await;
        let at = |distance: f64, elapsed: f64| {
            FrameBuilder::new()
                .field(Metric::TotalDistance, distance)
                .field(Metric::ElapsedTime, elapsed)
                .build()
        };

        rower.emit(at(1000.0, 200.0));
        monitor.next_update().await;
        monitor.start_session();

        rower.emit(at(1500.0, 320.0));
        match monitor.next_update().await {
            Some(MonitorUpdate::Metrics { sample: Some(sample), .. }) => {
                assert_eq!(sample.distance, Some(1500.0));
            }
            other => panic!("unexpected update {other:?}"),
        }

        assert_eq!(monitor.derived().session_distance, Some(500.0));
        assert_eq!(monitor.samples()[0].distance, Some(500.0));
    }

    #[tokio::test]
    async fn workout_targets_flow_into_derived() {
        let (rower, mut monitor) = connected().await;
        monitor.set_workout(find_standard("workout-2k"));
        monitor.start_session();

        rower.emit(FrameBuilder::new().field(Metric::TotalDistance, 1800.0).build());
        monitor.next_update().await;
        assert_eq!(monitor.derived().distance_to_go, Some(200.0));
    }

    #[tokio::test]
    async fn summary_only_after_recording() {
        let (rower, mut monitor) = connected().await;
        rower.emit(FrameBuilder::new().field(Metric::ElapsedTime, 1.0).build());
        monitor.next_update().await;
        assert!(monitor.summary().is_none());

        monitor.start_session();
        rower.emit(
            FrameBuilder::new()
                .field(Metric::ElapsedTime, 2.0)
                .field(Metric::ResistanceLevel, 6.0)
                .build(),
        );
        monitor.next_update().await;
        monitor.stop_session();

        let summary = monitor.summary().unwrap();
        assert_eq!(summary.samples.len(), 1);
        assert_eq!(summary.resistance_level, Some(6.0));
    }

    #[tokio::test]
    async fn poll_drains_ready_events() {
        let (rower, mut monitor) = connected().await;
        for count in 1..=3 {
            rower.emit(FrameBuilder::new().field(Metric::StrokeCount, f64::from(count)).build());
        }
        let updates = monitor.poll().await;
        assert_eq!(updates.len(), 3);
        assert_eq!(monitor.snapshot().get(Metric::StrokeCount), Some(3.0));
        assert!(monitor.poll().await.is_empty());
    }

    #[tokio::test]
    async fn reset_and_disconnect_clear_state() {
        let (rower, mut monitor) = connected().await;
        monitor.start_session();
        rower.emit(FrameBuilder::new().field(Metric::ElapsedTime, 4.0).build());
        monitor.next_update().await;

        monitor.reset_session();
        assert!(monitor.samples().is_empty());
        assert!(monitor.recorder().is_recording());
        assert!(!monitor.snapshot().is_empty());

        monitor.disconnect().await;
        assert!(monitor.snapshot().is_empty());
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn truncated_frame_still_updates() {
        let (rower, mut monitor) = connected().await;
        // Flags ask for distance and pace; only distance arrives.
        let frame = bytes::Bytes::from_static(&[0x0C, 0x00, 0x30, 0x0A, 0x00, 0xE8, 0x03, 0x00]);
        rower.emit(frame);
        monitor.next_update().await;

        assert_eq!(monitor.snapshot().get(Metric::TotalDistance), Some(1000.0));
        assert_eq!(monitor.snapshot().get(Metric::InstantaneousPace), None);
        assert_eq!(monitor.snapshot().get(Metric::StrokeRate), Some(24.0));
    }
}
