//! Demo source: synthetic rowing telemetry without an ergometer.
//!
//! [`DemoGenerator`] is the pure signal model; [`DemoSource`] drives it from a
//! tokio interval and feeds the records into the same pipeline as real frames.
//!
//! # Signal Model
//!
//! With `t` the elapsed seconds since the demo started:
//! - pace = 125 + 8·sin(t/6) s/500m, average pace = pace + 2·sin(t/8)
//! - stroke rate = 24 + 2·sin(t/4) spm
//! - distance advances by `period · 500 / pace`, strokes by `period · rate / 60`
//! - power is derived from pace with the configured [`PowerModel`]

use super::capabilities::FrameSink;
use crate::metrics::PowerModel;
use crate::protocol::{DecodedFields, Metric};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default tick period.
pub const DEMO_PERIOD: Duration = Duration::from_secs(1);

/// Deterministic synthetic workout.
#[derive(Debug, Clone)]
pub struct DemoGenerator {
    period: Duration,
    power: PowerModel,
    elapsed: f64,
    distance: f64,
    strokes: f64,
}

impl DemoGenerator {
    /// Generator starting from zeroed counters.
    #[must_use]
    pub fn new(period: Duration, power: PowerModel) -> Self {
        Self {
            period,
            power,
            elapsed: 0.0,
            distance: 0.0,
            strokes: 0.0,
        }
    }

    /// Advance one tick and return its record.
    pub fn next_fields(&mut self) -> DecodedFields {
        let dt = self.period.as_secs_f64();
        self.elapsed += dt;
        let t = self.elapsed;

        let pace = 125.0 + (t / 6.0).sin() * 8.0;
        let stroke_rate = 24.0 + (t / 4.0).sin() * 2.0;
        let average_pace = pace + (t / 8.0).sin() * 2.0;

        self.distance += dt * 500.0 / pace;
        self.strokes += dt * stroke_rate / 60.0;

        let mut fields = DecodedFields::new()
            .with(Metric::StrokeRate, stroke_rate)
            .with(Metric::StrokeCount, self.strokes.round())
            .with(Metric::TotalDistance, self.distance)
            .with(Metric::InstantaneousPace, pace)
            .with(Metric::AveragePace, average_pace)
            .with(Metric::ElapsedTime, t);
        if let Some(watts) = self.power.watts_for_pace(pace) {
            fields.set(Metric::InstantaneousPower, watts);
            fields.set(Metric::AveragePower, watts);
        }
        fields
    }
}

/// Running demo timer. Stops on [`stop`](Self::stop) or drop.
#[derive(Debug)]
pub struct DemoSource {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DemoSource {
    /// Spawn the timer; the first record arrives one period after this call.
    #[must_use]
    pub fn spawn(mut generator: DemoGenerator, sink: FrameSink) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let period = generator.period;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(period_ms = period.as_millis() as u64, "Demo source started");
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if !sink.deliver_synthetic(generator.next_fields()).await {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Demo source task finished");
        });

        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Stop future ticks. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
            tracing::info!("Demo source stopped");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether ticks are still scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for DemoSource {
    fn drop(&mut self) {
        self.stop();
    }
}
