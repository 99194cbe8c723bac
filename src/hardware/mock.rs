//! Mock Transports
//!
//! Simulated ergometer links for testing without a wireless stack.
//! All delays use `tokio::time::sleep`, so paused-time tests run instantly.
//!
//! # Available Mocks
//!
//! - `MockRower` - In-memory rower; frames are pushed by the test with `emit`
//! - `UnavailableTransport` - Host without wireless support

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{sleep, Duration};

use crate::connection::CAPABILITY_UNAVAILABLE;
use crate::hardware::capabilities::{FrameSink, RowerLink, RowerTransport};
use crate::protocol::{DecodedFields, FrameBuilder, RawFrame};

/// Device name reported by [`MockRower`] links.
pub const MOCK_DEVICE_NAME: &str = "Mock Rower";

#[derive(Debug, Clone, Default)]
struct Behavior {
    unavailable: bool,
    failure: Option<String>,
    connect_delay: Duration,
    teardown_fails: bool,
    notification_fails: bool,
    notification_delay: Duration,
    handshake_drop: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    sink: Option<FrameSink>,
    notifying: bool,
    connects: u32,
    stops: u32,
    closes: u32,
}

// =============================================================================
// MockRower - Simulated Ergometer
// =============================================================================

/// In-memory ergometer.
///
/// Clones share state, so a test can keep one handle to push frames and read
/// counters while the connection manager owns another.
///
/// # Example
///
/// ```rust,ignore
/// let rower = MockRower::new();
/// let mut manager = ConnectionManager::new(Arc::new(rower.clone()), settings);
/// manager.connect().await?;
/// rower.emit(FrameBuilder::new().field(Metric::StrokeRate, 24.0).build());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockRower {
    behavior: Behavior,
    state: Arc<Mutex<MockState>>,
}

impl MockRower {
    /// Rower that connects at once and never fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rower on a host without wireless support.
    #[must_use]
    pub fn unavailable() -> Self {
        let mut rower = Self::new();
        rower.behavior.unavailable = true;
        rower
    }

    /// Rower whose handshake always fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let mut rower = Self::new();
        rower.behavior.failure = Some(message.into());
        rower
    }

    /// Delay every handshake by `delay`.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.behavior.connect_delay = delay;
        self
    }

    /// Make unsubscribe and close report errors.
    #[must_use]
    pub fn with_teardown_failure(mut self) -> Self {
        self.behavior.teardown_fails = true;
        self
    }

    /// Make subscribing to notifications fail.
    #[must_use]
    pub fn with_notification_failure(mut self) -> Self {
        self.behavior.notification_fails = true;
        self
    }

    /// Delay every subscribe by `delay`.
    #[must_use]
    pub fn with_notification_delay(mut self, delay: Duration) -> Self {
        self.behavior.notification_delay = delay;
        self
    }

    /// Report the device gone with `reason` in the middle of every handshake.
    #[must_use]
    pub fn with_handshake_drop(mut self, reason: impl Into<String>) -> Self {
        self.behavior.handshake_drop = Some(reason.into());
        self
    }

    /// Push one frame as a notification.
    ///
    /// Returns `false` when no subscribed link exists or the receiver is gone.
    pub fn emit(&self, frame: RawFrame) -> bool {
        let state = self.lock();
        match (&state.sink, state.notifying) {
            (Some(sink), true) => sink.deliver(frame),
            _ => false,
        }
    }

    /// Encode `fields` and push them as a notification.
    pub fn emit_fields(&self, fields: &DecodedFields) -> bool {
        self.emit(FrameBuilder::from_fields(fields).build())
    }

    /// Simulate the device disappearing.
    pub async fn drop_link(&self, reason: &str) -> bool {
        let sink = self.lock().sink.clone();
        match sink {
            Some(sink) => sink.link_lost(reason).await,
            None => false,
        }
    }

    /// Handshakes started so far.
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.lock().connects
    }

    /// Unsubscribe calls so far.
    #[must_use]
    pub fn stop_count(&self) -> u32 {
        self.lock().stops
    }

    /// Close calls so far.
    #[must_use]
    pub fn close_count(&self) -> u32 {
        self.lock().closes
    }

    /// Whether a link is currently subscribed.
    #[must_use]
    pub fn is_notifying(&self) -> bool {
        self.lock().notifying
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RowerTransport for MockRower {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_available(&self) -> bool {
        !self.behavior.unavailable
    }

    async fn connect(&self, sink: FrameSink) -> Result<Box<dyn RowerLink>> {
        lock(&self.state).connects += 1;

        if let Some(reason) = &self.behavior.handshake_drop {
            sink.link_lost(reason.clone()).await;
        }
        if !self.behavior.connect_delay.is_zero() {
            sleep(self.behavior.connect_delay).await;
        }
        if let Some(message) = &self.behavior.failure {
            return Err(anyhow::Error::msg(message.clone()));
        }

        lock(&self.state).sink = Some(sink);
        Ok(Box::new(MockLink {
            state: Arc::clone(&self.state),
            behavior: self.behavior.clone(),
        }))
    }
}

/// Link handed out by [`MockRower`].
#[derive(Debug)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
    behavior: Behavior,
}

#[async_trait]
impl RowerLink for MockLink {
    fn device_name(&self) -> String {
        MOCK_DEVICE_NAME.to_string()
    }

    async fn start_notifications(&mut self) -> Result<()> {
        if !self.behavior.notification_delay.is_zero() {
            sleep(self.behavior.notification_delay).await;
        }
        if self.behavior.notification_fails {
            return Err(anyhow!("Rowing data characteristic not found"));
        }
        lock(&self.state).notifying = true;
        Ok(())
    }

    async fn stop_notifications(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.stops += 1;
        state.notifying = false;
        if self.behavior.teardown_fails {
            return Err(anyhow!("GATT operation failed"));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.closes += 1;
        state.notifying = false;
        state.sink = None;
        if self.behavior.teardown_fails {
            return Err(anyhow!("GATT server already disconnected"));
        }
        Ok(())
    }
}

// =============================================================================
// UnavailableTransport - No Wireless Stack
// =============================================================================

/// Transport for hosts without a wireless stack. Never connects.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableTransport;

#[async_trait]
impl RowerTransport for UnavailableTransport {
    fn name(&self) -> &str {
        "bluetooth"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn connect(&self, _sink: FrameSink) -> Result<Box<dyn RowerLink>> {
        Err(anyhow!(CAPABILITY_UNAVAILABLE))
    }
}
