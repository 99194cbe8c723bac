//! Acquisition source state machine.
//!
//! Exactly one source feeds the pipeline at a time: a live link to the
//! ergometer or the demo generator. [`ConnectionManager`] owns that choice as
//! a single tagged [`ConnectionState`] and enforces the transition table:
//!
//! ```text
//! Disconnected ──connect()──> Connecting ──handshake ok──> Connected
//!      ▲  ▲                        │                           │
//!      │  └──────── failure ───────┘                           │
//!      │  └────────────── link lost / disconnect() ────────────┘
//!      │
//!      └──stop_demo()/disconnect()── Demo <──start_demo()── (any state)
//! ```
//!
//! Switching sources always releases the previous one first. Every source
//! reports through a [`FrameSink`] bound to a generation number; each switch
//! bumps the generation, so whatever a released source still manages to send
//! is discarded instead of reaching the snapshot.

use crate::config::Config;
use crate::error::{AppResult, RowError};
use crate::hardware::capabilities::{FrameSink, RowerLink, RowerTransport};
use crate::hardware::demo::{DemoGenerator, DemoSource, DEMO_PERIOD};
use crate::metrics::PowerModel;
use crate::protocol::{DecodedFields, RawFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

/// Message recorded when a transport fails without saying why.
pub const DEFAULT_CONNECT_ERROR: &str = "Unable to connect to the rowing machine.";

/// Message recorded when the host has no wireless stack.
pub const CAPABILITY_UNAVAILABLE: &str = "Bluetooth is not available on this host.";

/// Which acquisition source is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No source.
    #[default]
    Disconnected,
    /// Live connect attempt in flight.
    Connecting,
    /// Live link subscribed to rowing data.
    Connected,
    /// Synthetic data.
    Demo,
}

impl ConnectionState {
    /// Short status label for display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Demo => "Demo",
        }
    }

    /// Whether frames from a live link are expected.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tuning for the manager, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Bound of the source event queue.
    pub event_capacity: usize,
    /// Give up on a connect attempt after this long.
    pub connect_timeout: Duration,
    /// Demo tick period.
    pub demo_period: Duration,
    /// Power model the demo derives watts with.
    pub power: PowerModel,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            event_capacity: 64,
            connect_timeout: Duration::from_secs(15),
            demo_period: DEMO_PERIOD,
            power: PowerModel::default(),
        }
    }
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        Self {
            event_capacity: config.link.event_capacity,
            connect_timeout: Duration::from_millis(config.link.connect_timeout_ms),
            demo_period: Duration::from_millis(config.demo.period_ms),
            power: PowerModel::new(config.power.watts_constant),
        }
    }
}

/// Event reported by a source, tagged with the generation it belongs to.
#[derive(Debug)]
pub struct SourceEvent {
    pub(crate) generation: u64,
    pub(crate) kind: SourceEventKind,
}

pub(crate) enum SourceEventKind {
    Frame(RawFrame),
    Synthetic(DecodedFields),
    LinkLost(String),
    Connected(Box<dyn RowerLink>),
    ConnectFailed(String),
}

impl fmt::Debug for SourceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(frame) => f.debug_tuple("Frame").field(&frame.len()).finish(),
            Self::Synthetic(fields) => f.debug_tuple("Synthetic").field(fields).finish(),
            Self::LinkLost(reason) => f.debug_tuple("LinkLost").field(reason).finish(),
            Self::Connected(link) => f.debug_tuple("Connected").field(&link.device_name()).finish(),
            Self::ConnectFailed(message) => f.debug_tuple("ConnectFailed").field(message).finish(),
        }
    }
}

/// What the active source produced, after filtering.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquired {
    /// Raw frame from the live link, still to be decoded.
    Frame(RawFrame),
    /// Already decoded record from the demo.
    Synthetic(DecodedFields),
    /// The state machine moved on its own (handshake finished, failed, link lost).
    StateChanged(ConnectionState),
}

/// Owns the active source and the event queue all sources report into.
pub struct ConnectionManager {
    transport: Arc<dyn RowerTransport>,
    settings: ConnectionSettings,
    state: ConnectionState,
    last_error: Option<String>,
    generation: u64,
    link: Option<Box<dyn RowerLink>>,
    demo: Option<DemoSource>,
    cancel_connect: Option<oneshot::Sender<()>>,
    tx: mpsc::Sender<SourceEvent>,
    rx: mpsc::Receiver<SourceEvent>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transport", &self.transport.name())
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .field("generation", &self.generation)
            .field("has_link", &self.link.is_some())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Manager in the Disconnected state.
    #[must_use]
    pub fn new(transport: Arc<dyn RowerTransport>, settings: ConnectionSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.event_capacity.max(1));
        Self {
            transport,
            settings,
            state: ConnectionState::Disconnected,
            last_error: None,
            generation: 0,
            link: None,
            demo: None,
            cancel_connect: None,
            tx,
            rx,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Message from the last failed attempt, kept until the next user action.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Name of the connected device, if any.
    #[must_use]
    pub fn device_name(&self) -> Option<String> {
        self.link.as_ref().map(|link| link.device_name())
    }

    /// Current source generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a live connect attempt.
    ///
    /// Returns immediately once the attempt is running; its outcome arrives
    /// later as [`Acquired::StateChanged`]. Fails synchronously only when the
    /// host has no wireless stack, in which case the current source is left
    /// alone.
    pub async fn connect(&mut self) -> AppResult<()> {
        self.last_error = None;

        if !self.transport.is_available() {
            let err = RowError::CapabilityUnavailable(CAPABILITY_UNAVAILABLE.to_string());
            tracing::warn!(transport = self.transport.name(), error = %err, "Cannot connect");
            self.last_error = Some(err.to_string());
            return Err(err);
        }

        self.release_sources().await;
        self.set_state(ConnectionState::Connecting);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.cancel_connect = Some(cancel_tx);
        let sink = self.sink();
        let transport = Arc::clone(&self.transport);
        let timeout = self.settings.connect_timeout;
        tokio::spawn(run_connect_attempt(transport, sink, timeout, cancel_rx));
        Ok(())
    }

    /// Switch to synthetic data. A no-op while the demo is already running.
    pub async fn start_demo(&mut self) {
        if self.state == ConnectionState::Demo {
            return;
        }
        self.last_error = None;
        self.release_sources().await;

        let generator = DemoGenerator::new(self.settings.demo_period, self.settings.power);
        self.demo = Some(DemoSource::spawn(generator, self.sink()));
        self.set_state(ConnectionState::Demo);
    }

    /// Stop the demo. A no-op unless the demo is running.
    pub async fn stop_demo(&mut self) {
        if self.state != ConnectionState::Demo {
            return;
        }
        self.release_sources().await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Release whatever source is active. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        self.last_error = None;
        self.release_sources().await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Wait for the next event from the active source.
    ///
    /// Events from released sources are consumed silently. Returns `None`
    /// only if the queue is closed, which cannot happen while the manager is
    /// alive.
    pub async fn next_event(&mut self) -> Option<Acquired> {
        loop {
            let event = self.rx.recv().await?;
            if let Some(acquired) = self.handle(event).await {
                return Some(acquired);
            }
        }
    }

    /// Next already queued event, without waiting.
    pub async fn try_next_event(&mut self) -> Option<Acquired> {
        while let Ok(event) = self.rx.try_recv() {
            if let Some(acquired) = self.handle(event).await {
                return Some(acquired);
            }
        }
        None
    }

    fn sink(&self) -> FrameSink {
        FrameSink::new(self.generation, self.tx.clone())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::info!(from = %self.state, to = %state, "Connection state changed");
            self.state = state;
        }
    }

    /// Release every source and invalidate everything they already queued.
    async fn release_sources(&mut self) {
        self.generation += 1;

        if let Some(cancel) = self.cancel_connect.take() {
            tracing::debug!("Abandoning pending connect attempt");
            let _ = cancel.send(());
        }
        if let Some(mut demo) = self.demo.take() {
            demo.stop();
        }
        if let Some(mut link) = self.link.take() {
            release_link(link.as_mut()).await;
        }

        while let Ok(event) = self.rx.try_recv() {
            self.discard(event).await;
        }
    }

    async fn discard(&mut self, event: SourceEvent) {
        tracing::trace!(generation = event.generation, current = self.generation, "Discarding stale event");
        if let SourceEventKind::Connected(mut link) = event.kind {
            tracing::debug!(device = %link.device_name(), "Closing link from abandoned attempt");
            release_link(link.as_mut()).await;
        }
    }

    async fn handle(&mut self, event: SourceEvent) -> Option<Acquired> {
        if event.generation != self.generation {
            self.discard(event).await;
            return None;
        }

        match event.kind {
            SourceEventKind::Frame(frame) => {
                if self.state.is_live() {
                    tracing::trace!(bytes = frame.len(), "Frame received");
                    Some(Acquired::Frame(frame))
                } else {
                    None
                }
            }
            SourceEventKind::Synthetic(fields) => {
                (self.state == ConnectionState::Demo).then_some(Acquired::Synthetic(fields))
            }
            SourceEventKind::Connected(mut link) => {
                self.cancel_connect = None;
                if self.state != ConnectionState::Connecting {
                    release_link(link.as_mut()).await;
                    return None;
                }
                tracing::info!(device = %link.device_name(), "Rowing machine connected");
                self.link = Some(link);
                self.set_state(ConnectionState::Connected);
                Some(Acquired::StateChanged(ConnectionState::Connected))
            }
            SourceEventKind::ConnectFailed(message) => {
                self.cancel_connect = None;
                let err = RowError::ConnectFailure(message);
                tracing::warn!(error = %err, "Connect attempt failed");
                self.last_error = Some(err.to_string());
                self.generation += 1;
                self.set_state(ConnectionState::Disconnected);
                Some(Acquired::StateChanged(ConnectionState::Disconnected))
            }
            SourceEventKind::LinkLost(reason) => {
                if !self.state.is_live() {
                    return None;
                }
                if self.state == ConnectionState::Connecting {
                    let err = RowError::ConnectFailure(failure_text(reason));
                    tracing::warn!(error = %err, "Link lost during handshake");
                    self.last_error = Some(err.to_string());
                } else {
                    tracing::warn!(%reason, "Link to rowing machine lost");
                }
                self.release_sources().await;
                self.set_state(ConnectionState::Disconnected);
                Some(Acquired::StateChanged(ConnectionState::Disconnected))
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel_connect.take() {
            let _ = cancel.send(());
        }
    }
}

async fn run_connect_attempt(
    transport: Arc<dyn RowerTransport>,
    sink: FrameSink,
    timeout: Duration,
    mut cancel: oneshot::Receiver<()>,
) {
    tracing::info!(transport = transport.name(), generation = sink.generation(), "Connecting");
    let deadline = Instant::now() + timeout;

    let opened = tokio::select! {
        _ = &mut cancel => {
            tracing::debug!(generation = sink.generation(), "Connect attempt cancelled");
            return;
        }
        result = time::timeout_at(deadline, transport.connect(sink.clone())) => result,
    };
    let mut link = match opened {
        Ok(Ok(link)) => link,
        Ok(Err(err)) => return report(&sink, SourceEventKind::ConnectFailed(failure_message(&err))).await,
        Err(_) => return report(&sink, SourceEventKind::ConnectFailed(timed_out(timeout))).await,
    };

    // From here on the link exists and must be released on every way out.
    let subscribed = tokio::select! {
        _ = &mut cancel => None,
        result = time::timeout_at(deadline, link.start_notifications()) => Some(result),
    };
    let outcome = match subscribed {
        Some(Ok(Ok(()))) => SourceEventKind::Connected(link),
        Some(Ok(Err(err))) => {
            release_link(link.as_mut()).await;
            SourceEventKind::ConnectFailed(failure_message(&err))
        }
        Some(Err(_)) => {
            release_link(link.as_mut()).await;
            SourceEventKind::ConnectFailed(timed_out(timeout))
        }
        None => {
            tracing::debug!(generation = sink.generation(), "Connect attempt cancelled while subscribing");
            release_link(link.as_mut()).await;
            return;
        }
    };
    report(&sink, outcome).await;
}

async fn report(sink: &FrameSink, outcome: SourceEventKind) {
    if !sink.send(outcome).await {
        tracing::debug!("Connection manager gone before the attempt finished");
    }
}

fn timed_out(timeout: Duration) -> String {
    format!("Timed out after {} s waiting for the rowing machine.", timeout.as_secs())
}

fn failure_message(err: &anyhow::Error) -> String {
    failure_text(err.to_string())
}

fn failure_text(message: String) -> String {
    if message.trim().is_empty() {
        DEFAULT_CONNECT_ERROR.to_string()
    } else {
        message
    }
}

/// Best-effort teardown: failures are logged and swallowed.
async fn release_link(link: &mut dyn RowerLink) {
    let device = link.device_name();
    if let Err(err) = link.stop_notifications().await {
        let err = RowError::Teardown(format!("stop notifications on {device}: {err}"));
        tracing::warn!(error = %err, "Ignoring teardown failure");
    }
    if let Err(err) = link.close().await {
        let err = RowError::Teardown(format!("close {device}: {err}"));
        tracing::warn!(error = %err, "Ignoring teardown failure");
    }
    tracing::debug!(%device, "Link released");
}
