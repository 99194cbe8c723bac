//! Transport capabilities for rowing ergometers.
//!
//! The core never talks to a wireless stack directly. A transport implements
//! [`RowerTransport`] to open a link, and the link implements [`RowerLink`] to
//! start and stop notifications and to close itself. Frames and link-loss
//! reports flow back through the [`FrameSink`] the transport was handed.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! Teardown methods must tolerate being called on an already released
//! resource. Callers treat any error they return as best-effort noise.
//!
//! # Example
//!
//! ```rust,ignore
//! struct SerialRower { port: String }
//!
//! #[async_trait]
//! impl RowerTransport for SerialRower {
//!     fn name(&self) -> &str { "serial" }
//!     fn is_available(&self) -> bool { true }
//!     async fn connect(&self, sink: FrameSink) -> Result<Box<dyn RowerLink>> {
//!         let port = open_port(&self.port).await?;
//!         Ok(Box::new(SerialLink::new(port, sink)))
//!     }
//! }
//! ```

use crate::connection::{SourceEvent, SourceEventKind};
use crate::protocol::{DecodedFields, RawFrame};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Capability: open a link to an ergometer.
#[async_trait]
pub trait RowerTransport: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &str;

    /// Whether the host exposes the wireless API this transport needs.
    fn is_available(&self) -> bool;

    /// Find the device and complete the handshake.
    ///
    /// `sink` must be used to report frames once notifications start, and to
    /// report the device disappearing at any time after this returns.
    async fn connect(&self, sink: FrameSink) -> Result<Box<dyn RowerLink>>;
}

/// Capability: an established link with a rowing-data subscription.
#[async_trait]
pub trait RowerLink: Send {
    /// Human readable device name.
    fn device_name(&self) -> String;

    /// Subscribe to rowing-data notifications.
    async fn start_notifications(&mut self) -> Result<()>;

    /// Unsubscribe. A no-op when not subscribed.
    async fn stop_notifications(&mut self) -> Result<()>;

    /// Close the link. A no-op when already closed.
    async fn close(&mut self) -> Result<()>;
}

/// Handle through which a source reports into the acquisition loop.
///
/// Every sink is bound to the source generation it was created for; the loop
/// ignores anything a released source still manages to send.
#[derive(Debug, Clone)]
pub struct FrameSink {
    generation: u64,
    tx: mpsc::Sender<SourceEvent>,
}

impl FrameSink {
    pub(crate) fn new(generation: u64, tx: mpsc::Sender<SourceEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation this sink reports for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver one raw frame without waiting.
    ///
    /// Returns `false` once the acquisition loop is gone. A full queue drops
    /// the frame with a warning; the next frame carries fresh values anyway.
    pub fn deliver(&self, frame: RawFrame) -> bool {
        match self.tx.try_send(self.event(SourceEventKind::Frame(frame))) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(generation = self.generation, "Event queue full, dropping frame");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Deliver one synthetic record, waiting for queue space.
    pub async fn deliver_synthetic(&self, fields: DecodedFields) -> bool {
        self.tx
            .send(self.event(SourceEventKind::Synthetic(fields)))
            .await
            .is_ok()
    }

    /// Report that the device went away.
    pub async fn link_lost(&self, reason: impl Into<String>) -> bool {
        self.tx
            .send(self.event(SourceEventKind::LinkLost(reason.into())))
            .await
            .is_ok()
    }

    pub(crate) async fn send(&self, kind: SourceEventKind) -> bool {
        self.tx.send(self.event(kind)).await.is_ok()
    }

    fn event(&self, kind: SourceEventKind) -> SourceEvent {
        SourceEvent {
            generation: self.generation,
            kind,
        }
    }
}
