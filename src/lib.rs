//! # Rowing DAQ Core Library
//!
//! Live telemetry acquisition for rowing ergometers. The library decodes the
//! Fitness Machine "Indoor Rowing Data" notifications, keeps a sticky
//! per-field snapshot of the latest values, records a bounded session history
//! and derives session-level figures (pace, power, targets) on demand.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: Wire format of rowing data frames. `decode` turns raw
//!   bytes into sparse `DecodedFields`, tolerating truncated frames.
//! - **`metrics`**: The sticky `MetricsSnapshot`, the pace to power model,
//!   workout targets and the `DerivedMetrics` aggregator.
//! - **`session`**: `SessionRecorder` with its baseline, time source and FIFO
//!   sample buffer, plus `SessionSummary` for the logbook.
//! - **`hardware`**: Capability traits a transport implements, the mock
//!   transports and the synthetic demo source.
//! - **`connection`**: `ConnectionManager`, the state machine that keeps the
//!   live link and the demo mutually exclusive.
//! - **`monitor`**: `Monitor`, the single-consumer event loop tying it together.
//! - **`config`**, **`logging`**, **`error`**: Ambient infrastructure.
//! - **`format`**: Human-readable rendering for the command line.

pub mod config;
pub mod connection;
pub mod error;
pub mod format;
pub mod hardware;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod protocol;
pub mod session;

pub use connection::{ConnectionManager, ConnectionState};
pub use error::{AppResult, RowError};
pub use monitor::{Monitor, MonitorUpdate};
