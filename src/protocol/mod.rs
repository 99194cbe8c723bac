//! Wire protocol for rowing ergometer telemetry.
//!
//! The ergometer publishes one binary frame per update over its rowing-data
//! characteristic. [`rowing_data`] turns those frames into sparse
//! [`DecodedFields`] and can lay frames out again for mock transports.

pub mod rowing_data;

pub use rowing_data::{decode, DecodedFields, FrameBuilder, Metric, RawFrame};

/// Fitness machine service advertised by the ergometer.
pub const FITNESS_MACHINE_SERVICE_UUID: u16 = 0x1826;

/// Characteristic carrying rowing data notifications.
pub const INDOOR_ROWING_DATA_UUID: u16 = 0x2AD1;

/// Control point characteristic (unused by the core, kept for transports).
pub const FITNESS_MACHINE_CONTROL_POINT_UUID: u16 = 0x2AD9;
