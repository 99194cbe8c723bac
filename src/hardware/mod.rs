//! Acquisition Sources
//!
//! Capability traits for ergometer transports, plus the built-in sources:
//! in-memory mocks and the synthetic demo.

pub mod capabilities;
pub mod demo;
pub mod mock;

pub use capabilities::{FrameSink, RowerLink, RowerTransport};
pub use demo::{DemoGenerator, DemoSource};
pub use mock::{MockRower, UnavailableTransport};
