//! UWB Sensor
//!
//! Driver for an Ultra-Wideband tag module on a serial link. Measurement lines
//! are decoded, the tag is trilaterated against configured anchors, and each
//! reading is published as a `UWBMsg` record.

pub mod core;
pub mod interface;
pub mod hardware;
pub mod processing;
pub mod algorithms;
pub mod driver;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use core::{AnchorSlot, Point3, UwbReading};
pub use interface::{Header, Time, UwbMsg, INTERFACE_DEPENDENCIES};
pub use hardware::{CommError, CommResult, MockUwb, SerialUwb, TagSimulator, UwbSource};
pub use processing::{FrameParser, ParseError};
pub use algorithms::{trilaterate, PositionFix, Trilateration, TrilaterationError};
pub use driver::{DriverHandle, DriverStats, MessageQueue, UwbDriver};
pub use utils::config::{ConfigError, ConfigurationManager, DriverConfig};
pub use api::{MessageFormatter, OutputFormat};
