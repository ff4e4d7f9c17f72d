//! Device protocol constants and driver defaults

use std::time::Duration;

/// Serial speed of the UWB tag module
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout on the serial device
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Every measurement line emitted by the tag starts with this prefix
pub const FRAME_PREFIX: &str = "mi,";

/// Fields in a complete measurement line, prefix included
pub const MIN_FRAME_FIELDS: usize = 23;

/// Longest line kept while waiting for its newline (bytes)
pub const MAX_LINE_LENGTH: usize = 1024;

/// Anchor slots reported per line (A0..A3)
pub const ANCHOR_SLOTS: usize = 4;

/// Anchor z coordinate marking a slot with no deployed anchor
pub const UNDEPLOYED_ANCHOR_Z: f64 = -77.77;

/// Default accepted range window (meters)
pub const DEFAULT_MIN_DISTANCE: f64 = 0.0;
pub const DEFAULT_MAX_DISTANCE: f64 = 149.0;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);
