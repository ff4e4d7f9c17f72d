//! Output surface of the driver

pub mod formatting;

pub use formatting::{FormatError, MessageFormatter, OutputFormat};
