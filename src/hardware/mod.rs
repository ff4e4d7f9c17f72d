//! Hardware abstraction for the UWB tag module
//!
//! The tag streams text lines over a serial link. Sources hand complete
//! measurement lines to the driver and hide line assembly, reconnection and
//! noise filtering.

pub mod source;
pub mod serial;
pub mod mock;
pub mod error;

pub use source::{LineSource, SourceStatus, UwbSource};
pub use serial::SerialUwb;
pub use mock::{MockUwb, TagSimulator};
pub use error::{CommError, CommResult, RecoveryStrategy};
