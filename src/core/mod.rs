//! Core types and constants for the UWB sensor driver

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
