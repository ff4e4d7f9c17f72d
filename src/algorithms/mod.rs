//! Positioning algorithms

pub mod trilateration;
pub mod gdop;

pub use trilateration::{trilaterate, PositionFix, SolutionMode, Trilateration, TrilaterationError};
pub use gdop::{geometric_dilution, GeometryQuality};
