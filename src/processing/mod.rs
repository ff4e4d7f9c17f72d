//! Frame decoding

pub mod parser;

pub use parser::{encode_frame, FrameParser, ParseError};
