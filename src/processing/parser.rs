use std::str::FromStr;

use log::debug;
use thiserror::Error;

use crate::core::{
    UwbReading, ANCHOR_SLOTS, DEFAULT_MAX_DISTANCE, DEFAULT_MIN_DISTANCE, FRAME_PREFIX,
    MIN_FRAME_FIELDS,
};

// Field layout of a measurement line:
// [0] "mi" [1] time [2..=5] A0..A3 [6..=9] reserved
// [10..=12] acc [13..=15] gyro [16..=18] mag [19..=21] pitch roll yaw [22] tag id
const TIME_FIELD: usize = 1;
const DISTANCE_FIELDS: usize = 2;
const RESERVED_FIELDS: usize = 4;
const ACC_FIELDS: usize = 10;
const GYRO_FIELDS: usize = 13;
const MAG_FIELDS: usize = 16;
const ANGLE_FIELDS: usize = 19;
const TAG_FIELD: usize = 22;

/// Placeholder the module sends for an anchor it cannot range
const NULL_DISTANCE: &str = "null";

/// Errors that can occur while decoding a measurement line
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("line does not start with \"mi,\"")]
    MissingPrefix,
    #[error("too few fields: {found} (need {required})")]
    TooFewFields { found: usize, required: usize },
    #[error("field {index} is not a number: {value:?}")]
    InvalidNumber { index: usize, value: String },
}

/// Decodes `mi,` lines into readings and gates ranges to the accepted window
#[derive(Debug, Clone)]
pub struct FrameParser {
    min_distance: f64,
    max_distance: f64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_distance_window(DEFAULT_MIN_DISTANCE, DEFAULT_MAX_DISTANCE)
    }

    /// Ranges outside `[min_distance, max_distance]` are reported as absent
    pub fn with_distance_window(min_distance: f64, max_distance: f64) -> Self {
        Self {
            min_distance,
            max_distance,
        }
    }

    pub fn distance_window(&self) -> (f64, f64) {
        (self.min_distance, self.max_distance)
    }

    /// Parse a measurement line into a reading
    pub fn parse(&self, line: &str) -> Result<UwbReading, ParseError> {
        if !line.starts_with(FRAME_PREFIX) {
            return Err(ParseError::MissingPrefix);
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < MIN_FRAME_FIELDS {
            return Err(ParseError::TooFewFields {
                found: fields.len(),
                required: MIN_FRAME_FIELDS,
            });
        }

        let device_time = parse_number(&fields, TIME_FIELD)?;

        let mut distances = [None; ANCHOR_SLOTS];
        for (slot, distance) in distances.iter_mut().enumerate() {
            let index = DISTANCE_FIELDS + slot;
            if fields[index].trim() == NULL_DISTANCE {
                continue;
            }
            *distance = self.gate_distance(slot, parse_number(&fields, index)?);
        }

        Ok(UwbReading {
            device_time,
            distances,
            acc: parse_triplet(&fields, ACC_FIELDS)?,
            gyro: parse_triplet(&fields, GYRO_FIELDS)?,
            mag: parse_triplet(&fields, MAG_FIELDS)?,
            angle: parse_triplet(&fields, ANGLE_FIELDS)?,
            tag_id: fields[TAG_FIELD].trim().to_string(),
        })
    }

    fn gate_distance(&self, slot: usize, distance: f64) -> Option<f64> {
        if !distance.is_finite() || distance < self.min_distance || distance > self.max_distance {
            debug!(
                "A{} range {} outside [{}, {}], ignored",
                slot, distance, self.min_distance, self.max_distance
            );
            return None;
        }
        Some(distance)
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number(fields: &[&str], index: usize) -> Result<f64, ParseError> {
    let raw = fields[index].trim();
    f64::from_str(raw).map_err(|_| ParseError::InvalidNumber {
        index,
        value: raw.to_string(),
    })
}

fn parse_triplet(fields: &[&str], start: usize) -> Result<[f64; 3], ParseError> {
    Ok([
        parse_number(fields, start)?,
        parse_number(fields, start + 1)?,
        parse_number(fields, start + 2)?,
    ])
}

/// Render a reading in the module's line format (without the newline)
pub fn encode_frame(reading: &UwbReading) -> String {
    let mut fields: Vec<String> = Vec::with_capacity(MIN_FRAME_FIELDS);
    fields.push(FRAME_PREFIX.trim_end_matches(',').to_string());
    fields.push(reading.device_time.to_string());
    for distance in &reading.distances {
        fields.push(match distance {
            Some(d) => d.to_string(),
            None => NULL_DISTANCE.to_string(),
        });
    }
    fields.extend(std::iter::repeat("0".to_string()).take(RESERVED_FIELDS));
    for triplet in [&reading.acc, &reading.gyro, &reading.mag, &reading.angle] {
        fields.extend(triplet.iter().map(|v| v.to_string()));
    }
    fields.push(reading.tag_id.clone());
    fields.join(",")
}
