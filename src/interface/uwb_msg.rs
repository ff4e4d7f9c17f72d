use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Point3, UwbReading, ANCHOR_SLOTS};

/// Errors raised while encoding or decoding the wire form of a message
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("CDR encoding failed: {0}")]
    Cdr(#[from] cdr::Error),
}

/// `builtin_interfaces/Time`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    pub sec: i32,
    pub nanosec: u32,
}

impl Time {
    /// Split floating seconds into whole seconds and nanoseconds.
    /// Negative, non-finite or out of range input gives the zero time.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs < 0.0 || secs >= i32::MAX as f64 {
            return Self::default();
        }
        let sec = secs.trunc();
        let nanosec = ((secs - sec) * 1e9).round().min(999_999_999.0);
        Self {
            sec: sec as i32,
            nanosec: nanosec as u32,
        }
    }

    pub fn now() -> Self {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: elapsed.as_secs().min(i32::MAX as u64) as i32,
            nanosec: elapsed.subsec_nanos(),
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nanosec as f64 * 1e-9
    }
}

/// `std_msgs/Header`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// Native form of `UWBMsg`. Field order follows the schema file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UwbMsg {
    pub header: Header,
    pub tag_id: String,
    pub device_stamp: Time,
    pub position_valid: bool,
    pub position: [f64; 3],
    pub distances: [f64; ANCHOR_SLOTS],
    pub distance_valid: [bool; ANCHOR_SLOTS],
    pub acc: [f64; 3],
    pub gyro: [f64; 3],
    pub mag: [f64; 3],
    pub angle: [f64; 3],
}

impl UwbMsg {
    pub const TYPE_NAME: &'static str = "uwb_sensor_interfaces/msg/UWBMsg";

    /// Names of the schema fields, in declaration order
    pub const FIELD_NAMES: [&'static str; 11] = [
        "header",
        "tag_id",
        "device_stamp",
        "position_valid",
        "position",
        "distances",
        "distance_valid",
        "acc",
        "gyro",
        "mag",
        "angle",
    ];

    /// Schema text of the message
    pub fn definition() -> &'static str {
        include_str!("../../msg/UWBMsg.msg")
    }

    /// Build a message from a decoded reading. `position` is `None` when the
    /// tag could not be localized, in which case the position is zeroed.
    pub fn from_reading(reading: &UwbReading, position: Option<Point3>, header: Header) -> Self {
        let mut distances = [0.0; ANCHOR_SLOTS];
        let mut distance_valid = [false; ANCHOR_SLOTS];
        for (slot, d) in reading.distances.iter().enumerate() {
            if let Some(d) = d {
                distances[slot] = *d;
                distance_valid[slot] = true;
            }
        }

        let (position_valid, position) = match position {
            Some(p) => (true, [p.x, p.y, p.z]),
            None => (false, [0.0; 3]),
        };

        Self {
            header,
            tag_id: reading.tag_id.clone(),
            device_stamp: Time::from_secs_f64(reading.device_time),
            position_valid,
            position,
            distances,
            distance_valid,
            acc: reading.acc,
            gyro: reading.gyro,
            mag: reading.mag,
            angle: reading.angle,
        }
    }

    /// Ranges whose validity bit is set, by anchor slot
    pub fn valid_distances(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.distances
            .iter()
            .zip(self.distance_valid.iter())
            .enumerate()
            .filter(|(_, (_, valid))| **valid)
            .map(|(slot, (d, _))| (slot, *d))
    }

    /// Little-endian CDR with the encapsulation header, as ROS 2 puts it on the wire
    pub fn to_cdr(&self) -> Result<Vec<u8>, InterfaceError> {
        Ok(cdr::serialize::<_, _, cdr::CdrLe>(self, cdr::Infinite)?)
    }

    pub fn from_cdr(bytes: &[u8]) -> Result<Self, InterfaceError> {
        Ok(cdr::deserialize::<Self>(bytes)?)
    }
}

/// Field names declared by a message definition, comments and constants skipped
pub fn field_names(definition: &str) -> Vec<String> {
    definition
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let _ty = tokens.next()?;
            let name = tokens.next()?;
            if name.contains('=') || tokens.next().map_or(false, |t| t.starts_with('=')) {
                return None;
            }
            Some(name.to_string())
        })
        .collect()
}
