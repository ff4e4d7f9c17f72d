//! Rendering of `UWBMsg` records for consoles, logs and pipes

use std::fmt::Write as _;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ANCHOR_SLOTS;
use crate::interface::{InterfaceError, UwbMsg};

/// Output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human readable line per message
    Text,
    /// One JSON object per message
    Json,
    /// Comma separated values, see [`MessageFormatter::csv_header`]
    Csv,
    /// ROS 2 CDR bytes, hex encoded
    Cdr,
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Cdr(#[from] InterfaceError),
}

/// Message formatter
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    format: OutputFormat,
    precision: usize,
    pretty: bool,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            precision: 3,
            pretty: false,
        }
    }
}

impl MessageFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Decimal places in text and CSV output
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Multi-line JSON
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    /// Line to print before the first message, if the format has one
    pub fn preamble(&self) -> Option<String> {
        match self.format {
            OutputFormat::Csv => Some(Self::csv_header()),
            _ => None,
        }
    }

    pub fn format(&self, msg: &UwbMsg) -> Result<String, FormatError> {
        match self.format {
            OutputFormat::Text => Ok(self.format_text(msg)),
            OutputFormat::Json if self.pretty => Ok(serde_json::to_string_pretty(msg)?),
            OutputFormat::Json => Ok(serde_json::to_string(msg)?),
            OutputFormat::Csv => Ok(self.format_csv(msg)),
            OutputFormat::Cdr => Ok(to_hex(&msg.to_cdr()?)),
        }
    }

    pub fn format_text(&self, msg: &UwbMsg) -> String {
        let p = self.precision;
        let mut out = format!("[{}] t={:.p$}s ", msg.tag_id, msg.device_stamp.as_secs_f64(), p = p);

        if msg.position_valid {
            let [x, y, z] = msg.position;
            let _ = write!(out, "pos=({:.p$}, {:.p$}, {:.p$})", x, y, z, p = p);
        } else {
            out.push_str("pos=none");
        }

        let ranges: Vec<String> = msg
            .distances
            .iter()
            .zip(msg.distance_valid.iter())
            .map(|(d, valid)| if *valid { format!("{:.p$}", d, p = p) } else { "--".to_string() })
            .collect();
        let [pitch, roll, yaw] = msg.angle;
        let _ = write!(
            out,
            " d=[{}] pitch={:.1} roll={:.1} yaw={:.1}",
            ranges.join(", "),
            pitch,
            roll,
            yaw
        );
        out
    }

    pub fn csv_header() -> String {
        let mut columns = vec![
            "stamp".to_string(),
            "frame_id".to_string(),
            "tag_id".to_string(),
            "device_time".to_string(),
            "position_valid".to_string(),
            "x".to_string(),
            "y".to_string(),
            "z".to_string(),
        ];
        columns.extend((0..ANCHOR_SLOTS).map(|i| format!("d{}", i)));
        for group in ["acc", "gyro", "mag"] {
            columns.extend(["x", "y", "z"].iter().map(|axis| format!("{}_{}", group, axis)));
        }
        columns.extend(["pitch", "roll", "yaw"].iter().map(|s| s.to_string()));
        columns.join(",")
    }

    pub fn format_csv(&self, msg: &UwbMsg) -> String {
        let p = self.precision;
        let num = |v: f64| format!("{:.p$}", v, p = p);

        let mut columns = vec![
            format!("{:.9}", msg.header.stamp.as_secs_f64()),
            msg.header.frame_id.clone(),
            msg.tag_id.clone(),
            num(msg.device_stamp.as_secs_f64()),
            msg.position_valid.to_string(),
        ];
        columns.extend(msg.position.iter().map(|v| num(*v)));
        // Missing ranges are left empty
        columns.extend(
            msg.distances
                .iter()
                .zip(msg.distance_valid.iter())
                .map(|(d, valid)| if *valid { num(*d) } else { String::new() }),
        );
        for values in [&msg.acc, &msg.gyro, &msg.mag, &msg.angle] {
            columns.extend(values.iter().map(|v| num(*v)));
        }
        columns.join(",")
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{Header, Time};

    fn sample() -> UwbMsg {
        UwbMsg {
            header: Header {
                stamp: Time { sec: 10, nanosec: 0 },
                frame_id: "uwb".to_string(),
            },
            tag_id: "T0".to_string(),
            device_stamp: Time { sec: 2, nanosec: 500_000_000 },
            position_valid: true,
            position: [1.0, 2.5, 0.0],
            distances: [1.25, 0.0, 3.5, 4.0],
            distance_valid: [true, false, true, true],
            acc: [0.0, 0.0, 9.81],
            gyro: [0.0; 3],
            mag: [1.0, 2.0, 3.0],
            angle: [0.5, -0.5, 90.0],
        }
    }

    #[test]
    fn test_text_output() {
        let text = MessageFormatter::new(OutputFormat::Text).format(&sample()).unwrap();
        assert_eq!(
            text,
            "[T0] t=2.500s pos=(1.000, 2.500, 0.000) d=[1.250, --, 3.500, 4.000] pitch=0.5 roll=-0.5 yaw=90.0"
        );

        let mut unlocalized = sample();
        unlocalized.position_valid = false;
        let text = MessageFormatter::new(OutputFormat::Text).format(&unlocalized).unwrap();
        assert!(text.contains("pos=none"));
    }

    #[test]
    fn test_json_output() {
        let json = MessageFormatter::new(OutputFormat::Json).format(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["tag_id"], "T0");
        assert_eq!(value["position"][1], 2.5);
        assert_eq!(value["distance_valid"][1], false);
        assert!(!json.contains('\n'));

        let pretty = MessageFormatter::new(OutputFormat::Json).pretty().format(&sample()).unwrap();
        assert!(pretty.contains('\n'));
    }

    #[test]
    fn test_csv_output() {
        let formatter = MessageFormatter::new(OutputFormat::Csv).with_precision(2);
        let header = formatter.preamble().unwrap();
        let row = formatter.format(&sample()).unwrap();

        assert_eq!(header.split(',').count(), row.split(',').count());
        assert!(row.starts_with("10.000000000,uwb,T0,2.50,true,1.00,2.50,0.00,1.25,,3.50,4.00"));
    }

    #[test]
    fn test_cdr_output() {
        let hex = MessageFormatter::new(OutputFormat::Cdr).format(&sample()).unwrap();
        assert!(hex.starts_with("00010000"));
        assert_eq!(hex.len() % 2, 0);
        assert!(MessageFormatter::new(OutputFormat::Cdr).preamble().is_none());
    }
}
