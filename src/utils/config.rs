use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    AnchorSlot, Point3, ANCHOR_SLOTS, DEFAULT_BAUD_RATE, DEFAULT_CONNECT_ATTEMPTS,
    DEFAULT_CONNECT_RETRY_DELAY, DEFAULT_MAX_DISTANCE, DEFAULT_MIN_DISTANCE,
    DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_READ_TIMEOUT,
};

/// Driver configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Serial device of the tag module
    pub port: String,
    pub baud_rate: u32,
    /// Serial read timeout (milliseconds)
    pub read_timeout_ms: u64,
    /// Attempts made to open the device before giving up
    pub connect_attempts: u32,
    /// Delay between connection attempts (milliseconds)
    pub connect_retry_delay_ms: u64,
    /// Shortest accepted range (meters)
    pub min_distance: f64,
    /// Longest accepted range (meters)
    pub max_distance: f64,
    /// Anchor coordinates by slot (A0..A3). `null`, or a z of -77.77, marks a
    /// slot with no anchor. An empty list disables localization.
    pub anchors: Vec<Option<[f64; 3]>>,
    /// Delay between two reads of the device (milliseconds)
    pub poll_interval_ms: u64,
    /// Messages kept when the consumer falls behind; the oldest is dropped first
    pub queue_capacity: usize,
    /// Frame id written into message headers
    pub frame_id: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_delay_ms: DEFAULT_CONNECT_RETRY_DELAY.as_millis() as u64,
            min_distance: DEFAULT_MIN_DISTANCE,
            max_distance: DEFAULT_MAX_DISTANCE,
            anchors: Vec::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            frame_id: "uwb".to_string(),
        }
    }
}

impl DriverConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// True when anchor coordinates were supplied
    pub fn has_anchors(&self) -> bool {
        !self.anchors.is_empty()
    }

    /// Configured anchors, one slot per reported range
    pub fn anchor_slots(&self) -> [AnchorSlot; ANCHOR_SLOTS] {
        std::array::from_fn(|index| {
            let position = self
                .anchors
                .get(index)
                .copied()
                .flatten()
                .map(|[x, y, z]| Point3::new(x, y, z));
            AnchorSlot::new(index, position)
        })
    }

    /// Check parameter ranges and consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(invalid("port", &self.port, "serial port must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(invalid("baud_rate", self.baud_rate, "baud rate must be positive"));
        }
        if self.connect_attempts == 0 {
            return Err(invalid("connect_attempts", self.connect_attempts, "at least one attempt is required"));
        }
        if !self.min_distance.is_finite() || self.min_distance < 0.0 {
            return Err(invalid("min_distance", self.min_distance, "must be a non-negative number"));
        }
        if !self.max_distance.is_finite() || self.max_distance <= self.min_distance {
            return Err(invalid("max_distance", self.max_distance, "must exceed min_distance"));
        }
        if self.anchors.len() > ANCHOR_SLOTS {
            return Err(invalid(
                "anchors",
                self.anchors.len(),
                &format!("the module reports at most {} anchors", ANCHOR_SLOTS),
            ));
        }
        for (slot, anchor) in self.anchors.iter().enumerate() {
            if let Some(coords) = anchor {
                if coords.iter().any(|c| !c.is_finite()) {
                    return Err(invalid(&format!("anchors[{}]", slot), format!("{:?}", coords), "coordinates must be finite"));
                }
            }
        }
        if self.frame_id.contains(|c: char| c == ',' || c == '"' || c.is_control()) {
            return Err(invalid("frame_id", &self.frame_id, "must not contain commas, quotes or control characters"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", self.queue_capacity, "queue must hold at least one message"));
        }
        Ok(())
    }
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("failed to access config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config")]
    Serialize(#[source] serde_json::Error),
    #[error("no file path set for saving configuration")]
    NoPath,
}

/// Main configuration manager
#[derive(Debug, Default)]
pub struct ConfigurationManager {
    config: DriverConfig,
    config_file_path: Option<PathBuf>,
    is_modified: bool,
}

impl ConfigurationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager from a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut manager = Self::new();
        manager.load_from_file(path)?;
        Ok(manager)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Replace the configuration after validating it
    pub fn update_config(&mut self, config: DriverConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        self.is_modified = true;
        Ok(())
    }

    /// Set or clear the coordinates of one anchor slot
    pub fn set_anchor(&mut self, slot: usize, coords: Option<[f64; 3]>) -> Result<(), ConfigError> {
        if slot >= ANCHOR_SLOTS {
            return Err(invalid("anchor slot", slot, "slot out of range"));
        }
        let mut config = self.config.clone();
        if config.anchors.len() <= slot {
            config.anchors.resize(slot + 1, None);
        }
        config.anchors[slot] = coords;
        self.update_config(config)
    }

    /// Update the accepted range window, returning the previous one
    pub fn set_distance_window(&mut self, min_distance: f64, max_distance: f64) -> Result<(f64, f64), ConfigError> {
        let old = (self.config.min_distance, self.config.max_distance);
        let config = DriverConfig {
            min_distance,
            max_distance,
            ..self.config.clone()
        };
        self.update_config(config)?;
        Ok(old)
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: DriverConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate()?;

        info!("Loaded configuration from {:?}", path);
        self.config = config;
        self.config_file_path = Some(path);
        self.is_modified = false;
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = serde_json::to_string_pretty(&self.config).map_err(ConfigError::Serialize)?;
        fs::write(&path, content).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        self.config_file_path = Some(path);
        self.is_modified = false;
        Ok(())
    }

    /// Save to the currently loaded file path
    pub fn save(&mut self) -> Result<(), ConfigError> {
        match self.config_file_path.clone() {
            Some(path) => self.save_to_file(path),
            None => Err(ConfigError::NoPath),
        }
    }

    /// Check if configuration has been modified since last save
    pub fn is_modified(&self) -> bool {
        self.is_modified
    }
}
