//! Serial link to the UWB tag module

use std::io::BufReader;
use std::thread;
use std::time::Duration;

use log::{error, info};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::hardware::{CommError, CommResult, LineSource, SourceStatus, UwbSource};
use crate::utils::config::DriverConfig;

type PortReader = BufReader<Box<dyn SerialPort>>;

/// UWB tag attached through a serial device
pub struct SerialUwb {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    connect_attempts: u32,
    retry_delay: Duration,
    link: Option<LineSource<PortReader>>,
    /// Counters carried over reconnections
    status: SourceStatus,
}

impl SerialUwb {
    /// Create a serial source without opening the device
    pub fn new(config: &DriverConfig) -> CommResult<Self> {
        if config.baud_rate == 0 {
            return Err(CommError::ConfigurationError {
                parameter: "baud_rate".to_string(),
                value: "0".to_string(),
            });
        }
        if config.connect_attempts == 0 {
            return Err(CommError::ConfigurationError {
                parameter: "connect_attempts".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            port_name: config.port.clone(),
            baud_rate: config.baud_rate,
            timeout: config.read_timeout(),
            connect_attempts: config.connect_attempts,
            retry_delay: config.connect_retry_delay(),
            link: None,
            status: SourceStatus::new(config.port.clone()),
        })
    }

    /// Create the source and open the device, retrying as configured
    pub fn open(config: &DriverConfig) -> CommResult<Self> {
        let mut uwb = Self::new(config)?;
        uwb.connect()?;
        Ok(uwb)
    }

    /// Attempt to establish the serial connection
    pub fn connect(&mut self) -> CommResult<()> {
        info!("Connecting to UWB on {} ...", self.port_name);

        let mut last_error = String::new();
        for attempt in 1..=self.connect_attempts {
            match self.open_port() {
                Ok(port) => {
                    info!("Connected to UWB on {}", self.port_name);
                    self.link = Some(LineSource::new(self.port_name.clone(), BufReader::new(port)));
                    self.status.connected = true;
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        "Connection attempt {}/{} to {} failed: {}",
                        attempt, self.connect_attempts, self.port_name, e
                    );
                    last_error = e.to_string();
                    if attempt < self.connect_attempts {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        self.status.connected = false;
        Err(CommError::ConnectionFailed {
            port: self.port_name.clone(),
            attempts: self.connect_attempts,
            reason: last_error,
        })
    }

    /// Close the serial device
    pub fn disconnect(&mut self) {
        self.link = None;
        self.status.connected = false;
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>, serialport::Error> {
        serialport::new(self.port_name.as_str(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .flow_control(FlowControl::None)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(self.timeout)
            .open()
    }
}

fn merge_counters(into: &mut SourceStatus, from: &SourceStatus) {
    into.frames_read += from.frames_read;
    into.lines_discarded += from.lines_discarded;
    into.error_count += from.error_count;
    if from.last_frame_time_ms.is_some() {
        into.last_frame_time_ms = from.last_frame_time_ms;
    }
}

impl UwbSource for SerialUwb {
    fn read_frame(&mut self) -> CommResult<Option<String>> {
        let link = self.link.as_mut().ok_or_else(|| CommError::ConnectionLost {
            port: self.port_name.clone(),
        })?;
        link.read_frame()
    }

    fn status(&self) -> SourceStatus {
        let mut status = self.status.clone();
        if let Some(link) = &self.link {
            let link_status = link.status();
            status.connected = link_status.connected;
            merge_counters(&mut status, &link_status);
        }
        status
    }

    fn reset(&mut self) -> CommResult<()> {
        if let Some(link) = self.link.take() {
            merge_counters(&mut self.status, &link.status());
        }
        self.disconnect();
        self.connect()
    }

    fn is_connected(&self) -> bool {
        self.link.as_ref().map_or(false, |link| link.is_connected())
    }
}
