//! Mock UWB source for testing and development

use std::collections::VecDeque;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::core::{Point3, UwbReading, ANCHOR_SLOTS};
use crate::hardware::source::accept_frame;
use crate::hardware::{CommError, CommResult, SourceStatus, UwbSource};
use crate::processing::encode_frame;

/// Synthesizes measurement lines for a tag at a known position
#[derive(Debug, Clone)]
pub struct TagSimulator {
    pub anchors: [Option<Point3>; ANCHOR_SLOTS],
    pub tag_position: Point3,
    pub tag_id: String,
    /// Standard deviation of the range noise (meters)
    pub range_noise_std: f64,
    /// Probability that an anchor reports `null`
    pub dropout_probability: f64,
    /// Device clock step between frames (seconds)
    pub frame_period: f64,
    device_time: f64,
}

impl TagSimulator {
    pub fn new(anchors: [Option<Point3>; ANCHOR_SLOTS], tag_position: Point3) -> Self {
        Self {
            anchors,
            tag_position,
            tag_id: "T0".to_string(),
            range_noise_std: 0.0,
            dropout_probability: 0.0,
            frame_period: 0.02,
            device_time: 0.0,
        }
    }

    pub fn with_noise(mut self, range_noise_std: f64) -> Self {
        self.range_noise_std = range_noise_std.max(0.0);
        self
    }

    pub fn with_dropout(mut self, probability: f64) -> Self {
        self.dropout_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Reading the module would report right now
    pub fn next_reading(&mut self) -> UwbReading {
        let mut rng = rand::thread_rng();
        let noise = Normal::new(0.0, self.range_noise_std).ok();

        let mut distances = [None; ANCHOR_SLOTS];
        for (slot, anchor) in self.anchors.iter().enumerate() {
            let Some(anchor) = anchor else { continue };
            if rng.gen::<f64>() < self.dropout_probability {
                continue;
            }
            let mut range = (self.tag_position - anchor).norm();
            if let Some(noise) = &noise {
                range += noise.sample(&mut rng);
            }
            distances[slot] = Some(range.max(0.0));
        }

        self.device_time += self.frame_period;
        UwbReading {
            device_time: self.device_time,
            distances,
            acc: [0.0, 0.0, 9.81],
            gyro: [0.0; 3],
            mag: [0.0; 3],
            angle: [0.0; 3],
            tag_id: self.tag_id.clone(),
        }
    }

    pub fn next_frame(&mut self) -> String {
        encode_frame(&self.next_reading())
    }
}

/// Mock source fed with queued lines and, once those run out, an optional simulator
pub struct MockUwb {
    status: SourceStatus,
    line_queue: VecDeque<Vec<u8>>,
    simulator: Option<TagSimulator>,
    simulate_errors: bool,
    error_probability: f32,
    resets: u32,
}

impl MockUwb {
    pub fn new() -> Self {
        let mut status = SourceStatus::new("mock");
        status.connected = true;
        Self {
            status,
            line_queue: VecDeque::new(),
            simulator: None,
            simulate_errors: false,
            error_probability: 0.0,
            resets: 0,
        }
    }

    pub fn with_simulator(simulator: TagSimulator) -> Self {
        let mut mock = Self::new();
        mock.simulator = Some(simulator);
        mock
    }

    /// Queue a raw line exactly as it would arrive from the device
    pub fn add_line(&mut self, line: impl AsRef<[u8]>) {
        self.line_queue.push_back(line.as_ref().to_vec());
    }

    /// Queue a reading in the module's line format
    pub fn add_reading(&mut self, reading: &UwbReading) {
        self.add_line(encode_frame(reading));
    }

    pub fn queued_line_count(&self) -> usize {
        self.line_queue.len()
    }

    /// Enable error simulation with given probability (0.0 to 1.0)
    pub fn simulate_errors(&mut self, enable: bool, probability: f32) {
        self.simulate_errors = enable;
        self.error_probability = probability.clamp(0.0, 1.0);
    }

    /// Simulate connection loss
    pub fn disconnect(&mut self) {
        self.status.connected = false;
    }

    pub fn reset_count(&self) -> u32 {
        self.resets
    }

    fn should_simulate_error(&self) -> bool {
        if !self.simulate_errors {
            return false;
        }
        rand::thread_rng().gen::<f32>() < self.error_probability
    }
}

impl Default for MockUwb {
    fn default() -> Self {
        Self::new()
    }
}

impl UwbSource for MockUwb {
    fn read_frame(&mut self) -> CommResult<Option<String>> {
        if !self.status.connected {
            return Err(CommError::ConnectionLost {
                port: self.status.port.clone(),
            });
        }

        if self.should_simulate_error() {
            self.status.error_count += 1;
            return Err(CommError::Timeout { timeout_ms: 100 });
        }

        if let Some(line) = self.line_queue.pop_front() {
            return Ok(accept_frame(&line, &mut self.status));
        }

        match self.simulator.as_mut() {
            Some(simulator) => {
                let frame = simulator.next_frame();
                Ok(accept_frame(frame.as_bytes(), &mut self.status))
            }
            None => Ok(None),
        }
    }

    fn status(&self) -> SourceStatus {
        self.status.clone()
    }

    fn reset(&mut self) -> CommResult<()> {
        self.resets += 1;
        self.status.connected = true;
        self.status.error_count = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.status.connected
    }
}
