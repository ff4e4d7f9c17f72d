//! Reading loop that turns device lines into `UWBMsg` records

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::algorithms::{PositionFix, Trilateration};
use crate::core::{AnchorSlot, Point3, UwbReading, ANCHOR_SLOTS};
use crate::hardware::{CommError, CommResult, RecoveryStrategy, UwbSource};
use crate::interface::{Header, Time, UwbMsg};
use crate::processing::{FrameParser, ParseError};
use crate::utils::config::DriverConfig;

/// Counters kept by the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub frames: u64,
    pub messages: u64,
    pub parse_failures: u64,
    pub localized: u64,
    pub localization_failures: u64,
    pub read_errors: u64,
    pub dropped: u64,
}

/// Bounded queue that keeps the newest messages: when full, the oldest entry
/// is discarded to make room.
#[derive(Clone)]
pub struct MessageQueue {
    sender: Sender<UwbMsg>,
    receiver: Receiver<UwbMsg>,
}

impl MessageQueue {
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = flume::bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Enqueue a message. Returns true if an older message was dropped.
    pub fn push(&self, msg: UwbMsg) -> bool {
        match self.sender.try_send(msg) {
            Ok(()) => false,
            Err(TrySendError::Full(msg)) => {
                let _ = self.receiver.try_recv();
                // Another producer may have refilled the slot; the message is lost then
                let _ = self.sender.try_send(msg);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn receiver(&self) -> Receiver<UwbMsg> {
        self.receiver.clone()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// UWB tag driver: reads frames from a source, decodes and localizes them
pub struct UwbDriver<S> {
    source: S,
    parser: FrameParser,
    trilateration: Trilateration,
    anchors: [AnchorSlot; ANCHOR_SLOTS],
    anchors_configured: bool,
    frame_id: String,
    poll_interval: Duration,
    stats: DriverStats,
}

impl<S: UwbSource> UwbDriver<S> {
    pub fn new(source: S, config: &DriverConfig) -> Self {
        Self {
            source,
            parser: FrameParser::with_distance_window(config.min_distance, config.max_distance),
            trilateration: Trilateration::default(),
            anchors: config.anchor_slots(),
            anchors_configured: config.has_anchors(),
            frame_id: config.frame_id.clone(),
            poll_interval: config.poll_interval(),
            stats: DriverStats::default(),
        }
    }

    pub fn with_trilateration(mut self, trilateration: Trilateration) -> Self {
        self.trilateration = trilateration;
        self
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Read one frame from the source and turn it into a message
    pub fn poll(&mut self) -> CommResult<Option<UwbMsg>> {
        match self.source.read_frame()? {
            Some(line) => Ok(self.process_line(&line)),
            None => Ok(None),
        }
    }

    /// Decode and localize one measurement line. Malformed lines are logged and skipped.
    pub fn process_line(&mut self, line: &str) -> Option<UwbMsg> {
        self.stats.frames += 1;
        let reading = match self.parser.parse(line) {
            Ok(reading) => reading,
            Err(e @ ParseError::TooFewFields { .. }) => {
                warn!("{} => {}", e, line);
                self.stats.parse_failures += 1;
                return None;
            }
            Err(e) => {
                error!("Failed to parse frame: {}, line: {}", e, line);
                self.stats.parse_failures += 1;
                return None;
            }
        };

        let position = self.localize(&reading).map(|fix| fix.position);
        let header = Header {
            stamp: Time::now(),
            frame_id: self.frame_id.clone(),
        };
        let msg = UwbMsg::from_reading(&reading, position, header);
        self.stats.messages += 1;
        debug!("{:?}", msg);
        Some(msg)
    }

    /// Localize the tag, or None when it cannot or should not be localized.
    ///
    /// Without configured anchors, or with fewer than two reported ranges, no
    /// attempt is made. Otherwise ranges that are positive and belong to a
    /// deployed anchor are trilaterated; failures are logged.
    pub fn localize(&mut self, reading: &UwbReading) -> Option<PositionFix> {
        if !self.anchors_configured || reading.present_distances() < 2 {
            return None;
        }

        let (anchors, distances): (Vec<Point3>, Vec<f64>) = self
            .anchors
            .iter()
            .zip(reading.distances.iter())
            .filter_map(|(slot, distance)| match (slot.deployed_position(), distance) {
                (Some(anchor), Some(d)) if *d > 0.0 => Some((anchor, *d)),
                _ => None,
            })
            .unzip();

        match self.trilateration.solve(&anchors, &distances) {
            Ok(fix) => {
                self.stats.localized += 1;
                Some(fix)
            }
            Err(e) => {
                warn!("Localization failed: {}", e);
                self.stats.localization_failures += 1;
                None
            }
        }
    }

    /// Poll until `stop` is set, pushing messages into `queue`.
    /// Returns an error only when the source cannot be recovered.
    pub fn run(&mut self, queue: &MessageQueue, stop: &AtomicBool) -> CommResult<()> {
        while !stop.load(Ordering::Relaxed) {
            match self.poll() {
                Ok(Some(msg)) => {
                    if queue.push(msg) {
                        self.stats.dropped += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.stats.read_errors += 1;
                    self.recover(e)?;
                }
            }
            thread::sleep(self.poll_interval);
        }
        Ok(())
    }

    fn recover(&mut self, e: CommError) -> CommResult<()> {
        error!("Failed to read UWB: {}", e);
        match e.recovery_strategy() {
            RecoveryStrategy::RetryWithDelay { delay_ms } => {
                thread::sleep(Duration::from_millis(delay_ms as u64));
                Ok(())
            }
            RecoveryStrategy::ResetAndRetry => {
                info!("Resetting UWB source");
                self.source.reset()
            }
            RecoveryStrategy::Fail => Err(e),
        }
    }
}

impl<S: UwbSource + 'static> UwbDriver<S> {
    /// Run the driver on a dedicated thread
    pub fn spawn(mut self, queue_capacity: usize) -> std::io::Result<DriverHandle> {
        let queue = MessageQueue::bounded(queue_capacity);
        let receiver = queue.receiver();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("uwb-reader".to_string())
            .spawn(move || {
                let result = self.run(&queue, &thread_stop);
                if let Err(e) = &result {
                    error!("UWB reader stopped: {}", e);
                }
                result.map(|_| self.stats)
            })?;

        Ok(DriverHandle {
            receiver,
            stop,
            thread,
        })
    }
}

/// Handle on a driver running in the background
pub struct DriverHandle {
    receiver: Receiver<UwbMsg>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<CommResult<DriverStats>>,
}

impl DriverHandle {
    pub fn receiver(&self) -> &Receiver<UwbMsg> {
        &self.receiver
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Ask the reader to stop after the current poll
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop the reader and wait for it
    pub fn join(self) -> CommResult<DriverStats> {
        self.stop();
        self.thread.join().unwrap_or_else(|_| {
            Err(CommError::Io {
                port: "uwb-reader".to_string(),
                details: "reader thread panicked".to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::core::UNDEPLOYED_ANCHOR_Z;
    use crate::hardware::{MockUwb, SourceStatus, TagSimulator};

    /// Source replaying a fixed list of read results, then raising `stop`
    struct ScriptedSource {
        script: VecDeque<CommResult<Option<String>>>,
        reset_result: CommResult<()>,
        resets: u32,
        stop: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(script: Vec<CommResult<Option<String>>>, stop: Arc<AtomicBool>) -> Self {
            Self {
                script: script.into(),
                reset_result: Ok(()),
                resets: 0,
                stop,
            }
        }
    }

    impl UwbSource for ScriptedSource {
        fn read_frame(&mut self) -> CommResult<Option<String>> {
            self.script.pop_front().unwrap_or_else(|| {
                self.stop.store(true, Ordering::Relaxed);
                Ok(None)
            })
        }

        fn status(&self) -> SourceStatus {
            SourceStatus::new("scripted")
        }

        fn reset(&mut self) -> CommResult<()> {
            self.resets += 1;
            self.reset_result.clone()
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn lost() -> CommError {
        CommError::ConnectionLost {
            port: "scripted".to_string(),
        }
    }

    fn config_with_anchors() -> DriverConfig {
        DriverConfig {
            anchors: vec![
                Some([0.0, 0.0, 0.0]),
                Some([10.0, 0.0, 0.0]),
                Some([10.0, 10.0, 0.0]),
                Some([0.0, 10.0, 0.0]),
            ],
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    fn reading(distances: [Option<f64>; ANCHOR_SLOTS]) -> UwbReading {
        UwbReading {
            device_time: 1.5,
            distances,
            acc: [0.0, 0.0, 9.81],
            gyro: [0.0; 3],
            mag: [0.0; 3],
            angle: [0.0, 0.0, 45.0],
            tag_id: "T7".to_string(),
        }
    }

    fn ranges_to(tag: Point3, config: &DriverConfig) -> [Option<f64>; ANCHOR_SLOTS] {
        let slots = config.anchor_slots();
        std::array::from_fn(|i| slots[i].position.map(|a| (tag - a).norm()))
    }

    #[test]
    fn test_localized_message() {
        let config = config_with_anchors();
        let tag = Point3::new(3.0, 6.0, 0.0);
        let mut mock = MockUwb::new();
        mock.add_reading(&reading(ranges_to(tag, &config)));

        let mut driver = UwbDriver::new(mock, &config);
        let msg = driver.poll().unwrap().unwrap();

        assert!(msg.position_valid);
        assert!((Point3::from(msg.position) - tag).norm() < 1e-6);
        assert_eq!(msg.tag_id, "T7");
        assert_eq!(msg.header.frame_id, "uwb");
        assert_eq!(msg.device_stamp, Time { sec: 1, nanosec: 500_000_000 });
        assert_eq!(msg.distance_valid, [true; 4]);
        assert_eq!(driver.stats().localized, 1);
    }

    #[test]
    fn test_no_anchors_configured() {
        let config = DriverConfig::default();
        let mut driver = UwbDriver::new(MockUwb::new(), &config);
        let msg = driver
            .process_line(&crate::processing::encode_frame(&reading([Some(1.0), Some(2.0), Some(3.0), None])))
            .unwrap();

        assert!(!msg.position_valid);
        assert_eq!(msg.position, [0.0; 3]);
        assert_eq!(driver.stats().localization_failures, 0);
    }

    #[test]
    fn test_single_range_is_not_localized() {
        let mut driver = UwbDriver::new(MockUwb::new(), &config_with_anchors());
        assert!(driver.localize(&reading([None, Some(4.0), None, None])).is_none());
        assert_eq!(driver.stats().localization_failures, 0);
    }

    #[test]
    fn test_undeployed_and_zero_ranges_are_excluded() {
        let mut config = config_with_anchors();
        config.anchors[3] = Some([0.0, 10.0, UNDEPLOYED_ANCHOR_Z]);
        let tag = Point3::new(4.0, 3.0, 0.0);
        let mut distances = ranges_to(tag, &config_with_anchors());
        distances[0] = Some(0.0);

        let mut driver = UwbDriver::new(MockUwb::new(), &config);
        let fix = driver.localize(&reading(distances)).unwrap();
        // A1 and A2 only
        assert_eq!(fix.anchors_used, 2);
    }

    #[test]
    fn test_localization_failure_yields_zero_position() {
        let mut config = config_with_anchors();
        // Both remaining anchors at the same spot
        config.anchors = vec![Some([1.0, 1.0, 0.0]), Some([1.0, 1.0, 0.0])];
        let mut driver = UwbDriver::new(MockUwb::new(), &config);

        let line = crate::processing::encode_frame(&reading([Some(1.0), Some(2.0), None, None]));
        let msg = driver.process_line(&line).unwrap();
        assert!(!msg.position_valid);
        assert_eq!(msg.position, [0.0; 3]);
        assert_eq!(driver.stats().localization_failures, 1);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let mut mock = MockUwb::new();
        mock.add_line("mi,1.0,2.0");
        mock.add_line("mi,x,1,1,1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,T0");
        let mut driver = UwbDriver::new(mock, &DriverConfig::default());

        assert!(driver.poll().unwrap().is_none());
        assert!(driver.poll().unwrap().is_none());
        assert_eq!(driver.stats().parse_failures, 2);
        assert_eq!(driver.stats().messages, 0);
    }

    #[test]
    fn test_queue_keeps_newest() {
        let queue = MessageQueue::bounded(2);
        for id in ["a", "b", "c"] {
            queue.push(UwbMsg {
                tag_id: id.to_string(),
                ..Default::default()
            });
        }

        let receiver = queue.receiver();
        let ids: Vec<String> = receiver.try_iter().map(|m| m.tag_id).collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_timeouts_are_retried() {
        let stop = Arc::new(AtomicBool::new(false));
        let line = crate::processing::encode_frame(&reading([Some(1.0), None, None, None]));
        let source = ScriptedSource::new(
            vec![
                Err(CommError::Timeout { timeout_ms: 100 }),
                Err(CommError::Timeout { timeout_ms: 100 }),
                Ok(Some(line)),
            ],
            Arc::clone(&stop),
        );
        let config = DriverConfig {
            poll_interval_ms: 1,
            ..Default::default()
        };
        let mut driver = UwbDriver::new(source, &config);
        let queue = MessageQueue::bounded(4);

        assert!(driver.run(&queue, &stop).is_ok());
        assert_eq!(driver.stats().read_errors, 2);
        assert_eq!(driver.stats().messages, 1);
        assert_eq!(driver.source().resets, 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unrecoverable_error_ends_run() {
        let stop = Arc::new(AtomicBool::new(false));
        let error = CommError::ConfigurationError {
            parameter: "baud_rate".to_string(),
            value: "0".to_string(),
        };
        let source = ScriptedSource::new(vec![Err(error.clone()), Ok(None)], Arc::clone(&stop));
        let mut driver = UwbDriver::new(source, &DriverConfig::default());

        assert_eq!(driver.run(&MessageQueue::bounded(1), &stop), Err(error));
        assert_eq!(driver.stats().read_errors, 1);
        assert_eq!(driver.source().resets, 0);
        // Stopped on the error, not on an exhausted script
        assert!(!stop.load(Ordering::Relaxed));
    }

    #[test]
    fn test_failed_reset_ends_run() {
        let stop = Arc::new(AtomicBool::new(false));
        let failure = CommError::ConnectionFailed {
            port: "scripted".to_string(),
            attempts: 5,
            reason: "No such file or directory".to_string(),
        };
        let mut source = ScriptedSource::new(vec![Err(lost()), Err(lost())], Arc::clone(&stop));
        source.reset_result = Err(failure.clone());
        let mut driver = UwbDriver::new(source, &DriverConfig::default());

        assert_eq!(driver.run(&MessageQueue::bounded(1), &stop), Err(failure));
        assert_eq!(driver.stats().read_errors, 1);
        assert_eq!(driver.source().resets, 1);
    }

    #[test]
    fn test_join_reports_reader_failure() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut source = ScriptedSource::new(vec![Err(lost())], stop);
        source.reset_result = Err(CommError::ConnectionFailed {
            port: "scripted".to_string(),
            attempts: 1,
            reason: "gone".to_string(),
        });

        let handle = UwbDriver::new(source, &DriverConfig::default()).spawn(1).unwrap();
        // The queue closes once the reader thread exits
        assert!(handle.receiver().recv_timeout(Duration::from_secs(5)).is_err());
        assert!(matches!(
            handle.join(),
            Err(CommError::ConnectionFailed { attempts: 1, .. })
        ));
    }

    #[test]
    fn test_spawned_driver_survives_timeouts() {
        let mut mock = MockUwb::new();
        mock.simulate_errors(true, 1.0);
        let config = DriverConfig {
            poll_interval_ms: 1,
            ..Default::default()
        };

        let handle = UwbDriver::new(mock, &config).spawn(1).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(!handle.is_finished());

        let stats = handle.join().unwrap();
        assert!(stats.read_errors >= 1);
        assert_eq!(stats.messages, 0);
    }

    #[test]
    fn test_spawned_driver_with_simulator() {
        let config = config_with_anchors();
        let anchors: [Option<Point3>; ANCHOR_SLOTS] =
            std::array::from_fn(|i| config.anchor_slots()[i].position);
        let tag = Point3::new(2.0, 8.0, 0.0);
        let mut mock = MockUwb::with_simulator(TagSimulator::new(anchors, tag));
        mock.disconnect();

        let handle = UwbDriver::new(mock, &config).spawn(config.queue_capacity).unwrap();
        let msg = handle
            .receiver()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        let stats = handle.join().unwrap();

        assert!(msg.position_valid);
        assert!((Point3::from(msg.position) - tag).norm() < 1e-6);
        // The initial disconnect was recovered by a reset
        assert_eq!(stats.read_errors, 1);
        assert!(stats.messages >= 1);
    }
}
