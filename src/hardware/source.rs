//! Frame source trait and line assembly

use std::io::{BufRead, ErrorKind, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error};

use crate::core::{FRAME_PREFIX, MAX_LINE_LENGTH};
use crate::hardware::{CommError, CommResult};

/// Hardware abstraction for anything that yields UWB measurement lines
pub trait UwbSource: Send {
    /// Read the next measurement line.
    /// Returns Ok(Some(line)) with a trimmed line starting with the frame prefix
    /// Returns Ok(None) if no complete frame is available yet
    /// Returns Err(error) if communication fails
    fn read_frame(&mut self) -> CommResult<Option<String>>;

    /// Get current source status
    fn status(&self) -> SourceStatus;

    /// Drop and re-establish the connection
    fn reset(&mut self) -> CommResult<()>;

    fn is_connected(&self) -> bool;
}

/// Source status information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceStatus {
    pub port: String,
    pub connected: bool,
    pub frames_read: u64,
    /// Lines without the frame prefix, or not valid UTF-8
    pub lines_discarded: u64,
    pub error_count: u32,
    pub last_frame_time_ms: Option<u64>,
}

impl SourceStatus {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.connected && self.error_count < 10
    }

    pub(crate) fn record_frame(&mut self) {
        self.frames_read += 1;
        self.last_frame_time_ms = Some(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        );
    }
}

/// Turn raw line bytes into a measurement frame, if it is one
pub(crate) fn accept_frame(bytes: &[u8], status: &mut SourceStatus) -> Option<String> {
    let line = match std::str::from_utf8(bytes) {
        Ok(line) => line.trim(),
        Err(e) => {
            error!("Failed to decode line from {}: {}", status.port, e);
            status.lines_discarded += 1;
            return None;
        }
    };

    if line.starts_with(FRAME_PREFIX) {
        status.record_frame();
        Some(line.to_string())
    } else {
        if !line.is_empty() {
            debug!("Discarding non-measurement line: {}", line);
            status.lines_discarded += 1;
        }
        None
    }
}

/// Assembles newline terminated frames from a buffered byte stream.
/// A line cut by a read timeout is kept until its newline arrives.
pub struct LineSource<R> {
    reader: R,
    pending: Vec<u8>,
    status: SourceStatus,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(port: impl Into<String>, reader: R) -> Self {
        let mut status = SourceStatus::new(port);
        status.connected = true;
        Self {
            reader,
            pending: Vec::with_capacity(256),
            status,
        }
    }

    /// Next complete line, terminator included, or None on timeout.
    /// Lines longer than `MAX_LINE_LENGTH` are dropped.
    fn next_line(&mut self) -> CommResult<Option<Vec<u8>>> {
        let room = (MAX_LINE_LENGTH + 1).saturating_sub(self.pending.len()) as u64;
        match self.reader.by_ref().take(room).read_until(b'\n', &mut self.pending) {
            Ok(0) if self.pending.is_empty() => Ok(None),
            Ok(_) if self.pending.len() > MAX_LINE_LENGTH && self.pending.last() != Some(&b'\n') => {
                debug!("Dropping {} bytes without a line terminator", self.pending.len());
                self.pending.clear();
                self.status.lines_discarded += 1;
                Ok(None)
            }
            // Either a terminated line or the tail of a closed stream
            Ok(_) => Ok(Some(std::mem::take(&mut self.pending))),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(e) => {
                self.status.error_count += 1;
                self.status.connected = false;
                Err(CommError::Io {
                    port: self.status.port.clone(),
                    details: e.to_string(),
                })
            }
        }
    }
}

impl<R: BufRead + Send> UwbSource for LineSource<R> {
    fn read_frame(&mut self) -> CommResult<Option<String>> {
        match self.next_line()? {
            Some(bytes) => Ok(accept_frame(&bytes, &mut self.status)),
            None => Ok(None),
        }
    }

    fn status(&self) -> SourceStatus {
        self.status.clone()
    }

    fn reset(&mut self) -> CommResult<()> {
        self.pending.clear();
        self.status.error_count = 0;
        self.status.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.status.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    #[test]
    fn test_frames_and_noise() {
        let data = b"boot ok\r\nmi,1.0,a\r\n\r\nmi,2.0,b\n";
        let mut source = LineSource::new("test", Cursor::new(&data[..]));

        assert_eq!(source.read_frame().unwrap(), None); // boot banner
        assert_eq!(source.read_frame().unwrap(), Some("mi,1.0,a".to_string()));
        assert_eq!(source.read_frame().unwrap(), None); // blank line
        assert_eq!(source.read_frame().unwrap(), Some("mi,2.0,b".to_string()));
        assert_eq!(source.read_frame().unwrap(), None); // exhausted

        let status = source.status();
        assert_eq!(status.frames_read, 2);
        assert_eq!(status.lines_discarded, 1);
        assert!(status.last_frame_time_ms.is_some());
    }

    #[test]
    fn test_invalid_utf8_is_skipped() {
        let data = b"mi,\xff\xfe\nmi,3.0\n";
        let mut source = LineSource::new("test", Cursor::new(&data[..]));

        assert_eq!(source.read_frame().unwrap(), None);
        assert_eq!(source.read_frame().unwrap(), Some("mi,3.0".to_string()));
        assert_eq!(source.status().lines_discarded, 1);
    }

    /// Reader that times out once in the middle of a line
    struct StutteringReader {
        chunks: Vec<Result<Vec<u8>, ErrorKind>>,
    }

    impl Read for StutteringReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            match self.chunks.remove(0) {
                Ok(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Err(kind) => Err(kind.into()),
            }
        }
    }

    #[test]
    fn test_partial_line_survives_timeout() {
        let reader = StutteringReader {
            chunks: vec![
                Ok(b"mi,4.".to_vec()),
                Err(ErrorKind::TimedOut),
                Ok(b"5,x\n".to_vec()),
            ],
        };
        let mut source = LineSource::new("test", std::io::BufReader::new(reader));

        assert_eq!(source.read_frame().unwrap(), None);
        assert_eq!(source.read_frame().unwrap(), Some("mi,4.5,x".to_string()));
    }

    #[test]
    fn test_unterminated_stream_is_bounded() {
        let mut chunks = Vec::new();
        for _ in 0..2000 {
            chunks.push(Ok(vec![b'x'; 64]));
            chunks.push(Err(ErrorKind::TimedOut));
        }
        chunks.push(Ok(b"\nmi,5.0\n".to_vec()));
        let mut source = LineSource::new("test", std::io::BufReader::new(StutteringReader { chunks }));

        let mut frames = Vec::new();
        for _ in 0..5000 {
            assert!(source.pending.len() <= MAX_LINE_LENGTH + 1);
            if let Some(frame) = source.read_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames, vec!["mi,5.0".to_string()]);
        assert!(source.status().lines_discarded >= 100);
    }

    #[test]
    fn test_long_line_within_limit() {
        let line = format!("mi,{}\n", "1".repeat(MAX_LINE_LENGTH - 4));
        let mut source = LineSource::new("test", Cursor::new(line.into_bytes()));

        let frame = source.read_frame().unwrap().unwrap();
        assert_eq!(frame.len(), MAX_LINE_LENGTH - 1);
    }

    #[test]
    fn test_hard_io_error() {
        let reader = StutteringReader {
            chunks: vec![Err(ErrorKind::BrokenPipe)],
        };
        let mut source = LineSource::new("test", std::io::BufReader::new(reader));

        let result = source.read_frame();
        assert!(matches!(result, Err(CommError::Io { .. })));
        assert!(!source.is_connected());

        source.reset().unwrap();
        assert!(source.is_connected());
    }
}
