//! Communication error types and handling

use thiserror::Error;

/// Communication errors raised by UWB frame sources
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommError {
    /// Device could not be opened after all attempts
    #[error("unable to connect to UWB on {port} after {attempts} attempts: {reason}")]
    ConnectionFailed {
        port: String,
        attempts: u32,
        reason: String,
    },
    /// Connection to the device failed or was lost
    #[error("connection lost to UWB on {port}")]
    ConnectionLost { port: String },
    /// Timeout waiting for data
    #[error("communication timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u32 },
    /// Read or write failure on an open device
    #[error("I/O error on {port}: {details}")]
    Io { port: String, details: String },
    /// Configuration error
    #[error("configuration error: invalid {parameter} = {value}")]
    ConfigurationError { parameter: String, value: String },
}

/// Result type for communication operations
pub type CommResult<T> = Result<T, CommError>;

/// Error recovery strategy for communication failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryStrategy {
    /// Wait and then retry
    RetryWithDelay { delay_ms: u32 },
    /// Reset the connection and retry
    ResetAndRetry,
    /// Fail permanently
    Fail,
}

impl CommError {
    /// Get the recommended recovery strategy for this error
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            CommError::ConnectionFailed { .. } => RecoveryStrategy::Fail,
            CommError::ConnectionLost { .. } => RecoveryStrategy::ResetAndRetry,
            CommError::Timeout { .. } => RecoveryStrategy::RetryWithDelay { delay_ms: 20 },
            CommError::Io { .. } => RecoveryStrategy::ResetAndRetry,
            CommError::ConfigurationError { .. } => RecoveryStrategy::Fail,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.recovery_strategy(), RecoveryStrategy::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_strategies() {
        let lost = CommError::ConnectionLost { port: "/dev/ttyUSB0".to_string() };
        assert_eq!(lost.recovery_strategy(), RecoveryStrategy::ResetAndRetry);
        assert!(lost.is_recoverable());

        let failed = CommError::ConnectionFailed {
            port: "/dev/ttyUSB0".to_string(),
            attempts: 5,
            reason: "No such file or directory".to_string(),
        };
        assert!(!failed.is_recoverable());
        assert_eq!(
            failed.to_string(),
            "unable to connect to UWB on /dev/ttyUSB0 after 5 attempts: No such file or directory"
        );
    }
}
