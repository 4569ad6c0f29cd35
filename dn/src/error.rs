//! Error taxonomy shared by the supervisor, broker and network session

use std::time::Duration;
use thiserror::Error;

/// Errors raised inside the simulation core
#[derive(Debug, Error)]
pub enum SimError {
    /// Unexpected token during the negotiation phase
    #[error("Handshake failed: expected '{expected}', got '{received}'")]
    Handshake { expected: String, received: String },

    /// Malformed or out-of-sequence input
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A worker did not answer its ping in time
    #[error("Liveness timeout: worker {worker} (pid {pid:?}) missed its {deadline:?} deadline")]
    LivenessTimeout {
        worker: String,
        pid: Option<u32>,
        deadline: Duration,
    },

    /// Peer or worker disconnected
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Numeric payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Errors that end the owning unit and must be surfaced to its caller
    pub fn is_fatal(&self) -> bool {
        match self {
            SimError::Handshake { .. } => true,
            SimError::LivenessTimeout { .. } => true,
            SimError::ChannelClosed(_) => true,
            SimError::Io(_) => true,
            SimError::ProtocolViolation(_) => false,
            SimError::Parse(_) => false,
        }
    }

    /// Errors that are handled by discarding the offending input
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}

impl From<std::num::ParseIntError> for SimError {
    fn from(e: std::num::ParseIntError) -> Self {
        SimError::Parse(e.to_string())
    }
}

impl From<std::num::ParseFloatError> for SimError {
    fn from(e: std::num::ParseFloatError) -> Self {
        SimError::Parse(e.to_string())
    }
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let handshake = SimError::Handshake {
            expected: "ook".to_string(),
            received: "nope".to_string(),
        };
        assert!(handshake.is_fatal());

        assert!(SimError::ProtocolViolation("bad".to_string()).is_recoverable());
        assert!(SimError::Parse("x".to_string()).is_recoverable());

        let timeout = SimError::LivenessTimeout {
            worker: "DRONE".to_string(),
            pid: Some(12),
            deadline: Duration::from_secs(2),
        };
        assert!(timeout.is_fatal());
        assert!(SimError::ChannelClosed("peer".to_string()).is_fatal());
    }

    #[test]
    fn test_handshake_message_names_both_tokens() {
        let err = SimError::Handshake {
            expected: "ook".to_string(),
            received: "hello".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("'ook'"));
        assert!(text.contains("'hello'"));
    }

    #[test]
    fn test_parse_conversions() {
        let err: SimError = "abc".parse::<i32>().unwrap_err().into();
        assert!(matches!(err, SimError::Parse(_)));
        let err: SimError = "abc".parse::<f32>().unwrap_err().into();
        assert!(matches!(err, SimError::Parse(_)));
    }
}
