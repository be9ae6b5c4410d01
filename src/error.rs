use std::io::Error as IoError;

#[derive(Debug)]
pub enum PairingError {
    InvalidConfig(String),
    OutOfOrderInput {
        position: i64,
        current: i64,
        tolerance: i64,
    },
    /// Too close to either end of the `i64` range to slide a full window past
    PositionOutOfRange {
        position: i64,
        window_size: i64,
    },
    /// A collaborator failed earlier; the engine's output is incomplete and it accepts no more calls
    Poisoned,
    Integrity(String),
    Io(IoError),
}

impl std::fmt::Display for PairingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairingError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            PairingError::OutOfOrderInput {
                position,
                current,
                tolerance,
            } => write!(
                f,
                "Hit at position {} arrived out of order (current position {}, tolerance {})",
                position, current, tolerance
            ),
            PairingError::PositionOutOfRange {
                position,
                window_size,
            } => write!(
                f,
                "Hit position {} is within one window ({}) of the coordinate limits",
                position, window_size
            ),
            PairingError::Poisoned => {
                write!(f, "Engine stopped after an earlier collaborator failure")
            }
            PairingError::Integrity(msg) => write!(f, "Integrity check failed: {}", msg),
            PairingError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for PairingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PairingError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for PairingError {
    fn from(e: IoError) -> Self {
        PairingError::Io(e)
    }
}

impl From<PairingError> for IoError {
    fn from(e: PairingError) -> Self {
        match e {
            PairingError::Io(e) => e,
            other => IoError::other(other.to_string()),
        }
    }
}
