use std::fmt;

/// Main error type for the Starling membership service
#[derive(Debug)]
pub enum StarlingError {
    /// Configuration or CLI argument errors
    Config(String),

    /// The node could not join the group through its introducer
    Bootstrap(String),

    /// Wire message decoding errors
    Decode(DecodeError),

    /// System I/O errors
    Io(std::io::Error),

    /// Transport layer errors
    Transport(String),

    /// JSON serialization errors (status API)
    Json(serde_json::Error),
}

/// Reasons a datagram could not be decoded into a protocol message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Zero-length datagram
    Empty,

    /// Header carries a message type we don't know
    UnknownMessageType(u8),

    /// Fewer bytes than the layout requires
    Truncated { needed: usize, available: usize },

    /// Bytes left over after a complete message
    TrailingBytes(usize),

    /// Entry status byte outside of the known range
    InvalidStatus(u8),

    /// Entry count whose byte length cannot be represented
    CountOverflow(u32),
}

impl fmt::Display for StarlingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StarlingError::Config(msg) => write!(f, "Configuration error: {}", msg),
            StarlingError::Bootstrap(msg) => write!(f, "Bootstrap error: {}", msg),
            StarlingError::Decode(err) => write!(f, "Decode error: {}", err),
            StarlingError::Io(err) => write!(f, "I/O error: {}", err),
            StarlingError::Transport(msg) => write!(f, "Transport error: {}", msg),
            StarlingError::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty datagram"),
            DecodeError::UnknownMessageType(tag) => write!(f, "unknown message type {}", tag),
            DecodeError::Truncated { needed, available } => write!(
                f,
                "truncated message: needed {} bytes, {} available",
                needed, available
            ),
            DecodeError::TrailingBytes(extra) => write!(f, "{} trailing bytes", extra),
            DecodeError::InvalidStatus(status) => write!(f, "invalid entry status {}", status),
            DecodeError::CountOverflow(count) => write!(f, "entry count {} overflows", count),
        }
    }
}

impl std::error::Error for StarlingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StarlingError::Io(err) => Some(err),
            StarlingError::Decode(err) => Some(err),
            StarlingError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for DecodeError {}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, StarlingError>;

impl StarlingError {
    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            StarlingError::Config(_) => "configuration_error",
            StarlingError::Bootstrap(_) => "bootstrap_error",
            StarlingError::Decode(_) => "decode_error",
            StarlingError::Io(_) => "io_error",
            StarlingError::Transport(_) => "transport_error",
            StarlingError::Json(_) => "json_error",
        }
    }
}

// Conversions from common error types
impl From<std::io::Error> for StarlingError {
    fn from(err: std::io::Error) -> Self {
        StarlingError::Io(err)
    }
}

impl From<DecodeError> for StarlingError {
    fn from(err: DecodeError) -> Self {
        StarlingError::Decode(err)
    }
}

impl From<serde_json::Error> for StarlingError {
    fn from(err: serde_json::Error) -> Self {
        StarlingError::Json(err)
    }
}

impl From<std::net::AddrParseError> for StarlingError {
    fn from(err: std::net::AddrParseError) -> Self {
        StarlingError::Config(format!("Invalid address: {}", err))
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::StarlingError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::StarlingError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::StarlingError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::StarlingError::Transport(format!($fmt, $($arg)*))
    };
}
