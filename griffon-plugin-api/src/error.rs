//! Error types for the plugin protocol and for plugin authors

use thiserror::Error;

/// Errors raised while encoding, decoding or transporting frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Header did not start with the protocol magic
    #[error("Bad frame magic: {0:#06x}")]
    BadMagic(u16),

    /// Peer speaks another protocol version
    #[error("Unsupported protocol version {found} (expected {expected})")]
    UnsupportedVersion { expected: u8, found: u8 },

    /// Unknown message type byte
    #[error("Unknown message type {0}")]
    UnknownType(u8),

    /// Declared payload exceeds the frame limit
    #[error("Payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: u32 },

    /// Stream ended in the middle of a frame
    #[error("Stream closed mid-frame ({read} of {expected} bytes)")]
    Truncated { read: usize, expected: usize },

    /// Peer sent a message that is not valid at this point of the exchange
    #[error("Unexpected {0} message")]
    Unexpected(&'static str),

    /// Payload was not valid JSON for its message type
    #[error("Invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that plugins return from a call
#[derive(Error, Debug)]
pub enum PluginError {
    /// The call named a function this plugin does not expose
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// The payload did not have the shape the function expects
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error while serving the call
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),
}

impl PluginError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Wire code reported in the `Error` frame for this failure
    pub fn code(&self) -> u32 {
        match self {
            Self::UnknownFunction(_) => crate::message::ERROR_UNKNOWN_FUNCTION,
            Self::InvalidInput(_) => crate::message::ERROR_INVALID_INPUT,
            Self::Io(_) | Self::Custom(_) => crate::message::ERROR_CALL_FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::BadMagic(0xdead);
        assert!(err.to_string().contains("0xdead"));

        let err = ProtocolError::UnsupportedVersion {
            expected: 1,
            found: 9,
        };
        assert!(err.to_string().contains('9'));

        let err = ProtocolError::PayloadTooLarge { len: 10, max: 5 };
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: ProtocolError = io_err.into();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn test_plugin_error_codes_are_distinct() {
        let unknown = PluginError::UnknownFunction("x".into()).code();
        let invalid = PluginError::invalid_input("bad").code();
        let failed = PluginError::custom("boom").code();
        assert_ne!(unknown, invalid);
        assert_ne!(invalid, failed);
        assert_ne!(unknown, failed);
    }
}
