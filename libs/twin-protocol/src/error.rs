//! Protocol Error Types
//!
//! Core error types for the Modbus/TCP layer.

use thiserror::Error;

/// Result type for twin-protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Modbus/TCP layer errors
#[derive(Debug, Error, Clone)]
pub enum ProtocolError {
    /// Unparseable or length-inconsistent ADU. Aborts the connection;
    /// no partial recovery is attempted.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Function code outside the supported set. Never fatal on the wire
    /// path (frames are passed through raw); fatal only when a typed
    /// operation is required.
    #[error("unsupported function code 0x{0:02X}")]
    UnsupportedFunction(u8),

    /// Modbus exception response from the peer
    #[error("modbus exception: FC=0x{function:02X}, code=0x{code:02X} ({description})")]
    Exception {
        function: u8,
        code: u8,
        description: &'static str,
    },

    /// Connection errors
    #[error("connection error: {0}")]
    Connection(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Invalid data
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Io(err.to_string())
    }
}

/// Human-readable description for a Modbus exception code
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Server Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Server Device Busy",
        _ => "Unknown Exception",
    }
}
