//! # Protocol Errors
//!
//! Failures raised while decoding JSON messages or ZMTP frames. Both the
//! client and the mock backend wrap these in their own error types.

use thiserror::Error;

/// Result alias for codec and framing operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// A message or frame that does not have the expected structure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not valid JSON of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The mandatory `code` attribute is absent from a reply.
    #[error("reply is missing the status code")]
    MissingCode,

    /// The status code is outside every known range.
    #[error("unrecognized status code {0}")]
    UnrecognizedCode(i64),

    /// A request carries neither `fields` nor `match`.
    #[error("request carries neither fields nor match")]
    EmptyRequest,

    /// The peer's greeting is not a ZMTP 3.x NULL greeting.
    #[error("invalid greeting: {0}")]
    InvalidGreeting(&'static str),

    /// Frame flags carry reserved bits.
    #[error("invalid frame flags {0:#04x}")]
    InvalidFlags(u8),

    /// Frame body exceeds the configured maximum.
    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge { size: u64, max: usize },

    /// Handshake command was missing, malformed or named an incompatible socket.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The REQ/REP envelope is not a delimiter followed by one body frame.
    #[error("invalid envelope: {0}")]
    Envelope(&'static str),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed(err.to_string())
    }
}
