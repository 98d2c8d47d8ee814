//! Codec-level error types.

use thiserror::Error;

/// Errors that can occur while framing or reassembling TDS packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying transport returned an I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A packet header could not be decoded.
    #[error("invalid packet header")]
    InvalidHeader,

    /// A packet's declared length exceeded the configured maximum.
    #[error("packet too large: {size} bytes exceeds maximum of {max}")]
    PacketTooLarge {
        /// Declared packet size in bytes.
        size: usize,
        /// Configured maximum packet size.
        max: usize,
    },

    /// The underlying protocol layer rejected the bytes.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_protocol::ProtocolError),

    /// The connection was closed mid-message.
    #[error("connection closed while a message was still being assembled")]
    ConnectionClosed,
}
