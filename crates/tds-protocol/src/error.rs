//! TDS protocol-level error types.

use crate::prelude::*;
use thiserror::Error;

/// Errors that can occur while parsing or building TDS wire structures.
///
/// This crate is `no_std` compatible, so these variants avoid depending on
/// `std::error::Error` trait objects or I/O types; transport failures are
/// the responsibility of higher layers.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Buffer did not contain enough bytes to decode the expected structure.
    #[error("incomplete data: expected at least {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Bytes required to continue decoding.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Ran out of buffer while still expecting more fields.
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    /// An unrecognized packet type byte was encountered.
    #[error("invalid packet type: 0x{0:02X}")]
    InvalidPacketType(u8),

    /// An unrecognized packet status bit combination was encountered.
    #[error("invalid packet status: 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// A packet's declared length fell outside `[HEADER_SIZE, MAX_PACKET_SIZE]`.
    #[error("invalid packet length: {0}")]
    InvalidPacketLength(u16),

    /// An unrecognized token type byte was encountered while parsing a token stream.
    #[error("invalid token type: 0x{0:02X}")]
    InvalidTokenType(u8),

    /// An unrecognized pre-login option type byte was encountered.
    #[error("invalid prelogin option: 0x{0:02X}")]
    InvalidPreloginOption(u8),

    /// A field held a value outside its legal range or encoding.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },

    /// A string could not be decoded as valid UTF-16 or UTF-8.
    #[error("string encoding error: {0}")]
    StringEncoding(String),

    /// A column or parameter used a type this crate does not implement.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
}
