//! Error types for the BLE-MIDI transcoding core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a packet (or part of one) could not be parsed.
///
/// A malformed byte aborts at most the current packet; messages decoded
/// before the bad byte are still emitted, and the running-status cache
/// survives so the next packet resynchronizes at its header.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MalformedReason {
    #[error("empty packet")]
    EmptyPacket,

    #[error("packet header {0:#04x} outside timestamp range 0x80..=0xBF")]
    BadHeader(u8),

    #[error("running status used before any status byte was seen")]
    RunningStatusWithoutStatus,

    #[error("reserved system common byte {0:#04x}")]
    ReservedSystemCommon(u8),

    #[error("unexpected status byte {0:#04x}")]
    UnexpectedStatus(u8),

    #[error("SysEx truncated at end of packet without continuation support")]
    SysExTruncated,

    #[error("packet ended inside a channel voice message")]
    TruncatedMessage,

    #[error("packet ended after a timestamp byte with no message")]
    UnexpectedEndOfPacket,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] MalformedReason),

    /// Valid MIDI 1.0 message with no 32-bit type-0x2 UMP representation.
    #[error("unsupported message: {0}")]
    UnsupportedMessage(&'static str),
}

/// How a single router sink failed to accept a word.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkError {
    #[error("sink queue is full")]
    Full,

    #[error("sink disconnected")]
    Disconnected,

    #[error("sink failed: {0}")]
    Failed(String),
}

/// One sink's delivery failure. Other sinks still receive the word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkFailure {
    pub sink: String,
    pub error: SinkError,
}

pub type Result<T> = std::result::Result<T, Error>;
