//! 32-bit Universal MIDI Packet encoding for decoded MIDI 1.0 messages.
//!
//! Every decoded message maps to exactly one message-type `0x2` word
//! (MIDI 1.0 Channel Voice over UMP):
//!
//! ```text
//! bits 31..28  message type (0x2)
//! bits 27..24  group (0 for a single BLE-MIDI port)
//! bits 23..16  status byte (opcode | channel)
//! bits 15..8   data1 (0 if absent)
//! bits  7..0   data2 (0 if absent)
//! ```
//!
//! SysEx has no 32-bit representation under type `0x2`; encoding one is an
//! [`Error::UnsupportedMessage`]. A type-`0x3` (Data) encoder is out of
//! scope here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::DecodedMessage;

/// MIDI 1.0 Channel Voice over UMP.
pub const MESSAGE_TYPE_MIDI1: u8 = 0x2;

/// A single 32-bit UMP word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UmpWord(pub u32);

impl UmpWord {
    /// Build a type-0x2 word on group 0 from raw MIDI 1.0 bytes.
    #[inline]
    pub fn from_midi1(status: u8, data1: u8, data2: u8) -> Self {
        Self(
            ((MESSAGE_TYPE_MIDI1 as u32) << 28)
                | ((status as u32) << 16)
                | ((data1 as u32) << 8)
                | data2 as u32,
        )
    }

    #[inline]
    pub fn word(self) -> u32 {
        self.0
    }

    /// Message type nibble (bits 31..28).
    #[inline]
    pub fn message_type(self) -> u8 {
        ((self.0 >> 28) & 0x0F) as u8
    }

    /// UMP group (bits 27..24).
    #[inline]
    pub fn group(self) -> u8 {
        ((self.0 >> 24) & 0x0F) as u8
    }

    /// Full status byte including the channel nibble.
    #[inline]
    pub fn status(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// MIDI channel (0-15) for channel voice words.
    #[inline]
    pub fn channel(self) -> u8 {
        self.status() & 0x0F
    }

    #[inline]
    pub fn data1(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    #[inline]
    pub fn data2(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Reconstruct the original MIDI 1.0 bytes (status + data bytes).
    pub fn to_midi1_bytes(self) -> smallvec::SmallVec<[u8; 3]> {
        let status = self.status();
        let mut bytes = smallvec::smallvec![status];
        let len = crate::parser::message_data_len(status);
        if len >= 1 {
            bytes.push(self.data1());
        }
        if len >= 2 {
            bytes.push(self.data2());
        }
        bytes
    }
}

impl fmt::Display for UmpWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::LowerHex for UmpWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<UmpWord> for u32 {
    fn from(w: UmpWord) -> u32 {
        w.0
    }
}

/// Encode one decoded message into a single UMP word.
///
/// Pure function, no state. 1-byte system messages encode with
/// `data1 = data2 = 0`.
pub fn encode(msg: &DecodedMessage) -> Result<UmpWord> {
    let status = *msg
        .bytes
        .first()
        .ok_or(Error::UnsupportedMessage("empty message"))?;
    if status == 0xF0 {
        return Err(Error::UnsupportedMessage(
            "SysEx has no single-word type-0x2 encoding",
        ));
    }
    let data1 = msg.bytes.get(1).copied().unwrap_or(0);
    let data2 = msg.bytes.get(2).copied().unwrap_or(0);
    Ok(UmpWord::from_midi1(status, data1, data2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn msg(bytes: &[u8]) -> DecodedMessage {
        DecodedMessage {
            timestamp_ms: 0,
            bytes: bytes.iter().copied().collect(),
            is_running_status: false,
        }
    }

    #[test]
    fn note_on_word_layout() {
        let w = encode(&msg(&[0x90, 60, 100])).unwrap();
        assert_eq!(w.word(), (0x2 << 28) | (0x90 << 16) | (60 << 8) | 100);
        assert_eq!(w.word(), 0x2090_3C64);
    }

    #[test]
    fn field_accessors() {
        let w = encode(&msg(&[0x9A, 60, 100])).unwrap();
        assert_eq!(w.message_type(), 0x2);
        assert_eq!(w.group(), 0);
        assert_eq!(w.status(), 0x9A);
        assert_eq!(w.channel(), 0xA);
        assert_eq!(w.data1(), 60);
        assert_eq!(w.data2(), 100);
    }

    #[test]
    fn program_change_zero_fills_data2() {
        let w = encode(&msg(&[0xC5, 17])).unwrap();
        assert_eq!(w.word(), (0x2 << 28) | (0xC5 << 16) | (17 << 8));
        assert_eq!(w.data2(), 0);
    }

    #[test]
    fn realtime_zero_fills_both() {
        let w = encode(&msg(&[0xF8])).unwrap();
        assert_eq!(w.status(), 0xF8);
        assert_eq!(w.data1(), 0);
        assert_eq!(w.data2(), 0);
    }

    #[test]
    fn sysex_is_unsupported() {
        let err = encode(&msg(&[0xF0, 0x7E, 0xF7])).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMessage(_)));
    }

    #[test]
    fn round_trip_all_channel_voice() {
        for status in 0x80u8..=0xEF {
            let bytes: smallvec::SmallVec<[u8; 3]> =
                if matches!(status & 0xF0, 0xC0 | 0xD0) {
                    smallvec![status, 0x33]
                } else {
                    smallvec![status, 0x33, 0x55]
                };
            let m = DecodedMessage {
                timestamp_ms: 0,
                bytes: bytes.clone(),
                is_running_status: false,
            };
            let w = encode(&m).unwrap();
            assert_eq!(w.to_midi1_bytes(), bytes, "status {status:#04x}");
        }
    }

    #[test]
    fn display_is_eight_hex_digits() {
        let w = UmpWord::from_midi1(0x90, 60, 100);
        assert_eq!(w.to_string(), "20903c64");
    }
}
