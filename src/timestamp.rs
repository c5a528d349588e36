//! BLE-MIDI 13-bit timestamp reconstruction.
//!
//! BLE-MIDI carries message times as a 13-bit millisecond counter split
//! across two status-like bytes: the packet header holds the high 6 bits,
//! each timestamp byte before a message holds the low 7 bits. The counter
//! wraps every ~8192 ms; wraps are detected by backward motion and carried
//! into a session-level base so the reported `u32` milliseconds stay
//! monotonic for the life of the connection.

/// Tracks the 13-bit timestamp across packets of one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampTracker {
    /// High 6 bits from the current packet header (possibly advanced by
    /// in-packet wraparound).
    high6: u8,
    /// Most recently reconstructed 13-bit value.
    last13: Option<u16>,
    /// Session-level carry, advanced by 8192 ms per 13-bit wrap.
    base_ms: u32,
}

/// One full 13-bit period in milliseconds.
const PERIOD_MS: u32 = 1 << 13;

impl TimestampTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; used on reconnect.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consume the packet header byte (`0x80..=0xBF`) and return the
    /// timestamp that applies to a first message which omits its own
    /// timestamp byte.
    ///
    /// A header whose high bits moved backward relative to the previous
    /// packet means the 13-bit counter wrapped between packets.
    pub(crate) fn begin_packet(&mut self, header: u8) -> u32 {
        let high = header & 0x3F;
        if high < self.high6 {
            self.base_ms = self.base_ms.wrapping_add(PERIOD_MS);
        }
        self.high6 = high;
        self.last13 = Some((high as u16) << 7);
        self.current_ms()
    }

    /// Consume a timestamp byte preceding a message and return the
    /// reconstructed millisecond timestamp.
    ///
    /// If combining the new low bits with the retained high bits would move
    /// the timestamp backward, the high bits are taken to have incremented
    /// (mod 64), carrying into the session base on wrap to zero.
    pub(crate) fn timestamp_low(&mut self, byte: u8) -> u32 {
        let low = (byte & 0x7F) as u16;
        let mut ts13 = ((self.high6 as u16) << 7) | low;
        if let Some(prev) = self.last13 {
            if ts13 < prev {
                self.high6 = (self.high6 + 1) & 0x3F;
                if self.high6 == 0 {
                    self.base_ms = self.base_ms.wrapping_add(PERIOD_MS);
                }
                ts13 = ((self.high6 as u16) << 7) | low;
            }
        }
        self.last13 = Some(ts13);
        self.base_ms.wrapping_add(ts13 as u32)
    }

    /// Timestamp applied to real-time bytes and to messages that share the
    /// previous message's timestamp.
    #[inline]
    pub fn current_ms(&self) -> u32 {
        self.base_ms.wrapping_add(self.last13.unwrap_or(0) as u32)
    }
}
