//! BLE-MIDI packet parsing.
//!
//! One GATT notification payload is one BLE-MIDI packet: a header timestamp
//! byte followed by timestamped MIDI 1.0 messages, with MIDI running status
//! and (optionally) SysEx spanning the rest of the packet. [`parse_packet`]
//! walks a packet and lazily yields [`DecodedMessage`]s; per-connection
//! state lives in [`ParserState`] and is passed in by exclusive reference,
//! so independent connections need no coordination.
//!
//! Malformed bytes abort at most the current packet. Everything decoded
//! before the bad byte is still yielded, and diagnostics are collected on
//! the iterator rather than bubbled as hard errors.

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use tracing::{trace, warn};

use crate::error::MalformedReason;
use crate::timestamp::TimestampTracker;
use crate::ump::UmpWord;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// Timestamp bytes (header and low bytes) live in `0x80..=0xBF`.
#[inline]
fn is_timestamp_byte(byte: u8) -> bool {
    (0x80..=0xBF).contains(&byte)
}

/// System Real-Time bytes may interrupt anything, even a partial message.
#[inline]
fn is_realtime(byte: u8) -> bool {
    byte >= 0xF8
}

/// Number of data bytes following a status byte. SysEx and reserved bytes
/// are handled before this is consulted.
pub(crate) fn message_data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        0xF0 => match status {
            0xF1 | 0xF3 => 1,
            0xF2 => 2,
            _ => 0,
        },
        _ => 2,
    }
}

/// One complete, time-stamped MIDI 1.0 message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedMessage {
    /// Milliseconds, monotonic within the connection session.
    pub timestamp_ms: u32,
    /// Status byte plus data bytes. SysEx messages carry the full
    /// `0xF0 .. 0xF7` run and may exceed three bytes.
    pub bytes: SmallVec<[u8; 3]>,
    /// True when the status byte was omitted and taken from the
    /// running-status cache.
    pub is_running_status: bool,
}

/// Parser capabilities that are deliberately policy, not protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Retain an unterminated SysEx at end of packet and resume it in the
    /// next packet. Off by default: truncation is reported as
    /// [`MalformedReason::SysExTruncated`] and the bytes are dropped.
    pub sysex_continuation: bool,
}

/// Per-connection parser state.
///
/// Owned by the connection, passed `&mut` into every parse call, reset only
/// on reconnect. Never shared between connections.
#[derive(Debug, Clone, Default)]
pub struct ParserState {
    /// Running-status cache: last channel voice status byte seen. Cleared
    /// by System Common and SysEx, untouched by System Real-Time.
    running_status: Option<u8>,
    timestamps: TimestampTracker,
    /// Unterminated SysEx carried over from the previous packet
    /// (only with [`ParserConfig::sysex_continuation`]).
    pending_sysex: Option<Vec<u8>>,
    config: ParserConfig,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Forget running status, timestamps and any pending SysEx; call on
    /// reconnect.
    pub fn reset(&mut self) {
        let config = self.config;
        *self = Self::with_config(config);
    }

    #[inline]
    pub fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    #[inline]
    pub fn config(&self) -> ParserConfig {
        self.config
    }
}

/// Where the parser is between bytes of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// After a completed message: a timestamp byte, a status byte
    /// (same-timestamp compression) or a running-status data byte.
    ExpectTimestampOrStatus,
    /// Right after a timestamp byte: `0x80..=0xBF` is a status here, not
    /// another timestamp.
    ExpectStatus,
    ExpectData1 { status: u8, running: bool },
    ExpectData2 { status: u8, data1: u8, running: bool },
    InSysEx,
    /// Discarding bytes after a reserved/unexpected status until the next
    /// byte with the high bit set.
    Resync,
}

/// Lazy, ordered iterator over the messages of one packet.
///
/// Diagnostics accumulate as the packet is walked and are complete once the
/// iterator is exhausted; [`parse_packet_vec`] does both in one call.
pub struct PacketMessages<'s, 'p> {
    state: &'s mut ParserState,
    payload: &'p [u8],
    idx: usize,
    ts_ms: u32,
    phase: ParseState,
    sysex: Vec<u8>,
    diagnostics: Vec<MalformedReason>,
    /// A mid-packet timestamp byte was consumed but no message followed yet.
    dangling_ts: bool,
    finished: bool,
}

/// Parse one GATT notification payload.
///
/// The first byte must be the packet header timestamp (`0x80..=0xBF`);
/// everything after it is split into timestamped messages using the
/// running-status cache and timestamp tracker in `state`.
pub fn parse_packet<'s, 'p>(
    state: &'s mut ParserState,
    payload: &'p [u8],
) -> PacketMessages<'s, 'p> {
    let mut out = PacketMessages {
        state,
        payload,
        idx: 0,
        ts_ms: 0,
        phase: ParseState::ExpectStatus,
        sysex: Vec::new(),
        diagnostics: Vec::new(),
        dangling_ts: false,
        finished: false,
    };

    let Some(&header) = payload.first() else {
        out.diag(MalformedReason::EmptyPacket);
        out.finished = true;
        return out;
    };
    if !is_timestamp_byte(header) {
        out.diag(MalformedReason::BadHeader(header));
        out.finished = true;
        return out;
    }
    out.idx = 1;
    out.ts_ms = out.state.timestamps.begin_packet(header);

    // Resume a SysEx left open by the previous packet.
    if let Some(pending) = out.state.pending_sysex.take() {
        out.sysex = pending;
        out.phase = ParseState::InSysEx;
    }
    out
}

/// Eager variant: all messages plus all diagnostics of one packet.
pub fn parse_packet_vec(
    state: &mut ParserState,
    payload: &[u8],
) -> (SmallVec<[DecodedMessage; 8]>, Vec<MalformedReason>) {
    let mut iter = parse_packet(state, payload);
    let mut messages = SmallVec::new();
    for msg in iter.by_ref() {
        messages.push(msg);
    }
    (messages, iter.into_diagnostics())
}

impl Iterator for PacketMessages<'_, '_> {
    type Item = DecodedMessage;

    fn next(&mut self) -> Option<DecodedMessage> {
        if self.finished {
            return None;
        }
        while self.idx < self.payload.len() {
            let byte = self.payload[self.idx];
            self.idx += 1;
            let emitted = self.advance(byte);
            if emitted.is_some() {
                return emitted;
            }
            if self.finished {
                return None;
            }
        }
        self.finish();
        self.finished = true;
        None
    }
}

impl PacketMessages<'_, '_> {
    /// Diagnostics collected so far (complete once iteration ends).
    pub fn diagnostics(&self) -> &[MalformedReason] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<MalformedReason> {
        self.diagnostics
    }

    fn diag(&mut self, reason: MalformedReason) {
        warn!(%reason, "malformed BLE-MIDI packet");
        self.diagnostics.push(reason);
    }

    fn emit(&mut self, bytes: SmallVec<[u8; 3]>, running: bool) -> Option<DecodedMessage> {
        self.phase = ParseState::ExpectTimestampOrStatus;
        let msg = DecodedMessage {
            timestamp_ms: self.ts_ms,
            bytes,
            is_running_status: running,
        };
        trace!(ts_ms = msg.timestamp_ms, bytes = ?msg.bytes, "decoded message");
        Some(msg)
    }

    /// The single transition function of the state machine. Consumes one
    /// byte; returns a message when one completes.
    fn advance(&mut self, byte: u8) -> Option<DecodedMessage> {
        // Real-time interrupts any state without disturbing it.
        if is_realtime(byte) {
            // A pending timestamp byte applied to this message.
            self.dangling_ts = false;
            let msg = DecodedMessage {
                timestamp_ms: self.current_ms(),
                bytes: smallvec![byte],
                is_running_status: false,
            };
            trace!(ts_ms = msg.timestamp_ms, status = byte, "real-time message");
            return Some(msg);
        }

        match self.phase {
            ParseState::ExpectTimestampOrStatus => {
                if is_timestamp_byte(byte) {
                    self.ts_ms = self.state.timestamps.timestamp_low(byte);
                    self.phase = ParseState::ExpectStatus;
                    self.dangling_ts = true;
                    None
                } else if byte >= 0xC0 {
                    // Same-timestamp compression: a new status right after a
                    // completed message reuses the previous timestamp.
                    self.status_byte(byte)
                } else {
                    self.running_data(byte)
                }
            }
            ParseState::ExpectStatus => {
                self.dangling_ts = false;
                if byte >= 0x80 {
                    self.status_byte(byte)
                } else {
                    self.running_data(byte)
                }
            }
            ParseState::ExpectData1 { status, running } => {
                if byte < 0x80 {
                    if message_data_len(status) == 1 {
                        self.emit(smallvec![status, byte], running)
                    } else {
                        self.phase = ParseState::ExpectData2 {
                            status,
                            data1: byte,
                            running,
                        };
                        None
                    }
                } else {
                    // Status where data was required: drop the partial
                    // message and reinterpret this byte from scratch.
                    self.diag(MalformedReason::TruncatedMessage);
                    self.phase = ParseState::ExpectTimestampOrStatus;
                    self.advance(byte)
                }
            }
            ParseState::ExpectData2 {
                status,
                data1,
                running,
            } => {
                if byte < 0x80 {
                    self.emit(smallvec![status, data1, byte], running)
                } else {
                    self.diag(MalformedReason::TruncatedMessage);
                    self.phase = ParseState::ExpectTimestampOrStatus;
                    self.advance(byte)
                }
            }
            ParseState::InSysEx => {
                if byte < 0x80 {
                    self.sysex.push(byte);
                    None
                } else if byte == SYSEX_END {
                    self.sysex.push(byte);
                    let bytes = self.sysex.drain(..).collect();
                    self.emit(bytes, false)
                } else if is_timestamp_byte(byte) {
                    // Timestamp byte preceding the terminator (or the next
                    // message); the SysEx itself keeps accumulating.
                    self.ts_ms = self.state.timestamps.timestamp_low(byte);
                    None
                } else {
                    // Non-terminator status inside SysEx: discard the run.
                    self.diag(MalformedReason::UnexpectedStatus(byte));
                    self.sysex.clear();
                    self.phase = ParseState::ExpectTimestampOrStatus;
                    self.advance(byte)
                }
            }
            ParseState::Resync => {
                if byte < 0x80 {
                    None
                } else {
                    self.phase = ParseState::ExpectTimestampOrStatus;
                    self.advance(byte)
                }
            }
        }
    }

    fn status_byte(&mut self, status: u8) -> Option<DecodedMessage> {
        match status {
            0x80..=0xEF => {
                self.state.running_status = Some(status);
                self.phase = ParseState::ExpectData1 {
                    status,
                    running: false,
                };
                None
            }
            SYSEX_START => {
                self.state.running_status = None;
                self.sysex.clear();
                self.sysex.push(SYSEX_START);
                self.phase = ParseState::InSysEx;
                None
            }
            0xF1 | 0xF2 | 0xF3 => {
                self.state.running_status = None;
                self.phase = ParseState::ExpectData1 {
                    status,
                    running: false,
                };
                None
            }
            0xF4..=0xF6 => {
                self.diag(MalformedReason::ReservedSystemCommon(status));
                self.phase = ParseState::Resync;
                None
            }
            // Stray SysEx terminator (no SysEx open).
            _ => {
                self.diag(MalformedReason::UnexpectedStatus(status));
                self.phase = ParseState::Resync;
                None
            }
        }
    }

    /// Data byte arriving where a status is allowed: running-status reuse.
    fn running_data(&mut self, data1: u8) -> Option<DecodedMessage> {
        let Some(status) = self.state.running_status else {
            self.diag(MalformedReason::RunningStatusWithoutStatus);
            self.finished = true;
            return None;
        };
        if message_data_len(status) == 1 {
            self.emit(smallvec![status, data1], true)
        } else {
            self.phase = ParseState::ExpectData2 {
                status,
                data1,
                running: true,
            };
            None
        }
    }

    /// End of packet: report or stash whatever is incomplete. Partial
    /// messages are never carried into the next packet's first byte.
    fn finish(&mut self) {
        match self.phase {
            ParseState::ExpectData1 { .. } | ParseState::ExpectData2 { .. } => {
                self.diag(MalformedReason::TruncatedMessage);
            }
            ParseState::ExpectStatus => {
                // Benign right after the header; a mid-packet timestamp
                // byte with nothing following is not.
                if self.dangling_ts {
                    self.diag(MalformedReason::UnexpectedEndOfPacket);
                }
            }
            ParseState::InSysEx => {
                if self.state.config.sysex_continuation {
                    self.state.pending_sysex = Some(std::mem::take(&mut self.sysex));
                } else {
                    self.diag(MalformedReason::SysExTruncated);
                    self.sysex.clear();
                }
            }
            ParseState::ExpectTimestampOrStatus | ParseState::Resync => {}
        }
    }

    #[inline]
    fn current_ms(&self) -> u32 {
        self.ts_ms
    }
}

/// Re-encapsulate type-0x2 UMP words as BLE-MIDI notification payloads, one
/// payload per word, for the transmit direction. Program Change and Channel
/// Pressure take the 2-byte form; 1-byte system messages take the 1-byte
/// form.
pub fn to_ble_packets(words: &[UmpWord]) -> Vec<Vec<u8>> {
    words
        .iter()
        .map(|w| {
            let status = w.status();
            let mut packet = vec![0x80, status];
            let len = message_data_len(status);
            if len >= 1 {
                packet.push(w.data1());
            }
            if len >= 2 {
                packet.push(w.data2());
            }
            packet
        })
        .collect()
}
