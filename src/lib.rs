//! BLE-MIDI to Universal MIDI Packet transcoding.
//!
//! Consumes the raw byte payload of BLE-MIDI GATT notifications and
//! produces discrete, time-stamped MIDI 1.0 messages, re-encoded as 32-bit
//! UMP words (message type `0x2`, MIDI 1.0 Channel Voice) for downstream
//! synthesis, routing or recording.
//!
//! Pipeline: raw bytes → [`parse_packet`] (stateful, per connection) →
//! ordered [`DecodedMessage`]s → [`encode`] (pure) → [`UmpWord`]s →
//! [`UmpRouter`] fan-out.
//!
//! The GATT transport itself (scanning, connection, characteristic
//! subscription) and the downstream consumers are external; this crate is a
//! synchronous, CPU-bound transcoder whose only cross-packet state is the
//! per-connection [`ParserState`].
//!
//! ```
//! use blemidi_ump::{parse_packet_vec, ump, ParserState};
//!
//! let mut state = ParserState::new();
//! // header timestamp, then Note On ch.0, note 60, velocity 100
//! let (messages, diagnostics) = parse_packet_vec(&mut state, &[0x80, 0x90, 60, 100]);
//! assert!(diagnostics.is_empty());
//! assert_eq!(ump::encode(&messages[0]).unwrap().word(), 0x2090_3C64);
//! ```

pub mod error;
pub use error::{Error, MalformedReason, Result, SinkError, SinkFailure};

mod timestamp;
pub use timestamp::TimestampTracker;

pub mod parser;
pub use parser::{
    parse_packet, parse_packet_vec, to_ble_packets, DecodedMessage, PacketMessages, ParserConfig,
    ParserState,
};

pub mod ump;
pub use ump::{encode, UmpWord};

pub mod router;
pub use router::{ChannelSink, FnSink, UmpRouter, UmpSink};

mod connection;
pub use connection::{BleMidiConnection, PacketReport};
