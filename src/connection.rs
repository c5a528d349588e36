//! Per-connection glue: parse one notification, encode, fan out.
//!
//! One [`BleMidiConnection`] per BLE peripheral. The transport layer calls
//! [`handle_notification`](BleMidiConnection::handle_notification) with each
//! GATT payload, in reception order, from whatever thread it likes — the
//! connection is `&mut`-exclusive and shares nothing with other
//! connections, so multiple peripherals parse in parallel with no locking.

use tracing::debug;

use crate::error::{MalformedReason, SinkFailure};
use crate::parser::{parse_packet_vec, ParserConfig, ParserState};
use crate::router::{UmpRouter, UmpSink};
use crate::ump;

/// What happened to one notification payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketReport {
    /// Payload size in bytes.
    pub bytes: usize,
    /// Complete MIDI messages decoded from the packet.
    pub decoded: usize,
    /// UMP words handed to the router (decoded minus unsupported).
    pub delivered: usize,
    /// Messages with no type-0x2 encoding (SysEx).
    pub unsupported: usize,
    pub diagnostics: Vec<MalformedReason>,
    pub sink_failures: Vec<SinkFailure>,
}

impl PacketReport {
    /// True when every byte decoded cleanly and every sink accepted every
    /// word.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty() && self.sink_failures.is_empty() && self.unsupported == 0
    }
}

/// Owns the parser state and router for one BLE-MIDI peripheral.
pub struct BleMidiConnection {
    state: ParserState,
    router: UmpRouter,
}

impl BleMidiConnection {
    pub fn new(router: UmpRouter) -> Self {
        Self {
            state: ParserState::new(),
            router,
        }
    }

    pub fn with_config(router: UmpRouter, config: ParserConfig) -> Self {
        Self {
            state: ParserState::with_config(config),
            router,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn UmpSink>) {
        self.router.add_sink(sink);
    }

    pub fn router_mut(&mut self) -> &mut UmpRouter {
        &mut self.router
    }

    /// Parse one GATT notification payload, encode each decoded message and
    /// deliver the words in order.
    pub fn handle_notification(&mut self, payload: &[u8]) -> PacketReport {
        let (messages, diagnostics) = parse_packet_vec(&mut self.state, payload);

        let mut report = PacketReport {
            bytes: payload.len(),
            decoded: messages.len(),
            diagnostics,
            ..PacketReport::default()
        };
        for msg in &messages {
            match ump::encode(msg) {
                Ok(word) => {
                    report.sink_failures.extend(self.router.deliver(word));
                    report.delivered += 1;
                }
                Err(_) => report.unsupported += 1,
            }
        }
        debug!(
            bytes = report.bytes,
            decoded = report.decoded,
            delivered = report.delivered,
            diagnostics = report.diagnostics.len(),
            "handled BLE-MIDI notification"
        );
        report
    }

    /// Reconnect: forget running status, timestamps and pending SysEx.
    pub fn reset(&mut self) {
        self.state.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::router::FnSink;
    use crate::ump::UmpWord;
    use std::sync::{Arc, Mutex};

    fn connection_with_collector() -> (BleMidiConnection, Arc<Mutex<Vec<UmpWord>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let mut router = UmpRouter::new();
        router.add_sink(Box::new(FnSink::new("collector", move |w| {
            sink_seen.lock().unwrap().push(w);
            Ok(())
        })));
        (BleMidiConnection::new(router), seen)
    }

    #[test]
    fn notification_flows_to_sink() {
        let (mut conn, seen) = connection_with_collector();
        let report = conn.handle_notification(&[0x80, 0x90, 60, 100, 0x80, 0x80, 60, 0]);
        assert!(report.is_clean());
        assert_eq!(report.bytes, 8);
        assert_eq!(report.decoded, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[
                UmpWord::from_midi1(0x90, 60, 100),
                UmpWord::from_midi1(0x80, 60, 0)
            ]
        );
    }

    #[test]
    fn sysex_counts_as_unsupported_but_rest_delivers() {
        let (mut conn, seen) = connection_with_collector();
        let report =
            conn.handle_notification(&[0x80, 0x90, 60, 100, 0xF0, 0x7E, 0xF7, 0x80, 0x80, 60, 0]);
        assert_eq!(report.decoded, 3);
        assert_eq!(report.unsupported, 1);
        assert_eq!(report.delivered, 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn sink_failures_are_reported_per_word() {
        let mut router = UmpRouter::new();
        router.add_sink(Box::new(FnSink::new("full", |_| Err(SinkError::Full))));
        let mut conn = BleMidiConnection::new(router);
        let report = conn.handle_notification(&[0x80, 0x90, 60, 100]);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.sink_failures.len(), 1);
        assert_eq!(report.sink_failures[0].error, SinkError::Full);
    }

    #[test]
    fn reset_clears_running_status() {
        let (mut conn, _) = connection_with_collector();
        conn.handle_notification(&[0x80, 0x90, 60, 100]);
        conn.reset();
        let report = conn.handle_notification(&[0x80, 62, 90]);
        assert_eq!(report.decoded, 0);
        assert_eq!(
            report.diagnostics,
            vec![MalformedReason::RunningStatusWithoutStatus]
        );
    }
}
