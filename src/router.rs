//! Fan-out of encoded UMP words to registered sinks.
//!
//! The router delivers every word to every sink, in order, synchronously
//! from the caller. It never buffers or reorders; back-pressure, retry and
//! cancellation belong to the sinks themselves. One sink failing (a full
//! queue, a dropped receiver) is recorded and never blocks the others.

use crossbeam_channel::{Sender, TrySendError};
use tracing::warn;

use crate::error::{SinkError, SinkFailure};
use crate::ump::UmpWord;

/// A destination for UMP words (a local synthesizer, a network relay, ...).
pub trait UmpSink: Send {
    /// Name used in failure reports and logs.
    fn name(&self) -> &str;

    fn deliver(&mut self, word: UmpWord) -> Result<(), SinkError>;
}

/// Delivers each produced word to all registered sinks.
#[derive(Default)]
pub struct UmpRouter {
    sinks: Vec<Box<dyn UmpSink>>,
}

impl UmpRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Box<dyn UmpSink>) {
        self.sinks.push(sink);
    }

    #[inline]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Deliver one word to every sink. Failures are isolated per sink and
    /// returned; an empty vec means everyone accepted the word.
    pub fn deliver(&mut self, word: UmpWord) -> Vec<SinkFailure> {
        let mut failures = Vec::new();
        for sink in &mut self.sinks {
            if let Err(error) = sink.deliver(word) {
                warn!(sink = sink.name(), %error, %word, "sink delivery failed");
                failures.push(SinkFailure {
                    sink: sink.name().to_string(),
                    error,
                });
            }
        }
        failures
    }

    /// Deliver a batch in order, accumulating per-sink failures.
    pub fn deliver_all(&mut self, words: &[UmpWord]) -> Vec<SinkFailure> {
        let mut failures = Vec::new();
        for &word in words {
            failures.extend(self.deliver(word));
        }
        failures
    }
}

/// Sink backed by a crossbeam channel; `try_send`, never blocks.
pub struct ChannelSink {
    name: String,
    tx: Sender<UmpWord>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>, tx: Sender<UmpWord>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }
}

impl UmpSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, word: UmpWord) -> Result<(), SinkError> {
        self.tx.try_send(word).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Disconnected(_) => SinkError::Disconnected,
        })
    }
}

/// Closure adapter for in-process consumers.
pub struct FnSink<F> {
    name: String,
    f: F,
}

impl<F> FnSink<F>
where
    F: FnMut(UmpWord) -> Result<(), SinkError> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> UmpSink for FnSink<F>
where
    F: FnMut(UmpWord) -> Result<(), SinkError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, word: UmpWord) -> Result<(), SinkError> {
        (self.f)(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collecting_sink(name: &str, seen: Arc<Mutex<Vec<UmpWord>>>) -> Box<dyn UmpSink> {
        Box::new(FnSink::new(name, move |w| {
            seen.lock().unwrap().push(w);
            Ok(())
        }))
    }

    #[test]
    fn every_sink_gets_every_word_in_order() {
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));
        let mut router = UmpRouter::new();
        router.add_sink(collecting_sink("a", a.clone()));
        router.add_sink(collecting_sink("b", b.clone()));

        let words = [
            UmpWord::from_midi1(0x90, 60, 100),
            UmpWord::from_midi1(0x80, 60, 0),
        ];
        let failures = router.deliver_all(&words);
        assert!(failures.is_empty());
        assert_eq!(a.lock().unwrap().as_slice(), &words);
        assert_eq!(b.lock().unwrap().as_slice(), &words);
    }

    #[test]
    fn failing_sink_does_not_block_others() {
        let ok = Arc::new(Mutex::new(Vec::new()));
        let mut router = UmpRouter::new();
        router.add_sink(Box::new(FnSink::new("broken", |_| {
            Err(SinkError::Failed("boom".into()))
        })));
        router.add_sink(collecting_sink("ok", ok.clone()));

        let word = UmpWord::from_midi1(0x90, 60, 100);
        let failures = router.deliver(word);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].sink, "broken");
        assert_eq!(ok.lock().unwrap().as_slice(), &[word]);
    }

    #[test]
    fn channel_sink_reports_full_and_disconnected() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut sink = ChannelSink::new("chan", tx);
        let word = UmpWord::from_midi1(0xB0, 7, 127);
        assert!(sink.deliver(word).is_ok());
        assert_eq!(sink.deliver(word), Err(SinkError::Full));
        assert_eq!(rx.recv().unwrap(), word);
        drop(rx);
        assert_eq!(sink.deliver(word), Err(SinkError::Disconnected));
    }
}
