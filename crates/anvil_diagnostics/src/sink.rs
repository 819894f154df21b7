//! Message sinks.

use crate::message::Message;
use crate::severity::ReportSeverity;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Receives messages in the order they were produced.
///
/// The daemon path calls this while the remote compile is still running; the
/// fallback path calls it after the in-process run, replaying buffered output.
pub trait MessageSink: Send + Sync {
    /// Delivers one message.
    fn report(&self, message: Message);
}

/// A thread-safe sink that keeps every message it receives.
///
/// The error count is tracked atomically so `has_errors` needs no lock.
pub struct MessageCollector {
    messages: Mutex<Vec<Message>>,
    error_count: AtomicUsize,
}

impl MessageCollector {
    /// Creates a new empty collector.
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            error_count: AtomicUsize::new(0),
        }
    }

    /// Returns `true` if any error-severity message has been reported.
    pub fn has_errors(&self) -> bool {
        self.error_count.load(Ordering::Relaxed) > 0
    }

    /// Returns the number of error-severity messages reported so far.
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Takes all collected messages, leaving the collector empty.
    pub fn take_all(&self) -> Vec<Message> {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *messages)
    }

    /// Returns a snapshot of all collected messages without draining.
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the text of every collected message, in order.
    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }
}

impl MessageSink for MessageCollector {
    fn report(&self, message: Message) {
        if message.severity == ReportSeverity::Error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        messages.push(message);
    }
}

impl Default for MessageCollector {
    fn default() -> Self {
        Self::new()
    }
}
