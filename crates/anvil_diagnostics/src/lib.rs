//! Compiler messages, stable reporting codes, and message sinks.
//!
//! Messages cross process boundaries between the client and the daemon, so
//! categories and severities carry explicit integer codes that stay meaningful
//! no matter which build produced them. [`ReportingFilter`] encodes the user's
//! verbosity into those codes; [`MessageSink`] is the single channel through
//! which both the remote and the fallback path deliver messages in order.

#![warn(missing_docs)]

pub mod category;
pub mod filter;
pub mod message;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use category::ReportCategory;
pub use filter::{FilteringSink, ReportingFilter};
pub use message::Message;
pub use renderer::{MessageRenderer, TerminalRenderer, TerminalSink};
pub use severity::ReportSeverity;
pub use sink::{MessageCollector, MessageSink};
