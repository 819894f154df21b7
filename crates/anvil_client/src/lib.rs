//! Client side of the Anvil compile service.
//!
//! A compile request goes through [`CompileOrchestrator`]: it acquires a
//! connection to a long-lived compile daemon from the [`ConnectionRegistry`],
//! opens a session, and runs the compile remotely. When the daemon cannot be
//! reached after one retry, or answers with something it cannot interpret, the
//! request is served by the [`FallbackCompiler`] instead, which runs the
//! compiler through an [`EntryPoint`] and replays its console output.
//!
//! The transport is pluggable through [`DaemonTransport`]; [`SocketTransport`]
//! talks to a local daemon over TCP and starts one when none is running.

#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod fallback;
pub mod marker;
pub mod orchestrator;
pub mod registry;
pub mod socket;
pub mod transport;

pub use entry::{CommandEntryPoint, FnEntryPoint, ProcessResult};
pub use error::ConnectionError;
pub use fallback::{decode_result, EntryPoint, FallbackCompiler};
pub use marker::LivenessMarker;
pub use orchestrator::{CompileOrchestrator, CompileOutcome, DaemonPolicy, OrchestratorState, ServedBy};
pub use registry::{Connection, ConnectionRegistry};
pub use socket::SocketTransport;
pub use transport::{DaemonChannel, DaemonTransport};
