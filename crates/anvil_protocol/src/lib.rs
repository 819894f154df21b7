//! The logical contract between the compile client and the compile daemon.
//!
//! [`CompilationOptions`] describes what to compile and how; it is immutable and
//! every field keeps its meaning outside the process that built it. [`Request`]
//! and [`Reply`] are the frames exchanged over a daemon connection, and
//! [`codec`] reads and writes them as length-prefixed `bincode` payloads.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod options;
pub mod wire;

pub use codec::{read_frame, write_frame, MAX_FRAME_LEN};
pub use error::ProtocolError;
pub use options::{CompilationOptions, CompilerMode, IncrementalCompilationOptions, TargetPlatform};
pub use wire::{port_file, Reply, Request, SessionId, PROTOCOL_VERSION};
