//! The Anvil compile daemon.
//!
//! A daemon serves exactly one compiler identity. It listens on loopback TCP,
//! publishes its port in the run directory, and runs compiles for any client
//! whose handshake names the same identity and protocol version. Messages are
//! streamed back while the compile runs, filtered by the client's reporting
//! options. Sessions whose client liveness marker disappears are reclaimed
//! after a timeout.

#![warn(missing_docs)]

pub mod error;
mod handler;
pub mod server;
pub mod session;

pub use error::DaemonError;
pub use server::{DaemonHandle, DaemonServer, DaemonSettings};
pub use session::SessionTable;
