//! Shared foundational types used across the Anvil compile client and daemon.
//!
//! This crate provides content hashing, the compiler identity fingerprint that
//! connections are keyed by, the closed exit-status vocabulary with its
//! name-tagged decoding, and the internal error type.

#![warn(missing_docs)]

pub mod exit;
pub mod hash;
pub mod identity;
pub mod result;

pub use exit::{ExitStatus, ForeignResult};
pub use hash::ContentHash;
pub use identity::CompilerIdentity;
pub use result::{AnvilResult, InternalError};
