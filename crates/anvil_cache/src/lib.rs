//! Incremental compilation cache bookkeeping.
//!
//! This crate decides, for an incremental compile request, whether the existing
//! caches can be trusted and which source entries must be invalidated or
//! removed. It keeps a content-hash manifest per working directory so that the
//! daemon can detect changes itself when the caller does not know them.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod hasher;
pub mod incremental;
pub mod manifest;
pub mod version;

pub use cache::{Cache, SourceScan, CACHE_SUBDIR};
pub use error::CacheError;
pub use hasher::{ChangeSet, SourceHasher};
pub use incremental::{ChangeDetector, FullRebuildReason, IncrementalCache, IncrementalPlanner, RebuildDirective};
pub use manifest::{CacheManifest, FileCache};
pub use version::CacheVersionFile;
