//! Per-identity daemon connections with single-flight acquisition.
//!
//! The registry holds at most one live [`Connection`] per compiler identity.
//! Concurrent callers asking for the same identity share a single connection
//! attempt: whoever takes the slot lock first connects, and everyone that was
//! waiting on that attempt receives its connection or its failure without
//! connecting again. A caller that arrives after an attempt has finished and
//! finds no usable connection starts a new attempt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use anvil_common::{CompilerIdentity, ExitStatus};
use anvil_diagnostics::MessageSink;
use anvil_protocol::{CompilationOptions, SessionId};
use tracing::{debug, warn};

use crate::error::ConnectionError;
use crate::marker::LivenessMarker;
use crate::transport::{DaemonChannel, DaemonTransport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A live connection to a daemon running one compiler identity.
///
/// Requests on one connection are serialized.
pub struct Connection {
    id: u64,
    identity: CompilerIdentity,
    marker: Arc<LivenessMarker>,
    channel: Mutex<Box<dyn DaemonChannel>>,
    stale: AtomicBool,
}

impl Connection {
    /// Registry-unique number of this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The compiler identity this connection serves.
    pub fn identity(&self) -> &CompilerIdentity {
        &self.identity
    }

    /// The liveness marker the daemon watches for this client.
    pub fn marker_path(&self) -> &Path {
        self.marker.path()
    }

    /// Returns `true` until the connection is invalidated or found broken.
    ///
    /// A channel busy with another request counts as live.
    pub fn is_live(&self) -> bool {
        if self.stale.load(Ordering::Acquire) {
            return false;
        }
        match self.channel.try_lock() {
            Ok(channel) => channel.is_alive(),
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(e)) => e.into_inner().is_alive(),
        }
    }

    /// Opens a session on the daemon.
    pub fn open_session(&self) -> Result<SessionId, ConnectionError> {
        lock(&self.channel).open_session()
    }

    /// Runs a compile within `session`.
    pub fn compile(
        &self,
        session: SessionId,
        arguments: &[String],
        options: &CompilationOptions,
        sink: &dyn MessageSink,
    ) -> Result<Option<ExitStatus>, ConnectionError> {
        lock(&self.channel).compile(session, arguments, options, sink)
    }

    /// Releases `session`.
    pub fn release_session(&self, session: SessionId) -> Result<(), ConnectionError> {
        lock(&self.channel).release_session(session)
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("stale", &self.stale.load(Ordering::Relaxed))
            .finish()
    }
}

#[derive(Default)]
struct SlotState {
    connection: Option<Arc<Connection>>,
    marker: Option<Arc<LivenessMarker>>,
    last_failure: Option<ConnectionError>,
}

#[derive(Default)]
struct Slot {
    /// Number of connection attempts finished for this identity.
    attempts: AtomicU64,
    state: Mutex<SlotState>,
}

/// Holds daemon connections keyed by compiler identity.
pub struct ConnectionRegistry {
    transport: Arc<dyn DaemonTransport>,
    marker_dir: PathBuf,
    slots: Mutex<HashMap<CompilerIdentity, Arc<Slot>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates an empty registry. Liveness markers are created in `marker_dir`.
    pub fn new(transport: Arc<dyn DaemonTransport>, marker_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            marker_dir: marker_dir.into(),
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the live connection for `identity`, connecting if there is none.
    ///
    /// Callers that were waiting while another caller's attempt ran share that
    /// attempt's outcome.
    pub fn acquire(&self, identity: &CompilerIdentity) -> Result<Arc<Connection>, ConnectionError> {
        let slot = self.slot(identity);
        let seen = slot.attempts.load(Ordering::Acquire);
        let mut state = lock(&slot.state);

        if let Some(conn) = state.connection.as_ref().filter(|c| c.is_live()) {
            return Ok(Arc::clone(conn));
        }
        if slot.attempts.load(Ordering::Acquire) != seen {
            if let Some(err) = &state.last_failure {
                debug!(%identity, "sharing failure of a concurrent connection attempt");
                return Err(err.clone());
            }
        }

        let result = self.connect(identity, &mut state);
        slot.attempts.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// Discards `connection` so the next acquisition reconnects.
    ///
    /// Has no effect on the registry if a newer connection already replaced it.
    pub fn invalidate(&self, connection: &Connection) {
        connection.mark_stale();
        let slot = self.slot(connection.identity());
        let mut state = lock(&slot.state);
        if state.connection.as_ref().is_some_and(|c| c.id == connection.id) {
            debug!(id = connection.id, identity = %connection.identity, "invalidated connection");
            state.connection = None;
        }
    }

    /// Number of connection attempts finished for `identity` so far.
    pub fn attempts(&self, identity: &CompilerIdentity) -> u64 {
        lock(&self.slots)
            .get(identity)
            .map_or(0, |slot| slot.attempts.load(Ordering::Acquire))
    }

    fn slot(&self, identity: &CompilerIdentity) -> Arc<Slot> {
        Arc::clone(lock(&self.slots).entry(identity.clone()).or_default())
    }

    fn connect(&self, identity: &CompilerIdentity, state: &mut SlotState) -> Result<Arc<Connection>, ConnectionError> {
        state.connection = None;
        let marker = match &state.marker {
            Some(marker) => Arc::clone(marker),
            None => match LivenessMarker::create_in(&self.marker_dir) {
                Ok(marker) => Arc::new(marker),
                Err(err) => {
                    state.last_failure = Some(err.clone());
                    return Err(err);
                }
            },
        };

        match self.transport.connect(identity, marker.path()) {
            Ok(channel) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                debug!(id, %identity, "connected to compile daemon");
                let conn = Arc::new(Connection {
                    id,
                    identity: identity.clone(),
                    marker: Arc::clone(&marker),
                    channel: Mutex::new(channel),
                    stale: AtomicBool::new(false),
                });
                state.marker = Some(marker);
                state.connection = Some(Arc::clone(&conn));
                state.last_failure = None;
                Ok(conn)
            }
            Err(err) => {
                // A marker nobody connected with is dropped here, deleting it.
                warn!(%identity, error = %err, "connection attempt failed");
                state.last_failure = Some(err.clone());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_common::ContentHash;
    use std::sync::atomic::AtomicUsize;

    struct NullChannel;

    impl DaemonChannel for NullChannel {
        fn open_session(&mut self) -> Result<SessionId, ConnectionError> {
            Ok(SessionId(1))
        }
        fn compile(
            &mut self,
            _: SessionId,
            _: &[String],
            _: &CompilationOptions,
            _: &dyn MessageSink,
        ) -> Result<Option<ExitStatus>, ConnectionError> {
            Ok(Some(ExitStatus::Ok))
        }
        fn release_session(&mut self, _: SessionId) -> Result<(), ConnectionError> {
            Ok(())
        }
    }

    /// Fails the first `failures` connects, then succeeds.
    struct FlakyTransport {
        failures: usize,
        calls: AtomicUsize,
        markers: Mutex<Vec<PathBuf>>,
    }

    impl FlakyTransport {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
                markers: Mutex::new(Vec::new()),
            })
        }
    }

    impl DaemonTransport for FlakyTransport {
        fn connect(&self, _: &CompilerIdentity, marker: &Path) -> Result<Box<dyn DaemonChannel>, ConnectionError> {
            lock(&self.markers).push(marker.to_path_buf());
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(ConnectionError::Unavailable {
                    reason: "refused".to_string(),
                })
            } else {
                Ok(Box::new(NullChannel))
            }
        }
    }

    fn identity(version: &str) -> CompilerIdentity {
        CompilerIdentity::new("compiler", ContentHash::from_bytes(b"compiler"), version)
    }

    #[test]
    fn acquire_reuses_live_connection() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FlakyTransport::new(0);
        let registry = ConnectionRegistry::new(transport.clone(), dir.path());

        let a = registry.acquire(&identity("1")).unwrap();
        let b = registry.acquire(&identity("1")).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.attempts(&identity("1")), 1);
    }

    #[test]
    fn identities_get_separate_connections() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new(FlakyTransport::new(0), dir.path());
        let a = registry.acquire(&identity("1")).unwrap();
        let b = registry.acquire(&identity("2")).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.marker_path(), b.marker_path());
    }

    #[test]
    fn invalidate_forces_reconnect_with_same_marker() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FlakyTransport::new(0);
        let registry = ConnectionRegistry::new(transport.clone(), dir.path());

        let first = registry.acquire(&identity("1")).unwrap();
        registry.invalidate(&first);
        assert!(!first.is_live());

        let second = registry.acquire(&identity("1")).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(first.marker_path(), second.marker_path());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalidating_a_replaced_connection_keeps_the_new_one() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new(FlakyTransport::new(0), dir.path());
        let first = registry.acquire(&identity("1")).unwrap();
        registry.invalidate(&first);
        let second = registry.acquire(&identity("1")).unwrap();

        registry.invalidate(&first);
        let third = registry.acquire(&identity("1")).unwrap();
        assert_eq!(second.id(), third.id());
    }

    #[test]
    fn failed_first_attempt_deletes_fresh_marker() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FlakyTransport::new(1);
        let registry = ConnectionRegistry::new(transport.clone(), dir.path());

        assert!(registry.acquire(&identity("1")).is_err());
        let failed_marker = lock(&transport.markers)[0].clone();
        assert!(!failed_marker.exists());

        let conn = registry.acquire(&identity("1")).unwrap();
        assert!(conn.marker_path().exists());
        assert_eq!(registry.attempts(&identity("1")), 2);
    }

    #[test]
    fn dropping_registry_removes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new(FlakyTransport::new(0), dir.path());
        let marker = registry.acquire(&identity("1")).unwrap().marker_path().to_path_buf();
        assert!(marker.exists());
        drop(registry);
        assert!(!marker.exists());
    }
}
