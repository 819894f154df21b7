//! Session bookkeeping and liveness-marker reclamation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anvil_protocol::SessionId;
use tracing::{debug, info};

struct SessionEntry {
    marker: PathBuf,
    missing_since: Option<Instant>,
}

/// Open sessions, each tied to the liveness marker of the client that opened it.
pub struct SessionTable {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    next_id: AtomicU64,
}

impl SessionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens a session for the client owning `marker`.
    pub fn open(&self, marker: &Path) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(
            id,
            SessionEntry {
                marker: marker.to_path_buf(),
                missing_since: None,
            },
        );
        debug!(%id, marker = %marker.display(), "opened session");
        id
    }

    /// Releases `id`. Returns `false` if it was not open.
    pub fn release(&self, id: SessionId) -> bool {
        let released = self.lock().remove(&id).is_some();
        if released {
            debug!(%id, "released session");
        }
        released
    }

    /// Returns `true` if `id` is open.
    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no session is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reclaims sessions whose marker has been missing for at least `timeout`.
    ///
    /// A marker that reappears resets its clock.
    pub fn reap(&self, now: Instant, timeout: Duration) -> Vec<SessionId> {
        let mut sessions = self.lock();
        let mut reclaimed = Vec::new();
        for (id, entry) in sessions.iter_mut() {
            if entry.marker.exists() {
                entry.missing_since = None;
                continue;
            }
            let since = *entry.missing_since.get_or_insert(now);
            if now.saturating_duration_since(since) >= timeout {
                reclaimed.push(*id);
            }
        }
        for id in &reclaimed {
            sessions.remove(id);
            info!(%id, "reclaimed session of a vanished client");
        }
        reclaimed.sort();
        reclaimed
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs [`SessionTable::reap`] every `interval` until `shutdown` is set.
pub(crate) fn spawn_reaper(
    table: Arc<SessionTable>,
    interval: Duration,
    timeout: Duration,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("anvil-reaper".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Acquire) {
                thread::sleep(interval);
                table.reap(Instant::now(), timeout);
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let table = SessionTable::new();
        let a = table.open(dir.path());
        let b = table.open(dir.path());
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert!(table.release(a));
        assert!(!table.release(a));
        assert!(!table.contains(a));
        assert!(table.contains(b));
    }

    #[test]
    fn live_markers_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("client-is-running");
        std::fs::write(&marker, "").unwrap();
        let table = SessionTable::new();
        table.open(&marker);
        assert!(table.reap(Instant::now(), Duration::ZERO).is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn vanished_marker_reclaimed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("gone-is-running");
        let table = SessionTable::new();
        let id = table.open(&marker);

        let start = Instant::now();
        let timeout = Duration::from_secs(60);
        assert!(table.reap(start, timeout).is_empty());
        assert!(table.reap(start + Duration::from_secs(30), timeout).is_empty());
        assert_eq!(table.reap(start + Duration::from_secs(60), timeout), vec![id]);
        assert!(table.is_empty());
    }

    #[test]
    fn reappearing_marker_resets_clock() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("flaky-is-running");
        let table = SessionTable::new();
        table.open(&marker);

        let start = Instant::now();
        let timeout = Duration::from_secs(10);
        table.reap(start, timeout);
        std::fs::write(&marker, "").unwrap();
        table.reap(start + Duration::from_secs(5), timeout);
        std::fs::remove_file(&marker).unwrap();
        assert!(table.reap(start + Duration::from_secs(12), timeout).is_empty());
        assert_eq!(table.reap(start + Duration::from_secs(22), timeout).len(), 1);
    }

    #[test]
    fn reaper_thread_stops_on_shutdown() {
        let table = Arc::new(SessionTable::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = spawn_reaper(
            Arc::clone(&table),
            Duration::from_millis(5),
            Duration::ZERO,
            Arc::clone(&shutdown),
        )
        .unwrap();
        table.open(Path::new("/nonexistent/anvil-marker-is-running"));
        thread::sleep(Duration::from_millis(50));
        shutdown.store(true, Ordering::Release);
        handle.join().unwrap();
        assert!(table.is_empty());
    }
}
