//! Listening, port publication, and the accept loop.

use std::fs;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anvil_client::{EntryPoint, FallbackCompiler};
use anvil_common::CompilerIdentity;
use anvil_config::DaemonConfig;
use anvil_protocol::port_file;
use tracing::{debug, info, warn};

use crate::error::DaemonError;
use crate::handler::handle_connection;
use crate::session::{spawn_reaper, SessionTable};

/// Where the daemon publishes itself and how it reclaims sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    /// Directory holding port files.
    pub run_dir: PathBuf,
    /// How long a session may outlive its client's liveness marker.
    pub reclaim_timeout: Duration,
    /// How often liveness markers are checked.
    pub reaper_interval: Duration,
}

impl DaemonSettings {
    /// Reads the settings from `[daemon]`.
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            run_dir: config.run_dir(),
            reclaim_timeout: config.session_reclaim_timeout(),
            reaper_interval: config.reaper_interval(),
        }
    }
}

/// State shared by every connection thread.
pub(crate) struct DaemonState {
    pub(crate) identity: CompilerIdentity,
    pub(crate) sessions: Arc<SessionTable>,
    pub(crate) compiler: FallbackCompiler,
}

/// A bound daemon that has published its port.
pub struct DaemonServer {
    listener: TcpListener,
    port: u16,
    port_file: PathBuf,
    settings: DaemonSettings,
    state: Arc<DaemonState>,
    shutdown: Arc<AtomicBool>,
}

impl DaemonServer {
    /// Binds a loopback port for `identity` and publishes it in the run directory.
    ///
    /// Compiles are executed through `entry`.
    pub fn bind(
        identity: CompilerIdentity,
        entry: Arc<dyn EntryPoint>,
        settings: DaemonSettings,
    ) -> Result<Self, DaemonError> {
        fs::create_dir_all(&settings.run_dir)
            .map_err(DaemonError::io(format!("creating {}", settings.run_dir.display())))?;
        let listener =
            TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(DaemonError::io("binding loopback listener"))?;
        let port = listener
            .local_addr()
            .map_err(DaemonError::io("reading listener address"))?
            .port();

        let port_file = port_file(&settings.run_dir, &identity);
        publish_port(&port_file, port)?;
        info!(port, %identity, port_file = %port_file.display(), "compile daemon listening");

        Ok(Self {
            listener,
            port,
            port_file,
            settings,
            state: Arc::new(DaemonState {
                identity,
                sessions: Arc::new(SessionTable::new()),
                compiler: FallbackCompiler::new(entry),
            }),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The published port file.
    pub fn port_file(&self) -> &Path {
        &self.port_file
    }

    /// The session table.
    pub fn sessions(&self) -> Arc<SessionTable> {
        Arc::clone(&self.state.sessions)
    }

    /// Serves connections until shut down through a [`DaemonHandle`].
    pub fn serve(self) -> Result<(), DaemonError> {
        let reaper = spawn_reaper(
            Arc::clone(&self.state.sessions),
            self.settings.reaper_interval,
            self.settings.reclaim_timeout,
            Arc::clone(&self.shutdown),
        )
        .map_err(DaemonError::io("starting session reaper"))?;

        for stream in self.listener.incoming() {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };
            let state = Arc::clone(&self.state);
            let spawned = thread::Builder::new()
                .name("anvil-connection".to_string())
                .spawn(move || {
                    if let Err(err) = handle_connection(stream, &state) {
                        debug!(error = %err, "connection ended with an error");
                    }
                });
            if let Err(err) = spawned {
                warn!(error = %err, "failed to spawn connection thread");
            }
        }

        self.shutdown.store(true, Ordering::Release);
        if reaper.join().is_err() {
            warn!("session reaper panicked");
        }
        self.unpublish();
        info!(port = self.port, "compile daemon stopped");
        Ok(())
    }

    /// Serves on a background thread.
    pub fn spawn(self) -> Result<DaemonHandle, DaemonError> {
        let port = self.port;
        let shutdown = Arc::clone(&self.shutdown);
        let thread = thread::Builder::new()
            .name("anvil-daemon".to_string())
            .spawn(move || self.serve())
            .map_err(DaemonError::io("starting daemon thread"))?;
        Ok(DaemonHandle {
            port,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Removes the port file if it still names this daemon.
    fn unpublish(&self) {
        let ours = fs::read_to_string(&self.port_file)
            .map(|text| text.trim() == self.port.to_string())
            .unwrap_or(false);
        if ours {
            if let Err(err) = fs::remove_file(&self.port_file) {
                debug!(error = %err, "failed to remove port file");
            }
        }
    }
}

/// Writes the port file so that readers never see a partial number.
fn publish_port(path: &Path, port: u16) -> Result<(), DaemonError> {
    let tmp = path.with_extension(format!("port.{}.tmp", std::process::id()));
    fs::write(&tmp, port.to_string()).map_err(DaemonError::io(format!("writing {}", tmp.display())))?;
    fs::rename(&tmp, path).map_err(DaemonError::io(format!("publishing {}", path.display())))
}

/// Controls a daemon serving on a background thread.
pub struct DaemonHandle {
    port: u16,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), DaemonError>>>,
}

impl DaemonHandle {
    /// The bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    pub fn shutdown(mut self) -> Result<(), DaemonError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), DaemonError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.shutdown.store(true, Ordering::Release);
        // Wake the blocking accept.
        let _ = TcpStream::connect((Ipv4Addr::LOCALHOST, self.port));
        thread.join().map_err(|_| DaemonError::Panicked)?
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "daemon did not stop cleanly");
        }
    }
}
