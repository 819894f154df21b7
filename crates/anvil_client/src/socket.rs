//! TCP transport to a local compile daemon.
//!
//! A daemon serving a compiler identity publishes its port in
//! `<run_dir>/<identity key>.port`. The transport tries that port first; if
//! nothing answers it starts `<executable> daemon ...` and polls the port file
//! until the daemon accepts a connection or the startup timeout passes.

use std::fs;
use std::net::{Ipv4Addr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anvil_common::{CompilerIdentity, ExitStatus};
use anvil_config::DaemonConfig;
use anvil_diagnostics::{Message, MessageSink, ReportCategory, ReportSeverity};
use anvil_protocol::{
    port_file, read_frame, write_frame, CompilationOptions, ProtocolError, Reply, Request, SessionId,
    PROTOCOL_VERSION,
};
use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::transport::{DaemonChannel, DaemonTransport};

/// Connects to daemons over loopback TCP, starting them on demand.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    run_dir: PathBuf,
    executable: Option<PathBuf>,
    project_dir: Option<PathBuf>,
    startup_timeout: Duration,
    poll_interval: Duration,
}

impl SocketTransport {
    /// A transport that only connects to daemons already running in `run_dir`.
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        let defaults = DaemonConfig::default();
        Self {
            run_dir: run_dir.into(),
            executable: None,
            project_dir: None,
            startup_timeout: defaults.startup_timeout(),
            poll_interval: defaults.poll_interval(),
        }
    }

    /// A transport configured from `[daemon]`, starting the configured
    /// executable (or the running one) when no daemon answers.
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            run_dir: config.run_dir(),
            executable: config.executable.clone().or_else(|| std::env::current_exe().ok()),
            project_dir: None,
            startup_timeout: config.startup_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Starts `executable` when no daemon is running.
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    /// Makes started daemons read `anvil.toml` from `project_dir` instead of
    /// their inherited working directory.
    pub fn with_project_dir(mut self, project_dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(project_dir.into());
        self
    }

    /// Sets how long to wait for a started daemon, and how often to look.
    pub fn with_startup_timeout(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.startup_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// The port-file directory.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Connects to the daemon named by `port_file`, if one is listening.
    fn try_connect(
        &self,
        port_file: &Path,
        identity: &CompilerIdentity,
        marker: &Path,
    ) -> Result<Option<SocketChannel>, ConnectionError> {
        let Ok(text) = fs::read_to_string(port_file) else {
            return Ok(None);
        };
        let Ok(port) = text.trim().parse::<u16>() else {
            debug!(path = %port_file.display(), "ignoring malformed port file");
            return Ok(None);
        };
        let stream = match TcpStream::connect((Ipv4Addr::LOCALHOST, port)) {
            Ok(stream) => stream,
            Err(err) => {
                debug!(port, error = %err, "no daemon listening");
                return Ok(None);
            }
        };
        SocketChannel::handshake(stream, identity, marker, self.startup_timeout).map(Some)
    }

    fn daemon_command(&self, executable: &Path, identity: &CompilerIdentity) -> Command {
        let mut command = Command::new(executable);
        if let Some(project_dir) = &self.project_dir {
            command.arg("--project-dir").arg(project_dir);
        }
        command
            .arg("daemon")
            .arg("--compiler")
            .arg(identity.artifact())
            .arg("--compiler-version")
            .arg(identity.version())
            .arg("--run-dir")
            .arg(&self.run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }

    fn start_daemon(&self, executable: &Path, identity: &CompilerIdentity) -> Result<(), ConnectionError> {
        let mut child = self
            .daemon_command(executable, identity)
            .spawn()
            .map_err(|e| ConnectionError::Unavailable {
                reason: format!("failed to start {}: {e}", executable.display()),
            })?;
        let pid = child.id();
        info!(pid, %identity, "started compile daemon");

        // Reap the daemon when it exits so it never lingers as a zombie.
        let waiter = thread::Builder::new()
            .name("anvil-daemon-wait".to_string())
            .spawn(move || match child.wait() {
                Ok(status) => debug!(pid, %status, "compile daemon exited"),
                Err(err) => debug!(pid, error = %err, "failed to wait for compile daemon"),
            });
        if let Err(err) = waiter {
            warn!(pid, error = %err, "failed to start daemon waiter");
        }
        Ok(())
    }
}

impl DaemonTransport for SocketTransport {
    fn connect(&self, identity: &CompilerIdentity, marker: &Path) -> Result<Box<dyn DaemonChannel>, ConnectionError> {
        let port_file = port_file(&self.run_dir, identity);
        if let Some(channel) = self.try_connect(&port_file, identity, marker)? {
            return Ok(Box::new(channel));
        }

        let Some(executable) = &self.executable else {
            return Err(ConnectionError::Unavailable {
                reason: format!("no daemon running for {identity}"),
            });
        };
        self.start_daemon(executable, identity)?;

        let deadline = Instant::now() + self.startup_timeout;
        while Instant::now() < deadline {
            thread::sleep(self.poll_interval);
            if let Some(channel) = self.try_connect(&port_file, identity, marker)? {
                return Ok(Box::new(channel));
            }
        }
        Err(ConnectionError::Unavailable {
            reason: format!("daemon did not start within {:?}", self.startup_timeout),
        })
    }
}

/// An established, handshaken daemon connection.
struct SocketChannel {
    stream: TcpStream,
    alive: bool,
}

impl SocketChannel {
    fn handshake(
        stream: TcpStream,
        identity: &CompilerIdentity,
        marker: &Path,
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let transport_err = |e: std::io::Error| ConnectionError::Transport { reason: e.to_string() };
        stream.set_nodelay(true).map_err(transport_err)?;
        stream.set_read_timeout(Some(timeout)).map_err(transport_err)?;

        let mut channel = Self { stream, alive: true };
        channel.send(&Request::Handshake {
            protocol_version: PROTOCOL_VERSION,
            identity: identity.clone(),
            marker: marker.to_path_buf(),
        })?;
        match channel.receive()? {
            Reply::Handshake { accepted: true, .. } => {
                channel.stream.set_read_timeout(None).map_err(transport_err)?;
                Ok(channel)
            }
            Reply::Handshake { accepted: false, reason } => Err(ConnectionError::HandshakeRejected {
                reason: reason.unwrap_or_else(|| "no reason given".to_string()),
            }),
            other => Err(channel.unexpected(&other)),
        }
    }

    fn send(&mut self, request: &Request) -> Result<(), ConnectionError> {
        let result = write_frame(&mut self.stream, request);
        self.guard(result)
    }

    fn receive(&mut self) -> Result<Reply, ConnectionError> {
        let result = read_frame(&mut self.stream);
        self.guard(result)
    }

    fn guard<T>(&mut self, result: Result<T, ProtocolError>) -> Result<T, ConnectionError> {
        result.map_err(|err| {
            self.alive = false;
            err.into()
        })
    }

    fn unexpected(&mut self, reply: &Reply) -> ConnectionError {
        self.alive = false;
        ConnectionError::Transport {
            reason: format!("unexpected reply from daemon: {reply:?}"),
        }
    }
}

/// Rebuilds a message from raw codes; codes from a newer daemon degrade to a
/// daemon message at `Info`.
fn decode_message(category: i32, severity: i32, text: String) -> Message {
    let category = ReportCategory::from_code(category).unwrap_or_else(|| {
        debug!(code = category, "unknown message category");
        ReportCategory::DaemonMessage
    });
    let severity = ReportSeverity::from_code(severity).unwrap_or_else(|| {
        debug!(code = severity, "unknown message severity");
        ReportSeverity::Info
    });
    Message::new(category, severity, text)
}

impl DaemonChannel for SocketChannel {
    fn open_session(&mut self) -> Result<SessionId, ConnectionError> {
        self.send(&Request::OpenSession)?;
        match self.receive()? {
            Reply::Session { id } => Ok(id),
            Reply::Error { reason } => Err(ConnectionError::Session { reason }),
            other => Err(self.unexpected(&other)),
        }
    }

    fn compile(
        &mut self,
        session: SessionId,
        arguments: &[String],
        options: &CompilationOptions,
        sink: &dyn MessageSink,
    ) -> Result<Option<ExitStatus>, ConnectionError> {
        self.send(&Request::Compile {
            session,
            arguments: arguments.to_vec(),
            options: options.clone(),
        })?;
        loop {
            match self.receive()? {
                Reply::Message { category, severity, text } => sink.report(decode_message(category, severity, text)),
                Reply::Done { exit_code } => {
                    let status = ExitStatus::from_code(exit_code);
                    if status.is_none() {
                        debug!(exit_code, "daemon returned an unknown exit code");
                    }
                    return Ok(status);
                }
                Reply::Error { reason } => return Err(ConnectionError::Transport { reason }),
                other => return Err(self.unexpected(&other)),
            }
        }
    }

    fn release_session(&mut self, session: SessionId) -> Result<(), ConnectionError> {
        self.send(&Request::ReleaseSession { session })?;
        match self.receive()? {
            Reply::Released => Ok(()),
            Reply::Error { reason } => Err(ConnectionError::Transport { reason }),
            other => Err(self.unexpected(&other)),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_common::ContentHash;
    use anvil_diagnostics::MessageCollector;
    use anvil_protocol::TargetPlatform;
    use std::net::TcpListener;

    fn identity() -> CompilerIdentity {
        CompilerIdentity::new("compiler", ContentHash::from_bytes(b"compiler"), "1.0")
    }

    /// Serves one connection with a scripted daemon.
    fn fake_daemon(run_dir: &Path, accept: bool, done_code: i32) -> thread::JoinHandle<Vec<Request>> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        fs::write(port_file(run_dir, &identity()), port.to_string()).unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let hello: Request = read_frame(&mut stream).unwrap();
            seen.push(hello);
            let reason = (!accept).then(|| "identity mismatch".to_string());
            write_frame(&mut stream, &Reply::Handshake { accepted: accept, reason }).unwrap();
            if !accept {
                return seen;
            }
            while let Ok(request) = read_frame::<_, Request>(&mut stream) {
                let replies = match &request {
                    Request::OpenSession => vec![Reply::Session { id: SessionId(5) }],
                    Request::Compile { .. } => vec![
                        Reply::Message {
                            category: 0,
                            severity: 1,
                            text: "unused variable".to_string(),
                        },
                        Reply::Message {
                            category: 99,
                            severity: 42,
                            text: "from the future".to_string(),
                        },
                        Reply::Done { exit_code: done_code },
                    ],
                    Request::ReleaseSession { .. } => vec![Reply::Released],
                    Request::Handshake { .. } => vec![Reply::Error {
                        reason: "already connected".to_string(),
                    }],
                };
                seen.push(request);
                for reply in replies {
                    write_frame(&mut stream, &reply).unwrap();
                }
            }
            seen
        })
    }

    #[test]
    fn full_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let server = fake_daemon(dir.path(), true, 1);
        let transport = SocketTransport::new(dir.path());
        let marker = dir.path().join("marker");

        let mut channel = transport.connect(&identity(), &marker).unwrap();
        let session = channel.open_session().unwrap();
        assert_eq!(session, SessionId(5));

        let sink = MessageCollector::new();
        let options = CompilationOptions::for_build_system(TargetPlatform::Bytecode, false);
        let status = channel.compile(session, &["a.src".to_string()], &options, &sink).unwrap();
        assert_eq!(status, Some(ExitStatus::CompilationError));

        let messages = sink.messages();
        assert_eq!(messages[0], Message::compiler(ReportSeverity::Warning, "unused variable"));
        assert_eq!(messages[1].category, ReportCategory::DaemonMessage);
        assert_eq!(messages[1].severity, ReportSeverity::Info);

        channel.release_session(session).unwrap();
        assert!(channel.is_alive());
        drop(channel);

        let seen = server.join().unwrap();
        assert!(matches!(&seen[0], Request::Handshake { marker: m, protocol_version: PROTOCOL_VERSION, .. } if m == &marker));
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn unknown_exit_code_is_unrecognised() {
        let dir = tempfile::tempdir().unwrap();
        let _server = fake_daemon(dir.path(), true, 77);
        let mut channel = SocketTransport::new(dir.path())
            .connect(&identity(), &dir.path().join("marker"))
            .unwrap();
        let session = channel.open_session().unwrap();
        let options = CompilationOptions::for_build_system(TargetPlatform::Bytecode, true);
        let status = channel
            .compile(session, &[], &options, &MessageCollector::new())
            .unwrap();
        assert_eq!(status, None);
    }

    #[test]
    fn rejected_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let _server = fake_daemon(dir.path(), false, 0);
        let err = SocketTransport::new(dir.path())
            .connect(&identity(), &dir.path().join("marker"))
            .err()
            .unwrap();
        assert_eq!(
            err,
            ConnectionError::HandshakeRejected {
                reason: "identity mismatch".to_string()
            }
        );
    }

    #[test]
    fn no_daemon_and_no_executable_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SocketTransport::new(dir.path())
            .connect(&identity(), &dir.path().join("marker"))
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::Unavailable { .. }));
    }

    #[test]
    fn stale_port_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        // Bind and drop to get a port nobody listens on.
        let port = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        fs::write(port_file(dir.path(), &identity()), port.to_string()).unwrap();
        let err = SocketTransport::new(dir.path())
            .connect(&identity(), &dir.path().join("marker"))
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::Unavailable { .. }));
    }

    #[test]
    fn failed_start_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SocketTransport::new(dir.path())
            .with_executable(dir.path().join("no-such-daemon"))
            .with_startup_timeout(Duration::from_millis(100), Duration::from_millis(10))
            .connect(&identity(), &dir.path().join("marker"))
            .err()
            .unwrap();
        match err {
            ConnectionError::Unavailable { reason } => assert!(reason.contains("failed to start")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_codes_degrade() {
        let m = decode_message(3, 9, "x".to_string());
        assert_eq!(m.category, ReportCategory::IcMessage);
        assert_eq!(m.severity, ReportSeverity::Info);
    }

    #[test]
    fn started_daemon_reads_the_project_config() {
        let transport = SocketTransport::new("/run/anvil").with_project_dir("/work/app");
        let command = transport.daemon_command(Path::new("/usr/bin/anvil"), &identity());
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--project-dir",
                "/work/app",
                "daemon",
                "--compiler",
                "compiler",
                "--compiler-version",
                "1.0",
                "--run-dir",
                "/run/anvil",
            ]
        );
    }

    #[test]
    fn project_dir_is_optional() {
        let command = SocketTransport::new("/run/anvil").daemon_command(Path::new("anvil"), &identity());
        assert_eq!(command.get_args().next().unwrap(), "daemon");
    }

    #[cfg(unix)]
    #[test]
    fn daemon_that_exits_at_once_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SocketTransport::new(dir.path())
            .with_executable("/bin/true")
            .with_startup_timeout(Duration::from_millis(100), Duration::from_millis(10))
            .connect(&identity(), &dir.path().join("marker"))
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::Unavailable { .. }));
    }
}
