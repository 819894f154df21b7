//! Retry-then-fallback compile orchestration.
//!
//! Every compile walks an explicit state machine:
//!
//! ```text
//! Start         -> Connecting | Fallback
//! Connecting    -> SessionOpen | Connecting | Fallback
//! SessionOpen   -> RemoteCompile | Connecting | Fallback
//! RemoteCompile -> Done | Fallback
//! Fallback      -> Done
//! ```
//!
//! Connecting and opening a session share one failure counter: with retry
//! enabled the first failure goes back to `Connecting`, the second goes to
//! `Fallback`. A remote compile that returns a recognised status is final,
//! whatever the status; a remote compile that breaks or returns something
//! unrecognised falls back.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anvil_common::{CompilerIdentity, ExitStatus};
use anvil_config::AnvilConfig;
use anvil_diagnostics::{Message, MessageSink, ReportCategory, ReportSeverity, TerminalSink};
use anvil_protocol::{CompilationOptions, SessionId};
use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::fallback::FallbackCompiler;
use crate::registry::{Connection, ConnectionRegistry};

/// Daemon usage policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonPolicy {
    /// Whether the daemon is used at all.
    pub enabled: bool,
    /// Default for the retry flag of [`CompileOrchestrator::compile`] callers
    /// that take it from configuration.
    pub retry_on_connection_error: bool,
    /// Arguments appended to every compile, on both paths.
    pub additional_arguments: Vec<String>,
}

impl DaemonPolicy {
    /// Reads the policy from the loaded configuration.
    pub fn from_config(config: &AnvilConfig) -> Self {
        Self {
            enabled: config.daemon.enabled,
            retry_on_connection_error: config.daemon.retry_on_connection_error,
            additional_arguments: config.compiler.additional_arguments(),
        }
    }
}

impl Default for DaemonPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_on_connection_error: true,
            additional_arguments: Vec::new(),
        }
    }
}

/// The states a compile passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrchestratorState {
    /// Deciding whether to use the daemon.
    Start,
    /// Acquiring a daemon connection.
    Connecting,
    /// Opening a session on the acquired connection.
    SessionOpen,
    /// Compiling on the daemon.
    RemoteCompile,
    /// Compiling in-process.
    Fallback,
    /// Finished; terminal.
    Done,
}

impl OrchestratorState {
    /// Whether no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::Connecting => write!(f, "Connecting"),
            Self::SessionOpen => write!(f, "SessionOpen"),
            Self::RemoteCompile => write!(f, "RemoteCompile"),
            Self::Fallback => write!(f, "Fallback"),
            Self::Done => write!(f, "Done"),
        }
    }
}

fn is_legal_transition(from: OrchestratorState, to: OrchestratorState) -> bool {
    use OrchestratorState::*;

    matches!(
        (from, to),
        (Start, Connecting)
            | (Start, Fallback)
            | (Connecting, SessionOpen)
            | (Connecting, Connecting)
            | (Connecting, Fallback)
            | (SessionOpen, RemoteCompile)
            | (SessionOpen, Connecting)
            | (SessionOpen, Fallback)
            | (RemoteCompile, Done)
            | (RemoteCompile, Fallback)
            | (Fallback, Done)
    )
}

/// Which path produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedBy {
    /// The compile daemon.
    Daemon,
    /// The in-process fallback.
    Fallback,
}

/// The result of one orchestrated compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    /// The final status.
    pub status: ExitStatus,
    /// The path that produced it; `None` if the orchestrator itself failed.
    pub served_by: Option<ServedBy>,
    /// Every state visited, in order, starting with `Start`.
    pub trail: Vec<OrchestratorState>,
}

/// A state together with the data it carries.
enum Step {
    Start,
    Connecting,
    SessionOpen(Arc<Connection>),
    RemoteCompile(Arc<Connection>, SessionId),
    Fallback,
    Done(ExitStatus, ServedBy),
}

impl Step {
    fn state(&self) -> OrchestratorState {
        match self {
            Step::Start => OrchestratorState::Start,
            Step::Connecting => OrchestratorState::Connecting,
            Step::SessionOpen(_) => OrchestratorState::SessionOpen,
            Step::RemoteCompile(..) => OrchestratorState::RemoteCompile,
            Step::Fallback => OrchestratorState::Fallback,
            Step::Done(..) => OrchestratorState::Done,
        }
    }
}

/// Per-compile bookkeeping.
struct Walk<'a> {
    identity: &'a CompilerIdentity,
    arguments: &'a [String],
    options: &'a CompilationOptions,
    retry: bool,
    sink: &'a dyn MessageSink,
    failures: u32,
}

/// Routes compiles to the daemon or the in-process fallback.
pub struct CompileOrchestrator {
    registry: Arc<ConnectionRegistry>,
    fallback: FallbackCompiler,
    policy: DaemonPolicy,
    sink: Arc<dyn MessageSink>,
}

impl CompileOrchestrator {
    /// Creates an orchestrator reporting to stderr by default.
    pub fn new(registry: Arc<ConnectionRegistry>, fallback: FallbackCompiler, policy: DaemonPolicy) -> Self {
        Self {
            registry,
            fallback,
            policy,
            sink: Arc::new(TerminalSink::stderr(false)),
        }
    }

    /// Replaces the sink used by [`compile`](Self::compile).
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The daemon policy.
    pub fn policy(&self) -> &DaemonPolicy {
        &self.policy
    }

    /// Compiles, reporting to the orchestrator's own sink.
    pub fn compile(
        &self,
        identity: &CompilerIdentity,
        arguments: &[String],
        options: &CompilationOptions,
        retry_on_connection_error: bool,
    ) -> ExitStatus {
        let sink = Arc::clone(&self.sink);
        self.compile_with(identity, arguments, options, retry_on_connection_error, sink.as_ref())
    }

    /// Compiles, reporting to `sink`.
    pub fn compile_with(
        &self,
        identity: &CompilerIdentity,
        arguments: &[String],
        options: &CompilationOptions,
        retry_on_connection_error: bool,
        sink: &dyn MessageSink,
    ) -> ExitStatus {
        self.run(identity, arguments, options, retry_on_connection_error, sink)
            .status
    }

    /// Compiles and reports which path was taken.
    ///
    /// Never fails and never panics: any fault inside the orchestrator is
    /// reported as an exception message and yields [`ExitStatus::InternalError`].
    pub fn run(
        &self,
        identity: &CompilerIdentity,
        arguments: &[String],
        options: &CompilationOptions,
        retry_on_connection_error: bool,
        sink: &dyn MessageSink,
    ) -> CompileOutcome {
        let mut full_arguments = arguments.to_vec();
        full_arguments.extend(self.policy.additional_arguments.iter().cloned());

        sink.report(Message::new(
            ReportCategory::DaemonMessage,
            ReportSeverity::Info,
            format!("using compiler {identity}"),
        ));

        let mut walk = Walk {
            identity,
            arguments: &full_arguments,
            options,
            retry: retry_on_connection_error,
            sink,
            failures: 0,
        };
        let mut trail = vec![OrchestratorState::Start];

        match panic::catch_unwind(AssertUnwindSafe(|| self.drive(&mut walk, &mut trail))) {
            Ok((status, served_by)) => {
                info!(%status, ?served_by, "compile finished");
                CompileOutcome {
                    status,
                    served_by: Some(served_by),
                    trail,
                }
            }
            Err(_) => {
                warn!("compile orchestration panicked");
                sink.report(Message::exception("compile orchestration failed unexpectedly"));
                CompileOutcome {
                    status: ExitStatus::InternalError,
                    served_by: None,
                    trail,
                }
            }
        }
    }

    fn drive(&self, walk: &mut Walk<'_>, trail: &mut Vec<OrchestratorState>) -> (ExitStatus, ServedBy) {
        let mut step = Step::Start;
        loop {
            let next = self.advance(step, walk);
            let (from, to) = (trail.last().copied(), next.state());
            if let Some(from) = from {
                debug_assert!(is_legal_transition(from, to), "illegal transition {from} -> {to}");
                debug!(%from, %to, "orchestrator transition");
            }
            trail.push(to);
            if let Step::Done(status, served_by) = next {
                return (status, served_by);
            }
            step = next;
        }
    }

    fn advance(&self, step: Step, walk: &mut Walk<'_>) -> Step {
        match step {
            Step::Start => {
                if self.policy.enabled {
                    Step::Connecting
                } else {
                    debug!("compile daemon disabled, compiling in-process");
                    Step::Fallback
                }
            }
            Step::Connecting => match self.registry.acquire(walk.identity) {
                Ok(connection) => Step::SessionOpen(connection),
                Err(err) => self.connection_failed(&err, walk),
            },
            Step::SessionOpen(connection) => match connection.open_session() {
                Ok(session) => {
                    debug!(%session, "opened session");
                    Step::RemoteCompile(connection, session)
                }
                Err(err) => {
                    self.registry.invalidate(&connection);
                    self.connection_failed(&err, walk)
                }
            },
            Step::RemoteCompile(connection, session) => {
                match connection.compile(session, walk.arguments, walk.options, walk.sink) {
                    Ok(Some(status)) => {
                        self.release(&connection, session);
                        Step::Done(status, ServedBy::Daemon)
                    }
                    Ok(None) => {
                        warn!(%session, "daemon returned an unrecognised result, compiling in-process");
                        self.release(&connection, session);
                        self.registry.invalidate(&connection);
                        Step::Fallback
                    }
                    Err(err) => {
                        warn!(%session, error = %err, "remote compile failed, compiling in-process");
                        self.registry.invalidate(&connection);
                        Step::Fallback
                    }
                }
            }
            Step::Fallback => Step::Done(self.fallback.run(walk.arguments, walk.sink), ServedBy::Fallback),
            Step::Done(status, served_by) => Step::Done(status, served_by),
        }
    }

    fn connection_failed(&self, err: &ConnectionError, walk: &mut Walk<'_>) -> Step {
        walk.failures += 1;
        if walk.retry && walk.failures == 1 {
            info!(error = %err, "daemon connection failed, retrying");
            Step::Connecting
        } else {
            warn!(error = %err, failures = walk.failures, "daemon unavailable, compiling in-process");
            Step::Fallback
        }
    }

    fn release(&self, connection: &Connection, session: SessionId) {
        if let Err(err) = connection.release_session(session) {
            debug!(%session, error = %err, "failed to release session");
        }
    }
}
