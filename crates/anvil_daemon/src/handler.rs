//! Per-connection request handling.

use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anvil_cache::{Cache, IncrementalPlanner, RebuildDirective};
use anvil_common::{CompilerIdentity, ExitStatus};
use anvil_diagnostics::{Message, MessageSink, ReportCategory, ReportSeverity, ReportingFilter};
use anvil_protocol::{
    read_frame, write_frame, CompilationOptions, IncrementalCompilationOptions, ProtocolError, Reply, Request,
    SessionId, PROTOCOL_VERSION,
};
use tracing::{debug, info, warn};

use crate::error::DaemonError;
use crate::server::DaemonState;

/// Serves one client connection until it closes.
///
/// Sessions opened on the connection are released when it ends.
pub(crate) fn handle_connection(mut stream: TcpStream, state: &DaemonState) -> Result<(), DaemonError> {
    let marker = match read_frame::<_, Request>(&mut stream)? {
        Request::Handshake {
            protocol_version,
            identity,
            marker,
        } => {
            if let Some(reason) = handshake_refusal(&state.identity, protocol_version, &identity) {
                info!(%reason, "rejecting client");
                write_frame(
                    &mut stream,
                    &Reply::Handshake {
                        accepted: false,
                        reason: Some(reason),
                    },
                )?;
                return Ok(());
            }
            write_frame(
                &mut stream,
                &Reply::Handshake {
                    accepted: true,
                    reason: None,
                },
            )?;
            marker
        }
        _ => {
            write_frame(
                &mut stream,
                &Reply::Error {
                    reason: "expected a handshake".to_string(),
                },
            )?;
            return Ok(());
        }
    };
    debug!(marker = %marker.display(), "client connected");

    let mut opened = Vec::new();
    let result = serve_requests(&mut stream, state, &marker, &mut opened);
    for id in opened {
        state.sessions.release(id);
    }
    match result {
        Err(ProtocolError::Closed) => Ok(()),
        Err(err) => Err(err.into()),
        Ok(()) => Ok(()),
    }
}

/// Why a handshake is refused, if it is.
fn handshake_refusal(ours: &CompilerIdentity, protocol_version: u32, theirs: &CompilerIdentity) -> Option<String> {
    if protocol_version != PROTOCOL_VERSION {
        return Some(format!(
            "protocol version {protocol_version} is not supported (daemon speaks {PROTOCOL_VERSION})"
        ));
    }
    if theirs != ours {
        return Some(format!("daemon runs compiler {ours}, client expects {theirs}"));
    }
    None
}

fn serve_requests(
    stream: &mut TcpStream,
    state: &DaemonState,
    marker: &Path,
    opened: &mut Vec<SessionId>,
) -> Result<(), ProtocolError> {
    loop {
        let reply = match read_frame::<_, Request>(stream)? {
            Request::OpenSession => {
                let id = state.sessions.open(marker);
                opened.push(id);
                Reply::Session { id }
            }
            Request::Compile {
                session,
                arguments,
                options,
            } => {
                if !state.sessions.contains(session) {
                    Reply::Error {
                        reason: format!("unknown {session}"),
                    }
                } else {
                    let status = compile(stream, state, &arguments, &options)?;
                    Reply::Done {
                        exit_code: status.code(),
                    }
                }
            }
            Request::ReleaseSession { session } => {
                state.sessions.release(session);
                opened.retain(|id| *id != session);
                Reply::Released
            }
            Request::Handshake { .. } => Reply::Error {
                reason: "connection already established".to_string(),
            },
        };
        write_frame(stream, &reply)?;
    }
}

/// Streams messages the client asked for as they are produced.
struct FrameSink {
    stream: Mutex<TcpStream>,
    filter: ReportingFilter,
    error: Mutex<Option<ProtocolError>>,
}

impl FrameSink {
    fn new(stream: TcpStream, filter: ReportingFilter) -> Self {
        Self {
            stream: Mutex::new(stream),
            filter,
            error: Mutex::new(None),
        }
    }

    fn take_error(&self) -> Option<ProtocolError> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl MessageSink for FrameSink {
    fn report(&self, message: Message) {
        if !self.filter.accepts(message.category, message.severity) {
            return;
        }
        let mut error = self.error.lock().unwrap_or_else(|e| e.into_inner());
        if error.is_some() {
            return;
        }
        let mut stream = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        let frame = Reply::Message {
            category: message.category.code(),
            severity: message.severity.code(),
            text: message.text,
        };
        if let Err(err) = write_frame(&mut *stream, &frame) {
            *error = Some(err);
        }
    }
}

fn compile(
    stream: &TcpStream,
    state: &DaemonState,
    arguments: &[String],
    options: &CompilationOptions,
) -> Result<ExitStatus, ProtocolError> {
    let sink = FrameSink::new(stream.try_clone()?, options.reporting_filter());
    info!(
        mode = options.compiler_mode.name(),
        target = %options.target_platform,
        args = arguments.len(),
        "compiling"
    );

    let planned = options
        .incremental
        .as_ref()
        .and_then(|ic| plan(state, ic, arguments, &sink).map(|p| (ic, p)));

    let status = state.compiler.run(arguments, &sink);
    if let Some(err) = sink.take_error() {
        return Err(err);
    }

    if let Some((ic, (mut cache, compiled))) = planned {
        if status.is_ok() {
            cache.record_compiled(&compiled);
            if let Err(err) = cache.save() {
                warn!(error = %err, "failed to save incremental cache");
            }
            if let Err(err) = IncrementalPlanner::commit(ic) {
                warn!(error = %err, "failed to record cache version");
            }
        }
    }
    info!(%status, "compile finished");
    Ok(status)
}

/// Runs the incremental planner and reports its decision.
///
/// Returns the cache and the sources that will count as compiled on success.
fn plan(
    state: &DaemonState,
    ic: &IncrementalCompilationOptions,
    arguments: &[String],
    sink: &FrameSink,
) -> Option<(Cache, Vec<PathBuf>)> {
    let mut cache = Cache::load_or_create(&ic.working_dir, &state.identity.key());
    let sources: Vec<PathBuf> = arguments
        .iter()
        .map(PathBuf::from)
        .filter(|p| p.is_file())
        .collect();
    let scan = cache.scanner(sources.clone());

    match IncrementalPlanner::plan(ic, &mut cache, &scan) {
        Ok(directive) => {
            let (text, compiled) = match directive {
                RebuildDirective::Full { reason } => (format!("full rebuild: {reason}"), sources),
                RebuildDirective::Incremental { dirty, removed } => (
                    format!("incremental rebuild: {} dirty, {} removed", dirty.len(), removed.len()),
                    dirty,
                ),
            };
            sink.report(Message::new(ReportCategory::IcMessage, ReportSeverity::Info, text));
            Some((cache, compiled))
        }
        Err(err) => {
            warn!(error = %err, "incremental planning failed");
            sink.report(Message::new(
                ReportCategory::IcMessage,
                ReportSeverity::Warning,
                format!("incremental planning failed: {err}"),
            ));
            None
        }
    }
}
