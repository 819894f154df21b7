//! In-process fallback compilation.
//!
//! The fallback runs the compiler through an [`EntryPoint`] in a fresh context
//! for every request. Whatever the entry point prints is buffered and replayed,
//! one message per line, once the run is over. The value it returns is foreign:
//! only its symbolic name is trusted, and that name is resolved against the
//! local [`ExitStatus`] vocabulary.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anvil_common::{AnvilResult, ExitStatus, ForeignResult};
use anvil_diagnostics::{Message, MessageSink};
use tracing::{debug, warn};

/// A way to invoke the compiler directly.
pub trait EntryPoint: Send + Sync {
    /// Runs one compile, writing console output to `out`.
    ///
    /// `Ok(None)` means the compiler finished without producing a result value.
    fn exec(&self, arguments: &[String], out: &mut dyn Write) -> AnvilResult<Option<Box<dyn ForeignResult>>>;
}

/// Resolves a foreign result by its symbolic name.
///
/// A missing result or a name outside the vocabulary is an internal error.
pub fn decode_result(result: Option<&dyn ForeignResult>) -> ExitStatus {
    let Some(result) = result else {
        warn!("compiler returned no result");
        return ExitStatus::InternalError;
    };
    let name = result.symbolic_name();
    ExitStatus::from_name(&name).unwrap_or_else(|| {
        warn!(%name, "compiler returned an unrecognised result");
        ExitStatus::InternalError
    })
}

/// Compiles without a daemon.
#[derive(Clone)]
pub struct FallbackCompiler {
    entry: Arc<dyn EntryPoint>,
}

impl FallbackCompiler {
    /// Creates a fallback compiler over `entry`.
    pub fn new(entry: Arc<dyn EntryPoint>) -> Self {
        Self { entry }
    }

    /// Runs the compiler, then replays its output to `sink`.
    ///
    /// Never fails: an entry point error or panic is reported as an exception
    /// message and yields [`ExitStatus::InternalError`].
    pub fn run(&self, arguments: &[String], sink: &dyn MessageSink) -> ExitStatus {
        let mut buffer = Vec::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.entry.exec(arguments, &mut buffer)));

        let (status, failure) = match outcome {
            Ok(Ok(result)) => (decode_result(result.as_deref()), None),
            Ok(Err(err)) => (ExitStatus::InternalError, Some(err.to_string())),
            Err(payload) => {
                let what = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                (ExitStatus::InternalError, Some(format!("compiler panicked: {what}")))
            }
        };

        let output = String::from_utf8_lossy(&buffer);
        let mut lines = 0usize;
        for line in output.lines() {
            sink.report(Message::console(line));
            lines += 1;
        }
        if let Some(failure) = failure {
            warn!(%failure, "in-process compile failed");
            sink.report(Message::exception(failure));
        }
        debug!(%status, lines, "in-process compile finished");
        status
    }
}
