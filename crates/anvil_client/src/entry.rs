//! Concrete compiler entry points.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus as ProcessStatus, Stdio};

use anvil_common::{AnvilResult, ExitStatus, ForeignResult, InternalError};
use tracing::debug;

use crate::fallback::EntryPoint;

/// An entry point backed by a closure.
///
/// The closure may return anything with a symbolic name; the result is boxed and
/// decoded by name like any other foreign result.
pub struct FnEntryPoint<F> {
    f: F,
}

impl<F> FnEntryPoint<F> {
    /// Wraps `f`.
    pub fn new<R>(f: F) -> Self
    where
        F: Fn(&[String], &mut dyn Write) -> R + Send + Sync,
        R: ForeignResult + 'static,
    {
        Self { f }
    }
}

impl<F, R> EntryPoint for FnEntryPoint<F>
where
    F: Fn(&[String], &mut dyn Write) -> R + Send + Sync,
    R: ForeignResult + 'static,
{
    fn exec(&self, arguments: &[String], out: &mut dyn Write) -> AnvilResult<Option<Box<dyn ForeignResult>>> {
        Ok(Some(Box::new((self.f)(arguments, out))))
    }
}

/// The result of running the compiler as a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessResult {
    code: Option<i32>,
}

impl ProcessResult {
    /// Wraps a raw exit code; `None` means the process was killed by a signal.
    pub fn new(code: Option<i32>) -> Self {
        Self { code }
    }

    fn from_status(status: ProcessStatus) -> Self {
        Self::new(status.code())
    }
}

impl ForeignResult for ProcessResult {
    fn symbolic_name(&self) -> String {
        match self.code {
            Some(code) => ExitStatus::from_code(code)
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| format!("EXIT_{code}")),
            None => "SIGNALED".to_string(),
        }
    }
}

/// Runs the configured compiler executable as a child process.
///
/// Standard output and standard error are captured and written to the
/// entry point's output in that order.
#[derive(Debug, Clone)]
pub struct CommandEntryPoint {
    program: PathBuf,
}

impl CommandEntryPoint {
    /// Runs `program` for every compile.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// The compiler executable.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl EntryPoint for CommandEntryPoint {
    fn exec(&self, arguments: &[String], out: &mut dyn Write) -> AnvilResult<Option<Box<dyn ForeignResult>>> {
        debug!(program = %self.program.display(), args = arguments.len(), "running compiler");
        let output = Command::new(&self.program)
            .args(arguments)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| InternalError::new(format!("failed to run {}: {e}", self.program.display())))?;
        out.write_all(&output.stdout)?;
        out.write_all(&output.stderr)?;
        Ok(Some(Box::new(ProcessResult::from_status(output.status))))
    }
}
