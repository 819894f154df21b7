//! Message severities with stable wire codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The severity of a reported message.
///
/// Ordered from most severe (`Error`) to least severe (`Debug`); the derived
/// ordering follows the wire code, so a filter admitting "up to `Info`" admits
/// everything that compares `<= Info`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ReportSeverity {
    /// A problem that fails the build.
    Error,
    /// A potential problem that does not fail the build.
    Warning,
    /// Informational output.
    Info,
    /// Verbose tracing output.
    Debug,
}

impl ReportSeverity {
    /// Stable wire code.
    pub fn code(self) -> i32 {
        match self {
            ReportSeverity::Error => 0,
            ReportSeverity::Warning => 1,
            ReportSeverity::Info => 2,
            ReportSeverity::Debug => 3,
        }
    }

    /// Resolves a wire code, returning `None` for codes this build doesn't know.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ReportSeverity::Error),
            1 => Some(ReportSeverity::Warning),
            2 => Some(ReportSeverity::Info),
            3 => Some(ReportSeverity::Debug),
            _ => None,
        }
    }

    /// Returns `true` if this severity is [`Error`](ReportSeverity::Error).
    pub fn is_error(self) -> bool {
        self == ReportSeverity::Error
    }
}

impl fmt::Display for ReportSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportSeverity::Error => write!(f, "error"),
            ReportSeverity::Warning => write!(f, "warning"),
            ReportSeverity::Info => write!(f, "info"),
            ReportSeverity::Debug => write!(f, "debug"),
        }
    }
}

impl From<ReportSeverity> for i32 {
    fn from(severity: ReportSeverity) -> Self {
        severity.code()
    }
}

impl TryFrom<i32> for ReportSeverity {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, String> {
        ReportSeverity::from_code(code).ok_or_else(|| format!("unknown severity code {code}"))
    }
}
