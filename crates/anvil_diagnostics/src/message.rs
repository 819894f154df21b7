//! A single reported message.

use serde::{Deserialize, Serialize};

use crate::category::ReportCategory;
use crate::severity::ReportSeverity;

/// A message delivered to the caller, from either the daemon or the fallback run.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Where the message originates.
    pub category: ReportCategory,
    /// How severe it is.
    pub severity: ReportSeverity,
    /// The message text, one logical line.
    pub text: String,
}

impl Message {
    /// Creates a message.
    pub fn new(category: ReportCategory, severity: ReportSeverity, text: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            text: text.into(),
        }
    }

    /// A compiler diagnostic.
    pub fn compiler(severity: ReportSeverity, text: impl Into<String>) -> Self {
        Self::new(ReportCategory::CompilerMessage, severity, text)
    }

    /// One line of compiler console output.
    ///
    /// Console lines are compiler messages at `Info`, so the default filter
    /// admits them whichever path ran the compiler.
    pub fn console(text: impl Into<String>) -> Self {
        Self::new(ReportCategory::CompilerMessage, ReportSeverity::Info, text)
    }

    /// An unexpected failure.
    pub fn exception(text: impl Into<String>) -> Self {
        Self::new(ReportCategory::Exception, ReportSeverity::Error, text)
    }
}
