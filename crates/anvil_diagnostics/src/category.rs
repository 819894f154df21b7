//! Report categories with stable wire codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a reported message originates.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ReportCategory {
    /// Diagnostics produced by the compiler itself.
    CompilerMessage,
    /// Unexpected failures (stack traces, internal errors).
    Exception,
    /// Messages from the daemon about its own operation.
    DaemonMessage,
    /// Incremental compilation bookkeeping.
    IcMessage,
    /// Raw compiler console output.
    OutputMessage,
}

impl ReportCategory {
    /// Every category, in code order.
    pub const ALL: [ReportCategory; 5] = [
        ReportCategory::CompilerMessage,
        ReportCategory::Exception,
        ReportCategory::DaemonMessage,
        ReportCategory::IcMessage,
        ReportCategory::OutputMessage,
    ];

    /// Stable wire code.
    pub fn code(self) -> i32 {
        match self {
            ReportCategory::CompilerMessage => 0,
            ReportCategory::Exception => 1,
            ReportCategory::DaemonMessage => 2,
            ReportCategory::IcMessage => 3,
            ReportCategory::OutputMessage => 4,
        }
    }

    /// Resolves a wire code, returning `None` for codes this build doesn't know.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportCategory::CompilerMessage => "compiler",
            ReportCategory::Exception => "exception",
            ReportCategory::DaemonMessage => "daemon",
            ReportCategory::IcMessage => "incremental",
            ReportCategory::OutputMessage => "output",
        };
        f.write_str(name)
    }
}

impl From<ReportCategory> for i32 {
    fn from(category: ReportCategory) -> Self {
        category.code()
    }
}

impl TryFrom<i32> for ReportCategory {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, String> {
        ReportCategory::from_code(code).ok_or_else(|| format!("unknown report category code {code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_dense_and_stable() {
        let codes: Vec<i32> = ReportCategory::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(ReportCategory::from_code(5), None);
        assert_eq!(ReportCategory::from_code(1), Some(ReportCategory::Exception));
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_string(&ReportCategory::IcMessage).unwrap(), "3");
        let back: ReportCategory = serde_json::from_str("4").unwrap();
        assert_eq!(back, ReportCategory::OutputMessage);
    }
}
