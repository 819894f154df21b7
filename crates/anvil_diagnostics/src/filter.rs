//! Verbosity-to-filter codec.
//!
//! The filter travels to the daemon as raw integer codes, so a daemon built from
//! a different checkout can still decode it. Codes it does not recognise are
//! carried but never match anything.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::category::ReportCategory;
use crate::message::Message;
use crate::severity::ReportSeverity;
use crate::sink::MessageSink;

/// Which messages should cross the process boundary.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ReportingFilter {
    /// Admitted category codes.
    pub categories: BTreeSet<i32>,
    /// Least severe admitted severity code.
    pub min_severity: i32,
}

impl ReportingFilter {
    /// Encodes a verbosity flag.
    ///
    /// Non-verbose builds see compiler messages and exceptions at `Info` and
    /// above; verbose builds see every category down to `Debug`.
    pub fn encode(verbose: bool) -> Self {
        if verbose {
            Self {
                categories: ReportCategory::ALL.iter().map(|c| c.code()).collect(),
                min_severity: ReportSeverity::Debug.code(),
            }
        } else {
            Self {
                categories: [ReportCategory::CompilerMessage, ReportCategory::Exception]
                    .iter()
                    .map(|c| c.code())
                    .collect(),
                min_severity: ReportSeverity::Info.code(),
            }
        }
    }

    /// Returns `true` if a message with this category and severity passes.
    pub fn accepts(&self, category: ReportCategory, severity: ReportSeverity) -> bool {
        self.categories.contains(&category.code()) && severity.code() <= self.min_severity
    }
}

/// Forwards only the messages a [`ReportingFilter`] admits.
///
/// Applies on the client the same rule the daemon applies before sending.
pub struct FilteringSink<'a> {
    filter: ReportingFilter,
    inner: &'a dyn MessageSink,
}

impl<'a> FilteringSink<'a> {
    /// Wraps `inner`.
    pub fn new(filter: ReportingFilter, inner: &'a dyn MessageSink) -> Self {
        Self { filter, inner }
    }
}

impl MessageSink for FilteringSink<'_> {
    fn report(&self, message: Message) {
        if self.filter.accepts(message.category, message.severity) {
            self.inner.report(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_encoding() {
        let f = ReportingFilter::encode(false);
        assert_eq!(f.categories, BTreeSet::from([0, 1]));
        assert_eq!(f.min_severity, ReportSeverity::Info.code());
    }

    #[test]
    fn verbose_encoding() {
        let f = ReportingFilter::encode(true);
        let all: BTreeSet<i32> = ReportCategory::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(f.categories, all);
        assert_eq!(f.min_severity, ReportSeverity::Debug.code());
    }

    #[test]
    fn quiet_filter_drops_debug_and_output() {
        let f = ReportingFilter::encode(false);
        assert!(f.accepts(ReportCategory::CompilerMessage, ReportSeverity::Error));
        assert!(f.accepts(ReportCategory::Exception, ReportSeverity::Info));
        assert!(!f.accepts(ReportCategory::CompilerMessage, ReportSeverity::Debug));
        assert!(!f.accepts(ReportCategory::OutputMessage, ReportSeverity::Error));
        assert!(!f.accepts(ReportCategory::IcMessage, ReportSeverity::Info));
    }

    #[test]
    fn filtering_sink_drops_rejected_messages() {
        let collector = crate::MessageCollector::new();
        let sink = FilteringSink::new(ReportingFilter::encode(false), &collector);
        sink.report(Message::new(ReportCategory::DaemonMessage, ReportSeverity::Info, "using compiler"));
        sink.report(Message::console("compiling"));
        assert_eq!(collector.texts(), vec!["compiling"]);
    }

    #[test]
    fn unknown_codes_are_ignored() {
        let f = ReportingFilter {
            categories: BTreeSet::from([0, 77]),
            min_severity: 2,
        };
        assert!(f.accepts(ReportCategory::CompilerMessage, ReportSeverity::Info));
        assert!(!f.accepts(ReportCategory::Exception, ReportSeverity::Info));
    }

    #[test]
    fn serde_uses_plain_integers() {
        let json = serde_json::to_string(&ReportingFilter::encode(false)).unwrap();
        assert_eq!(json, r#"{"categories":[0,1],"min_severity":2}"#);
    }
}
