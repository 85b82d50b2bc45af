//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` first, `severity` second, remaining fields sorted by key
//! - Lines below the configured severity are dropped
//! - Written synchronously to stderr so stdout stays free for results

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Per-step detail
    Trace = 0,
    /// Normal query lifecycle
    Info = 1,
    /// Rejected or cancelled queries
    Warn = 2,
    /// Execution failures
    Error = 3,
    /// Unrecoverable
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured logger bound to a minimum severity and, optionally, a query
#[derive(Debug, Clone)]
pub struct Logger {
    min_severity: Severity,
    query_id: Option<String>,
}

impl Logger {
    pub fn new(min_severity: Severity) -> Self {
        Self {
            min_severity,
            query_id: None,
        }
    }

    /// Same logger, stamping every line with `query_id`
    pub fn for_query(&self, query_id: impl Into<String>) -> Self {
        Self {
            min_severity: self.min_severity,
            query_id: Some(query_id.into()),
        }
    }

    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    /// Logs an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !self.enabled(severity) {
            return;
        }
        let line = self.render(severity, event, fields);
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }

    pub fn trace(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Trace, event, fields);
    }

    pub fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    pub fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    pub fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }

    /// Renders one JSON line
    pub fn render(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(256);
        output.push('{');
        push_pair(&mut output, "event", event);
        output.push(',');
        push_pair(&mut output, "severity", severity.as_str());

        let mut sorted: Vec<(&str, &str)> = fields.to_vec();
        if let Some(query_id) = &self.query_id {
            sorted.push(("query_id", query_id));
        }
        sorted.sort_by_key(|(k, _)| *k);
        for (key, value) in sorted {
            output.push(',');
            push_pair(&mut output, key, value);
        }

        output.push('}');
        output.push('\n');
        output
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Severity::Warn)
    }
}

fn push_pair(output: &mut String, key: &str, value: &str) {
    // serializing a &str cannot fail
    output.push_str(&serde_json::to_string(key).unwrap_or_default());
    output.push(':');
    output.push_str(&serde_json::to_string(value).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_render_json_shape() {
        let logger = Logger::new(Severity::Trace).for_query("q-1");
        let line = logger.render(Severity::Info, "SELECT_PLANNED", &[("stage", "Complete")]);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "SELECT_PLANNED");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["query_id"], "q-1");
        assert_eq!(parsed["stage"], "Complete");
        assert!(line.find("\"event\"").unwrap() < line.find("\"severity\"").unwrap());
    }

    #[test]
    fn test_render_sorted_fields() {
        let logger = Logger::default();
        let a = logger.render(Severity::Warn, "E", &[("zebra", "1"), ("apple", "2")]);
        let b = logger.render(Severity::Warn, "E", &[("apple", "2"), ("zebra", "1")]);
        assert_eq!(a, b);
        assert!(a.find("apple").unwrap() < a.find("zebra").unwrap());
    }

    #[test]
    fn test_render_escapes() {
        let line = Logger::default().render(Severity::Warn, "E", &[("reason", "a \"b\"\nc")]);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["reason"], "a \"b\"\nc");
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_severity_gate() {
        let logger = Logger::new(Severity::Warn);
        assert!(!logger.enabled(Severity::Info));
        assert!(logger.enabled(Severity::Error));
    }

    #[test]
    fn test_severity_from_settings_json() {
        let severity: Severity = serde_json::from_str("\"trace\"").unwrap();
        assert_eq!(severity, Severity::Trace);
    }
}
