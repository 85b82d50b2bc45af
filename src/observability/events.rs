//! Observable events of the query lifecycle

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Interpreter constructed and output schema known
    SelectPlanned,
    /// Planning failed
    SelectRejected,
    /// Pipeline built over the scan streams
    SelectExecute,
    /// A set for IN was filled
    SetCreated,
    /// Table structure read lock taken
    TableLocked,
    /// Storage reached a later stage than fetching columns
    StageSkipped,
    /// Result stream dropped before it was exhausted
    StreamCancelled,
    /// Result stream ended with an execution error
    StreamFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::SelectPlanned => "SELECT_PLANNED",
            Event::SelectRejected => "SELECT_REJECTED",
            Event::SelectExecute => "SELECT_EXECUTE",
            Event::SetCreated => "SET_CREATED",
            Event::TableLocked => "TABLE_LOCKED",
            Event::StageSkipped => "STAGE_SKIPPED",
            Event::StreamCancelled => "STREAM_CANCELLED",
            Event::StreamFailed => "STREAM_FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::SelectRejected | Event::StreamCancelled => Severity::Warn,
            Event::StreamFailed => Severity::Error,
            Event::TableLocked | Event::StageSkipped => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
