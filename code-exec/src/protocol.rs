//! JSON-lines protocol spoken between the host and interpreter workers.

use serde::{Deserialize, Serialize};

use crate::error::{CodeErrorKind, Error};

/// One unit of work sent to a worker
#[derive(Debug, Serialize)]
pub struct Job<'a> {
    pub id: u64,
    pub code: &'a str,
}

/// Error classification as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireErrorKind {
    Compile,
    Runtime,
    /// Interpreter ran out of memory against a backstop limit
    Memory,
}

impl WireErrorKind {
    pub fn code_error_kind(self) -> CodeErrorKind {
        match self {
            WireErrorKind::Compile => CodeErrorKind::Compile,
            WireErrorKind::Runtime | WireErrorKind::Memory => CodeErrorKind::Runtime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    Ready { runtime: String },
    InitFailed { message: String },
    Stdout { id: u64, data: String },
    Error { id: u64, kind: WireErrorKind, message: String },
    Done { id: u64 },
}

impl WorkerEvent {
    pub fn parse(line: &str) -> Result<Self, Error> {
        serde_json::from_str(line)
            .map_err(|e| Error::Protocol(format!("Malformed worker message ({}): {}", e, line)))
    }
}

pub fn encode_job(id: u64, code: &str) -> Result<String, Error> {
    Ok(serde_json::to_string(&Job { id, code })?)
}
