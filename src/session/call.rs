// ABOUTME: Diagnostic call records attached to every session operation
//
// A Call names an operation, records when it started and finished, the error
// it ended with (if any) and the records of the sub-calls it made. Records are
// observational only and never influence control flow.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::SessionResult;

/// Diagnostic record of one operation and its nested sub-calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    /// Operation label, e.g. `Limiter.Vector`
    pub name: String,
    /// When the operation began
    pub started: DateTime<Utc>,
    /// When the operation completed, if it has
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    /// Error the operation ended with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Records of nested operations, in the order they ran
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<Call>,
}

impl Call {
    /// Start a new record
    pub fn begin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Utc::now(),
            finished: None,
            error: None,
            calls: Vec::new(),
        }
    }

    /// Attach the record of a sub-call
    pub fn add(&mut self, call: Call) {
        self.calls.push(call);
    }

    /// Mark the record complete with the outcome of the operation
    pub fn complete<T>(&mut self, result: &SessionResult<T>) {
        self.finished = Some(Utc::now());
        self.error = result.as_ref().err().map(ToString::to_string);
    }

    /// Complete the record and pair it with the outcome
    pub fn traced<T>(mut self, result: SessionResult<T>) -> Traced<T> {
        self.complete(&result);
        Traced { result, call: self }
    }

    /// Wall-clock time between begin and completion
    pub fn duration(&self) -> Duration {
        self.finished
            .and_then(|finished| (finished - self.started).to_std().ok())
            .unwrap_or_default()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{} {:?}", "", self.name, self.duration(), indent = depth * 2)?;
        if let Some(error) = &self.error {
            write!(f, " error: {error}")?;
        }
        for call in &self.calls {
            writeln!(f)?;
            call.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

/// Outcome of a session operation together with its call record
#[derive(Debug, Clone)]
pub struct Traced<T> {
    /// Value or error produced by the operation
    pub result: SessionResult<T>,
    /// Diagnostic record of the operation
    pub call: Call,
}

impl<T> Traced<T> {
    /// Discard the diagnostics
    pub fn into_result(self) -> SessionResult<T> {
        self.result
    }
}
