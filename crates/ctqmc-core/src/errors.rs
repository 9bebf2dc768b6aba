//! Structured error types shared across CT-QMC crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code, message and diagnostics carried by every [`QmcError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Kebab-case code such as `checkpoint-key`; tests match on it.
    pub code: String,
    /// What went wrong.
    pub message: String,
    /// Offending values keyed by name (`path`, `beta`, `site`).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// How to recover, when there is a known way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Payload with a stable code and a message, without context or hint.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Records one offending value.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attaches a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Error families of the engine; the payload says what exactly failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum QmcError {
    /// Invalid run parameters or input tables.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Checkpoint incompatible with the current run.
    #[error("checkpoint error: {0}")]
    Checkpoint(ErrorInfo),
    /// Local trace state that violates the segment invariants.
    #[error("trace error: {0}")]
    Trace(ErrorInfo),
    /// Hybridization matrix failures (singular rebuilds, lost operators).
    #[error("bath error: {0}")]
    Bath(ErrorInfo),
    /// Filesystem errors.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

// message [code] (key=value key=value); hint
impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.message, self.code)?;
        let mut pairs = self.context.iter();
        if let Some((key, value)) = pairs.next() {
            write!(f, " ({key}={value}")?;
            for (key, value) in pairs {
                write!(f, " {key}={value}")?;
            }
            f.write_str(")")?;
        }
        match &self.hint {
            Some(hint) => write!(f, "; {hint}"),
            None => Ok(()),
        }
    }
}

impl QmcError {
    /// Payload of any family.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            QmcError::Config(info)
            | QmcError::Checkpoint(info)
            | QmcError::Trace(info)
            | QmcError::Bath(info)
            | QmcError::Io(info)
            | QmcError::Serde(info) => info,
        }
    }

    /// I/O failure on `path`.
    pub fn io(code: &str, path: &Path, err: std::io::Error) -> Self {
        QmcError::Io(ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()))
    }

    /// Encoding or decoding failure of the document at `path`.
    pub fn serde(code: &str, path: &Path, err: impl Display) -> Self {
        QmcError::Serde(ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()))
    }
}
