//! Error types shared by the transport, session and driver layers.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionState;

/// Errors raised while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the byte transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port could not be opened (missing device, busy, bad baud rate).
    #[error("could not open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// A read or write failed for a reason other than timeout expiry.
    #[error("serial I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
}

/// Fatal errors detected before any device interaction.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is the wrong size: expected {expected} bytes, got {actual}", .path.display())]
    WrongSize {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("{}:{line}: expected at least 3 columns, got {columns}", .path.display())]
    MalformedRow {
        path: PathBuf,
        line: usize,
        columns: usize,
    },

    #[error("no test cases found in {}", .0.display())]
    EmptyDataset(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Reasons a required marker could not be extracted from a device response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Fewer than two timestamps were found in either marker family.
    #[error("expected at least 2 timestamp markers, found {found}")]
    MissingTimestamps { found: usize },

    #[error("no `m-results-s[...]` text marker in response")]
    MissingResultText,

    #[error("no `m-results-[...]` value marker in response")]
    MissingResultValues,

    /// A result value does not fit in a signed 8-bit integer.
    #[error("result value `{0}` is not a signed 8-bit integer")]
    ValueOutOfRange(String),
}

/// Coarse classification of a [`SessionError`], used for run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    Setup,
    Transport,
    Transfer,
    Timeout,
    Parse,
}

/// Errors raised while driving the device through one test case.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No terminator arrived before the deadline.
    #[error("timed out waiting for {awaiting:?} after `{command}` ({} bytes captured)", .captured.len())]
    Timeout {
        command: String,
        awaiting: String,
        captured: String,
    },

    /// An upload acknowledgment was missing; the upload was abandoned.
    /// `chunk` is 1-based, with 0 standing for the `db load` announcement.
    #[error(
        "upload aborted at chunk {chunk} of {total_chunks} ({bytes_acked} of {total_bytes} bytes acknowledged)"
    )]
    Transfer {
        chunk: usize,
        total_chunks: usize,
        bytes_acked: usize,
        total_bytes: usize,
        captured: String,
    },

    /// A required marker was absent; `raw` holds the full response.
    #[error("could not parse device response: {reason}")]
    Parse { reason: ParseError, raw: String },

    #[error("cannot {action} while the session is {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    /// A per-case input problem (unreadable file, wrong payload size).
    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl SessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SessionError::Transport(_) | SessionError::InvalidState { .. } => FailureKind::Transport,
            SessionError::Timeout { .. } => FailureKind::Timeout,
            SessionError::Transfer { .. } => FailureKind::Transfer,
            SessionError::Parse { .. } => FailureKind::Parse,
            SessionError::Setup(_) => FailureKind::Setup,
        }
    }

    /// Whatever the device sent before the failure, if anything was captured.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            SessionError::Timeout { captured, .. } | SessionError::Transfer { captured, .. } => {
                Some(captured)
            }
            SessionError::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
