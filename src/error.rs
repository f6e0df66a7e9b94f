//! This module defines all error types used throughout the application.

use crate::graph::VertexId;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why an input could not be linked to a previously observed output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnresolvedReason {
    /// The referenced transaction was never observed (or is fully spent)
    UnknownTransaction,
    /// The transaction is known but the output slot is absent (already spent)
    OutputNotFound,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnresolvedReason::UnknownTransaction => write!(f, "unknown transaction"),
            UnresolvedReason::OutputNotFound => write!(f, "output not found"),
        }
    }
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A record length field runs past the end of a container file
    #[error(
        "Malformed block file {file:?}: record at offset {offset} declares {declared} bytes but only {remaining} remain"
    )]
    MalformedFile {
        file: PathBuf,
        offset: usize,
        declared: u32,
        remaining: usize,
    },

    /// Block decoding errors
    #[error("Block decoding error: {0}")]
    Decode(String),

    /// Two live transactions share an identifier
    #[error("Duplicate transaction: {0} already has unspent outputs")]
    DuplicateTransaction(String),

    /// An input references an output that was not observed
    #[error("Unresolved input {tx_id}:{index} ({reason})")]
    UnresolvedInput {
        tx_id: String,
        index: u32,
        reason: UnresolvedReason,
    },

    /// Resume requested but no snapshot exists
    #[error("No snapshot found in {0:?}")]
    NoSnapshot(PathBuf),

    /// Reverse lookup of an identifier that was never assigned
    #[error("Vertex {0} has no address assigned")]
    Lookup(VertexId),

    /// Snapshot files are unreadable or inconsistent
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Binary (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Start or end file not present in the block directory
    #[error("Block file {name:?} not found in {dir:?}")]
    FileNotFound { name: String, dir: PathBuf },

    /// Restored state does not line up with the scanned block files
    #[error("Resume mismatch: {0}")]
    ResumeMismatch(String),

    /// Graph analysis errors
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Generic error with custom message
    #[error("{0}")]
    Custom(String),

    /// Wrapped anyhow errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a custom error with a message
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create a decoding error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a snapshot error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Only unresolved inputs are absorbed by the builder; everything else ends the run
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::UnresolvedInput { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {}", err))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(format!("bincode error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::custom("test error");
        assert_eq!(err.to_string(), "test error");

        let err = Error::DuplicateTransaction("abc".to_string());
        assert_eq!(
            err.to_string(),
            "Duplicate transaction: abc already has unspent outputs"
        );
    }

    #[test]
    fn test_recoverable() {
        let err = Error::UnresolvedInput {
            tx_id: "t1".to_string(),
            index: 0,
            reason: UnresolvedReason::UnknownTransaction,
        };
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "Unresolved input t1:0 (unknown transaction)");

        assert!(!Error::Lookup(7).is_recoverable());
        assert!(!Error::NoSnapshot(PathBuf::from("out")).is_recoverable());
    }
}
