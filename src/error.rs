//! Engine Errors
//!
//! Typed failures surfaced at the public boundary. The matching solver itself never returns
//! errors: any inconsistency there is a bug and trips a debug assertion instead.
//!

use std::fmt;

use serde::{Deserialize, Serialize};

/// All the errors a pairing request can surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingError {
    /// the current round has no pairing satisfying the absolute criteria
    NoValidPairing(String),
    /// the chosen rule family cannot accommodate a configured option
    UnapplicableFeature(String),
    /// a counter or accumulator would exceed a configured build maximum
    BuildLimitExceeded(String),
}

impl fmt::Display for PairingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingError::NoValidPairing(reason) => write!(f, "no valid pairing: {}", reason),
            PairingError::UnapplicableFeature(reason) => {
                write!(f, "unapplicable feature: {}", reason)
            }
            PairingError::BuildLimitExceeded(reason) => {
                write!(f, "build limit exceeded: {}", reason)
            }
        }
    }
}

impl std::error::Error for PairingError {}

/// Errors from the TRF and configuration readers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    /// the file could not be read from the filesystem
    Read(String),
    /// the file contents are malformed
    Format(String),
    /// the file is well-formed but exceeds a build limit
    Limit(String),
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::Read(reason) => write!(f, "error reading file: {}", reason),
            FileError::Format(reason) => write!(f, "error parsing file: {}", reason),
            FileError::Limit(reason) => write!(f, "build limit exceeded: {}", reason),
        }
    }
}

impl std::error::Error for FileError {}

impl From<std::io::Error> for FileError {
    fn from(error: std::io::Error) -> Self {
        FileError::Read(error.to_string())
    }
}
