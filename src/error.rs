//! Error types for snapgrid.

use std::fmt;
use std::io;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SnapError>;

/// Errors produced while building or querying a grid index.
#[derive(Debug)]
pub enum SnapError {
    /// Underlying read or write failure.
    Io(io::Error),
    /// The index files do not have the expected structure: wrong file
    /// size, a directory entry pointing beyond EOF, or a bucket with no
    /// terminator before EOF.
    IndexCorrupt(String),
    /// A coordinate outside the world bounds was passed to the builder
    /// or the reader.
    InvalidCoordinate { lat: i32, lon: i32 },
    /// Invalid caller-supplied input, such as a reserved node id.
    InvalidInput(String),
}

impl fmt::Display for SnapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::IndexCorrupt(msg) => write!(f, "corrupt grid index: {}", msg),
            Self::InvalidCoordinate { lat, lon } => {
                write!(f, "coordinate ({}, {}) is outside the world bounds", lat, lon)
            }
            Self::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
        }
    }
}

impl std::error::Error for SnapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SnapError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
