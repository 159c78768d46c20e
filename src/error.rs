//! Error types for the online RLBWT builder.

use thiserror::Error;

/// Error variants for RLBWT construction and serialisation.
#[derive(Debug, Error)]
pub enum Error {
    /// A position was provided that is out of the structure's bounds.
    #[error("position out of bounds: {0}")]
    IndexOutOfBounds(u64),

    /// A selection query was performed for a rank that does not exist.
    #[error("invalid selection: rank {0} not found")]
    InvalidSelection(u64),

    /// Malformed input data (e.g. a FASTA record that cannot be parsed).
    #[error("parse error: {0}")]
    Parse(String),

    /// An I/O error occurred while reading input or writing output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for RLBWT operations.
pub type Result<T> = std::result::Result<T, Error>;
