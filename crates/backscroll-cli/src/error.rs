//! CLI error types.

use std::io;

use backscroll_store::KeyImportError;
use backscroll_timeline::{ParseError, StorageError};
use thiserror::Error;

/// Errors surfaced by the replay tool.
#[derive(Error, Debug)]
pub enum CliError {
    /// Input file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed
        path: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Room export is not valid JSON of the expected shape
    #[error("invalid room export: {0}")]
    Export(#[from] serde_json::Error),

    /// Sync section of the export does not parse
    #[error("invalid sync batch: {0}")]
    Parse(#[from] ParseError),

    /// Session key file could not be imported
    #[error(transparent)]
    Keys(#[from] KeyImportError),

    /// Session store failed to open
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Writing output failed
    #[error("output failed: {0}")]
    Output(#[from] io::Error),
}
