#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

use crate::state::{ReaderState, Terminal};

/// Errors surfaced by [`FileReader`](crate::FileReader) operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The operation is not allowed in the reader's current state
    /// (e.g. a second `start_reading`, or `stop_reading` before any start).
    #[error("`{operation}` not allowed in state `{state}`")]
    InvalidState {
        operation: &'static str,
        state: ReaderState,
    },

    /// Path-based construction could not obtain a descriptor.
    #[error("failed to open `{path}`: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A read failed for a reason other than clean EOF or cancellation.
    ///
    /// Never thrown at clients synchronously: recorded as the cause of
    /// `TerminatedAbnormally` and retrievable via `FileReader::failure`.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The reader already finished; carries how it finished.
    #[error("reader already terminated ({0})")]
    AlreadyTerminated(Terminal),
}

pub type ReaderResult<T> = Result<T, ReaderError>;
