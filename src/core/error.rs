use std::path::PathBuf;

use thiserror::Error;

use crate::core::id::BufferId;

/// Failures surfaced by the document I/O engine.
///
/// Errors raised on a worker thread travel back inside its completion message;
/// nothing here is ever thrown across threads.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("Could not open file '{path}': {source}")]
    OpenFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path '{0}' is a directory so can not be opened")]
    IsDirectory(PathBuf),

    #[error("The file '{0}' is already being loaded or saved")]
    AlreadyInFlight(PathBuf),

    #[error("The file '{0}' has not yet been loaded entirely, so it can not be saved right now")]
    StillLoading(PathBuf),

    #[error("File '{path}' is {size} bytes long, larger than the {limit} bytes limit")]
    SizeExceeded {
        path: PathBuf,
        size: u64,
        limit: u64,
        /// A soft limit may be overridden by confirmation; a hard one may not.
        overridable: bool,
    },

    #[error("Failed to process file '{path}' as thread could not be started: {source}")]
    ThreadStartFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not save file '{path}': {source}")]
    PartialWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not save file '{path}': '{character}' can not be represented in {encoding}")]
    Unrepresentable {
        path: PathBuf,
        character: char,
        encoding: &'static str,
    },

    #[error("The file '{0}' no longer starts with the expected byte order mark")]
    EncodingMismatch(PathBuf),

    #[error("The file '{0}' has been deleted")]
    ExternalDeletion(PathBuf),

    #[error("Buffer has no file name")]
    Untitled,

    #[error("Unknown buffer: {0}")]
    UnknownBuffer(BufferId),

    #[error("The buffer for '{0}' is read-only")]
    ReadOnly(PathBuf),

    #[error("File '{0}' is already open in another buffer")]
    AlreadyOpen(PathBuf),

    #[error("Saving '{0}' was vetoed by an extension")]
    Vetoed(PathBuf),

    #[error("Operation on '{0}' was cancelled")]
    Cancelled(PathBuf),
}

impl FileError {
    /// Short machine-friendly tag, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            FileError::OpenFailure { .. } => "open_failure",
            FileError::IsDirectory(_) => "is_directory",
            FileError::AlreadyInFlight(_) => "already_in_flight",
            FileError::StillLoading(_) => "still_loading",
            FileError::SizeExceeded { .. } => "size_exceeded",
            FileError::ThreadStartFailure { .. } => "thread_start_failure",
            FileError::PartialWriteFailure { .. } => "partial_write_failure",
            FileError::Unrepresentable { .. } => "unrepresentable",
            FileError::EncodingMismatch(_) => "encoding_mismatch",
            FileError::ExternalDeletion(_) => "external_deletion",
            FileError::Untitled => "untitled",
            FileError::UnknownBuffer(_) => "unknown_buffer",
            FileError::ReadOnly(_) => "read_only",
            FileError::AlreadyOpen(_) => "already_open",
            FileError::Vetoed(_) => "vetoed",
            FileError::Cancelled(_) => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, FileError>;
