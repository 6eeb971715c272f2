//! Error taxonomy for MetaFS
//!
//! Every public engine operation reports failure through [`Error`]. Each
//! variant carries the operation and path involved so a front end can render
//! a message without extra context.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::format::EntryKind;

/// Engine operation that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateFile,
    ReadFile,
    WriteFile,
    DeleteFile,
    CreateDirectory,
    DeleteDirectory,
    ListDirectory,
    VerifyFile,
    RecoverFile,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateFile => "create_file",
            Operation::ReadFile => "read_file",
            Operation::WriteFile => "write_file",
            Operation::DeleteFile => "delete_file",
            Operation::CreateDirectory => "create_directory",
            Operation::DeleteDirectory => "delete_directory",
            Operation::ListDirectory => "list_directory",
            Operation::VerifyFile => "verify_file",
            Operation::RecoverFile => "recover_file",
        };
        f.write_str(name)
    }
}

/// Coarse error classification, one per taxonomy entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    TypeMismatch,
    NotEmpty,
    InvalidPath,
    IntegrityMismatch,
    UnrecoverableCorruption,
    PersistenceFailure,
    InvalidArgument,
}

/// Error type for all engine operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("{op}: no such file or directory: {path}")]
    NotFound { op: Operation, path: String },

    #[error("{op}: already exists: {path}")]
    AlreadyExists { op: Operation, path: String },

    #[error("{op}: {path} is not a {expected}")]
    TypeMismatch {
        op: Operation,
        path: String,
        expected: EntryKind,
    },

    #[error("delete_directory: directory not empty: {path}")]
    NotEmpty { path: String },

    #[error("{op}: invalid path {path:?}: {reason}")]
    InvalidPath {
        op: Operation,
        path: String,
        reason: &'static str,
    },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("{path} is corrupted and no valid backup exists")]
    UnrecoverableCorruption { path: String },

    #[error("persistence failure while {context} ({}): {source}", .path.display())]
    Persistence {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::NotEmpty { .. } => ErrorKind::NotEmpty,
            Error::InvalidPath { .. } => ErrorKind::InvalidPath,
            Error::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Error::UnrecoverableCorruption { .. } => ErrorKind::UnrecoverableCorruption,
            Error::Persistence { .. } | Error::Serialization(_) => ErrorKind::PersistenceFailure,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    pub(crate) fn not_found(op: Operation, path: impl Into<String>) -> Self {
        Error::NotFound {
            op,
            path: path.into(),
        }
    }

    pub(crate) fn already_exists(op: Operation, path: impl Into<String>) -> Self {
        Error::AlreadyExists {
            op,
            path: path.into(),
        }
    }

    pub(crate) fn type_mismatch(op: Operation, path: impl Into<String>, expected: EntryKind) -> Self {
        Error::TypeMismatch {
            op,
            path: path.into(),
            expected,
        }
    }
}

/// Attach persistence context to raw I/O results
pub(crate) trait IoContext<T> {
    fn persist_ctx(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn persist_ctx(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Persistence {
            context,
            path: path.into(),
            source,
        })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_operation_and_path() {
        let err = Error::not_found(Operation::ReadFile, "/docs/missing.txt");
        assert_eq!(
            err.to_string(),
            "read_file: no such file or directory: /docs/missing.txt"
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = Error::type_mismatch(Operation::ListDirectory, "/a.txt", EntryKind::Directory);
        assert_eq!(err.to_string(), "list_directory: /a.txt is not a directory");
    }

    #[test]
    fn test_io_context() {
        let res: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let err = res.persist_ctx("writing metadata", "/tmp/meta.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert!(err.to_string().contains("writing metadata"));
    }
}
