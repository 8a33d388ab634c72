//! Typed error taxonomy for each component, per the error-handling design.
//!
//! Binaries and glue code use `anyhow::Result` with `.context(...)`; library
//! code returns these so callers can match on error kind.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("schema version mismatch: found {found}, required {required}")]
    SchemaMismatch { found: u32, required: u32 },
    #[error("store is locked for writing by another process")]
    Locked,
    #[error("store is corrupted: {0}")]
    Corrupted(String),
    #[error("no such document: {0:?}")]
    NotFound(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{path:?} could not be read: {source}")]
    FileUnreadable { path: PathBuf, source: io::Error },
    #[error("not a regular file")]
    NotRegularFile,
    #[error("{path:?}: MIME parsing failed: {source}")]
    MimeParseFailed {
        path: PathBuf,
        source: mailparse::MailParseError,
    },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query parse error at {position:?}: {reason}")]
    Parse {
        position: Option<usize>,
        reason: String,
    },
    #[error("unknown or non-sortable sort field: {0}")]
    UnknownSortField(String),
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("indexer is already running")]
    AlreadyRunning,
    #[error("run was canceled")]
    Canceled,
    #[error(transparent)]
    Store(#[from] StoreError),
}
