use thiserror::Error;
use std::io;

use crate::storage::pagefile::PageId;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("page {0} is corrupt")]
    CorruptPage(PageId),
    #[error("index metadata page is corrupt")]
    CorruptMetadata,
    /// Internal overflow signal between a node codec and the tree.
    /// Never escapes `index::tree`; the tree answers it with a split.
    #[error("node is full")]
    NodeFull,
    #[error("index is empty")]
    EmptyTree,
    #[error("end of index")]
    EndOfIndex,
    #[error("entry {eid} out of range (node holds {count})")]
    OutOfRange { eid: usize, count: usize },
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("load file line {0} is malformed")]
    InvalidLoadLine(usize),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DbResult<T> = Result<T, DbError>;
