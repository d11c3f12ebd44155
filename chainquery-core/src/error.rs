//! Top-level error taxonomy for the engine. Every narrower error type in the
//! workspace (`chainquery_types::DecodeError`, `chainquery_index::IndexError`)
//! folds into this one at the crate boundary, the same shape the teacher's
//! `validation` crate uses for its own `ValidateHeaderError` — a flat,
//! matchable enum rather than a chain of opaque wrappers.

use chainquery_index::IndexError;
use chainquery_types::DecodeError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown height: {0}")]
    UnknownHeight(u32),
    #[error("unknown hash: {0}")]
    UnknownHash(String),
    #[error("unknown txid: {0}")]
    UnknownTxId(String),
    #[error("block header known at height {0} but block data is not on disk")]
    BlockNotAvailable(u32),
    #[error("operation requires the transaction index, which is not open")]
    TxIndexDisabled,
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
    #[error("consistency error: {0}")]
    ConsistencyError(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("another process holds the index store lock")]
    LockHeld,
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Io(io) => Error::Io(io),
            DecodeError::InvalidEncoding(s) => Error::InvalidEncoding(s),
        }
    }
}

impl From<IndexError> for Error {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Io(io) => Error::Io(io),
            IndexError::LockHeld => Error::LockHeld,
            IndexError::InvalidEncoding(s) => Error::InvalidEncoding(s),
            IndexError::UnknownHeight(h) => Error::UnknownHeight(h),
            IndexError::UnknownHash(h) => Error::UnknownHash(h),
            IndexError::UnknownTxId(t) => Error::UnknownTxId(t),
        }
    }
}
