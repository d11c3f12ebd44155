use chainquery_types::DecodeError;
use std::io;
use thiserror::Error;

/// Errors raised by the key-value store adapter and the index loaders.
/// Folded into `chainquery_core::Error` by the engine crate.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("another process holds the index store lock")]
    LockHeld,
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
    #[error("unknown height: {0}")]
    UnknownHeight(u32),
    #[error("unknown hash: {0}")]
    UnknownHash(String),
    #[error("unknown txid: {0}")]
    UnknownTxId(String),
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Io(io) => IndexError::Io(io),
            DecodeError::InvalidEncoding(s) => IndexError::InvalidEncoding(s),
        }
    }
}
