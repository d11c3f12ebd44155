use std::io;
use thiserror::Error;

/// Errors raised while decoding wire-level primitives.
///
/// Narrower than `chainquery_core::Error`: this crate has no notion of
/// block heights, hashes that are missing from an index, or locked stores,
/// so it only needs the bytes-are-malformed / io-failed cases. Callers
/// higher up the stack fold this into their own error taxonomy.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}
