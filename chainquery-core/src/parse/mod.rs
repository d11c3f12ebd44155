//! Decoders for the three on-disk byte formats the engine reads directly:
//! block files, undo files, and the transactions/headers inside them.

pub mod block;
pub mod block_file;
pub mod transaction;
pub mod undo;

pub use block::{RawBlock, RawBlockHeader};
pub use transaction::{RawInput, RawOutput, RawTransaction};
pub use undo::BlockUndo;

/// Number of non-coinbase inputs per non-coinbase transaction in a block,
/// in block order — what the undo decoder needs to know how many
/// `UndoTxOut` records belong to each transaction (spec.md §4.C, "the
/// connector consumes the undo stream in lock-step with inputs").
pub fn non_coinbase_input_counts(block: &RawBlock) -> Vec<usize> {
    block
        .transactions
        .iter()
        .skip(1)
        .map(|tx| tx.inputs.len())
        .collect()
}
