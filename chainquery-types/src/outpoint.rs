use crate::hash::TxId;
use serde::Serialize;

/// Identifies a transaction output: `(txid, output index)`.
///
/// Laid out as a plain `(TxId, u32)` pair (36 bytes, no padding beyond
/// alignment) so it is cheap to use as a hash-map key across the ~10^8
/// entries the connected iterator's UTXO map holds at mainnet tip (see
/// spec.md §9 "UTXO map sizing").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Outpoint {
    pub txid: TxId,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// The sentinel previous-outpoint of a coinbase input: all-zero txid,
    /// `vout = 0xFFFFFFFF`.
    pub fn is_coinbase_sentinel(&self) -> bool {
        self.txid.is_all_zero() && self.vout == u32::MAX
    }
}
