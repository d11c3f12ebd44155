use serde::Serialize;

/// A spendable (or, inside the connected iterator's UTXO map, not-yet-spent)
/// transaction output, as recorded in undo data and as reconstructed by the
/// connected iterator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtxoEntry {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
    pub height: u32,
    pub coinbase: bool,
}
