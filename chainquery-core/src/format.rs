//! The two output representations spec.md §4.H requires: *simple*
//! (decoded addresses, numeric amounts, witness dropped) and *full* (every
//! raw field, byte-exact reconstructable). Both share field names so a
//! caller can switch modes without a schema change. JSON is an explicit
//! opt-in (`to_json`) rather than the default return type — the Open
//! Question resolution recorded in DESIGN.md.

use crate::parse::{RawBlock, RawTransaction};
use chainquery_types::{parse_script, Network, ScriptType, UtxoEntry};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BlockHeaderView {
    pub height: u32,
    pub hash: String,
    pub version: i32,
    pub prev_hash: String,
    pub merkle_root: String,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    pub n_tx: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TransactionView {
    Simple(SimpleTransaction),
    Full(FullTransaction),
}

impl TransactionView {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn build_transaction_view(
    tx: &RawTransaction,
    spent: &[Option<UtxoEntry>],
    network: Network,
    simple: bool,
) -> TransactionView {
    let wrapped = [spent.to_vec()];
    if simple {
        TransactionView::Simple(build_simple_transaction(tx, wrapped.first(), network))
    } else {
        TransactionView::Full(build_full_transaction(tx, wrapped.first()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputView {
    pub value: u64,
    pub script_type: ScriptType,
    pub addresses: Vec<String>,
}

impl OutputView {
    fn from_script(value: u64, script_pubkey: &[u8], network: Network) -> Self {
        let parsed = parse_script(script_pubkey, network);
        Self {
            value,
            script_type: parsed.script_type,
            addresses: parsed.addresses,
        }
    }

    fn from_utxo_entry(entry: &UtxoEntry, network: Network) -> Self {
        Self::from_script(entry.value, &entry.script_pubkey, network)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum InputRef {
    Outpoint { txid: String, vout: u32 },
    SpentOutput(OutputView),
}

#[derive(Debug, Clone, Serialize)]
pub struct SimpleTransaction {
    pub txid: String,
    pub inputs: Vec<InputRef>,
    pub outputs: Vec<OutputView>,
    pub locktime: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimpleBlock {
    pub height: u32,
    pub hash: String,
    pub time: u32,
    pub nonce: u32,
    pub bits: u32,
    pub merkle_root: String,
    pub prev_hash: String,
    pub txdata: Vec<SimpleTransaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullOutput {
    pub value: u64,
    pub script_pubkey: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullInput {
    pub prev_txid: String,
    pub prev_vout: u32,
    pub script_sig: String,
    pub sequence: u32,
    pub witness: Vec<String>,
    pub spent_output: Option<FullOutput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullTransaction {
    pub version: i32,
    pub txid: String,
    pub segwit: bool,
    pub inputs: Vec<FullInput>,
    pub outputs: Vec<FullOutput>,
    pub locktime: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullBlock {
    pub height: u32,
    pub hash: String,
    pub version: i32,
    pub time: u32,
    pub nonce: u32,
    pub bits: u32,
    pub merkle_root: String,
    pub prev_hash: String,
    pub txdata: Vec<FullTransaction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BlockView {
    Simple(SimpleBlock),
    Full(FullBlock),
}

impl BlockView {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `spent[i]` holds the resolved previous output for each input of
/// `raw.transactions[i + 1]` (the coinbase transaction is excluded), or
/// `None` for an input left unconnected. Pass an empty slice (or a slice of
/// empty/all-`None` vecs) for non-connected queries.
pub fn build_block_view(
    height: u32,
    hash_hex: String,
    raw: &RawBlock,
    spent: &[Vec<Option<UtxoEntry>>],
    network: Network,
    simple: bool,
) -> BlockView {
    if simple {
        BlockView::Simple(build_simple_block(height, hash_hex, raw, spent, network))
    } else {
        BlockView::Full(build_full_block(height, hash_hex, raw, spent))
    }
}

fn build_simple_block(
    height: u32,
    hash_hex: String,
    raw: &RawBlock,
    spent: &[Vec<Option<UtxoEntry>>],
    network: Network,
) -> SimpleBlock {
    let mut txdata = Vec::with_capacity(raw.transactions.len());
    for (i, tx) in raw.transactions.iter().enumerate() {
        let spent_for_tx = i.checked_sub(1).and_then(|idx| spent.get(idx));
        txdata.push(build_simple_transaction(tx, spent_for_tx, network));
    }

    SimpleBlock {
        height,
        hash: hash_hex,
        time: raw.header.time,
        nonce: raw.header.nonce,
        bits: raw.header.bits,
        merkle_root: hex::encode(raw.header.merkle_root),
        prev_hash: raw.header.prev_hash.to_hex(),
        txdata,
    }
}

fn build_simple_transaction(
    tx: &RawTransaction,
    spent_for_tx: Option<&Vec<Option<UtxoEntry>>>,
    network: Network,
) -> SimpleTransaction {
    let inputs = tx
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let resolved = spent_for_tx.and_then(|v| v.get(i)).and_then(|o| o.as_ref());
            match resolved {
                Some(entry) => InputRef::SpentOutput(OutputView::from_utxo_entry(entry, network)),
                None => InputRef::Outpoint {
                    txid: input.prev_outpoint.txid.to_hex(),
                    vout: input.prev_outpoint.vout,
                },
            }
        })
        .collect();

    let outputs = tx
        .outputs
        .iter()
        .map(|o| OutputView::from_script(o.value, &o.script_pubkey, network))
        .collect();

    SimpleTransaction {
        txid: tx.txid().to_hex(),
        inputs,
        outputs,
        locktime: tx.lock_time,
    }
}

fn build_full_block(
    height: u32,
    hash_hex: String,
    raw: &RawBlock,
    spent: &[Vec<Option<UtxoEntry>>],
) -> FullBlock {
    let mut txdata = Vec::with_capacity(raw.transactions.len());
    for (i, tx) in raw.transactions.iter().enumerate() {
        let spent_for_tx = i.checked_sub(1).and_then(|idx| spent.get(idx));
        txdata.push(build_full_transaction(tx, spent_for_tx));
    }

    FullBlock {
        height,
        hash: hash_hex,
        version: raw.header.version,
        time: raw.header.time,
        nonce: raw.header.nonce,
        bits: raw.header.bits,
        merkle_root: hex::encode(raw.header.merkle_root),
        prev_hash: raw.header.prev_hash.to_hex(),
        txdata,
    }
}

fn build_full_transaction(
    tx: &RawTransaction,
    spent_for_tx: Option<&Vec<Option<UtxoEntry>>>,
) -> FullTransaction {
    let inputs = tx
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let resolved = spent_for_tx.and_then(|v| v.get(i)).and_then(|o| o.as_ref());
            FullInput {
                prev_txid: input.prev_outpoint.txid.to_hex(),
                prev_vout: input.prev_outpoint.vout,
                script_sig: hex::encode(&input.script_sig),
                sequence: input.sequence,
                witness: input.witness.iter().map(hex::encode).collect(),
                spent_output: resolved.map(|entry| FullOutput {
                    value: entry.value,
                    script_pubkey: hex::encode(&entry.script_pubkey),
                }),
            }
        })
        .collect();

    let outputs = tx
        .outputs
        .iter()
        .map(|o| FullOutput {
            value: o.value,
            script_pubkey: hex::encode(&o.script_pubkey),
        })
        .collect();

    FullTransaction {
        version: tx.version,
        txid: tx.txid().to_hex(),
        segwit: tx.has_witness,
        inputs,
        outputs,
        locktime: tx.lock_time,
    }
}
