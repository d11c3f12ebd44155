//! The random-access engine (spec.md §4.F): stateless, thread-safe queries
//! against the block index and, when enabled, the transaction index.

pub mod iter;
#[cfg(test)]
mod tests;

use crate::format::{self, BlockHeaderView, BlockView, TransactionView};
use crate::options::Options;
use crate::parse::block_file::read_block_record;
use crate::parse::RawBlock;
use crate::Error;
use chainquery_index::{BlockIndex, TxIndex};
use chainquery_types::{parse_script, BlockHash, Network, Outpoint, ParsedScript, TxId, UtxoEntry};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

/// The operations spec.md §4.F names, as a trait so `ChainQuery` and (in
/// tests) any fixture-backed stand-in can share one contract.
pub trait RandomAccess {
    fn get_max_height(&self) -> Result<u32, Error>;
    fn get_hash_from_height(&self, height: u32) -> Result<BlockHash, Error>;
    fn get_height_from_hash(&self, hash: &BlockHash) -> Result<u32, Error>;
    fn get_block_header(&self, height: u32) -> Result<BlockHeaderView, Error>;
    fn get_block(&self, height: u32, simple: bool, connected: bool) -> Result<BlockView, Error>;
    fn get_transaction(
        &self,
        txid: &TxId,
        simple: bool,
        connected: bool,
    ) -> Result<TransactionView, Error>;
    fn get_height_from_txid(&self, txid: &TxId) -> Result<u32, Error>;
    fn parse_script(&self, script_hex: &str) -> Result<ParsedScript, Error>;
}

/// The engine handle returned by `ChainQuery::open`. Random-access methods
/// are `&self` and safely callable from multiple threads (spec.md §5); the
/// tx index, which needs `&mut` access to its underlying store, is the only
/// piece behind a lock.
pub struct ChainQuery {
    pub(crate) block_index: BlockIndex,
    pub(crate) tx_index: Option<Mutex<TxIndex>>,
    pub(crate) network: Network,
    pub(crate) datadir: PathBuf,
    pub(crate) worker_lanes: usize,
}

impl ChainQuery {
    pub fn open(options: Options) -> Result<Self, Error> {
        let network = options.resolved_network();
        let worker_lanes = options.resolved_worker_lanes();
        let block_index = BlockIndex::load(&options.path)?;

        let tx_index = if options.tx_index {
            match TxIndex::load(&options.path) {
                Ok(Some(index)) => Some(Mutex::new(index)),
                Ok(None) => {
                    log::warn!(
                        "tx_index requested but indexes/txindex/ is absent under {}; \
                         continuing with tx-index operations disabled",
                        options.path.display()
                    );
                    None
                }
                Err(e) => {
                    log::warn!(
                        "failed to open indexes/txindex/ under {}: {e}; \
                         continuing with tx-index operations disabled",
                        options.path.display()
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            block_index,
            tx_index,
            network,
            datadir: options.path,
            worker_lanes,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn block_file_path(&self, file: i32) -> PathBuf {
        self.datadir.join("blocks").join(format!("blk{file:05}.dat"))
    }

    fn decode_block_at(&self, file: i32, data_pos: u32) -> Result<RawBlock, Error> {
        let mut f = File::open(self.block_file_path(file))?;
        let bytes = read_block_record(&mut f, data_pos as u64, self.network.magic())?;
        Ok(RawBlock::decode(&bytes)?)
    }

    /// Looks up and decodes the block at `height`, for callers (the
    /// connected iterator, the heights array variant) that only have a
    /// height to start from rather than a pre-resolved `(file, data_pos)`.
    pub(crate) fn decode_block_for_height(&self, height: u32) -> Result<RawBlock, Error> {
        let record = self.block_index.record_at_height(height)?;
        let (file, data_pos) = match (record.file, record.data_pos) {
            (Some(file), Some(pos)) => (file, pos),
            _ => return Err(Error::BlockNotAvailable(height)),
        };
        self.decode_block_at(file, data_pos)
    }

    fn require_tx_index(&self) -> Result<&Mutex<TxIndex>, Error> {
        self.tx_index.as_ref().ok_or(Error::TxIndexDisabled)
    }

    /// Locates the transaction `txid` via the tx index, decoding the whole
    /// containing block and matching by recomputed txid rather than
    /// slicing at the stored `tx_offset` (see DESIGN.md) — returns the
    /// block, the transaction's position within it, and the block's height.
    fn locate_transaction(&self, txid: &TxId) -> Result<(RawBlock, usize, u32), Error> {
        let record = {
            let mut guard = self
                .require_tx_index()?
                .lock()
                .expect("tx index mutex poisoned");
            guard.lookup(txid)?
        };

        let block = self.decode_block_at(record.file, record.block_pos)?;
        let position = block
            .transactions
            .iter()
            .position(|tx| tx.txid() == *txid)
            .ok_or_else(|| {
                Error::ConsistencyError(format!(
                    "tx index points at a block that does not contain txid {}",
                    txid.to_hex()
                ))
            })?;

        let block_hash = block.header.block_hash();
        let height = self.block_index.height_of_hash(&block_hash)?;
        Ok((block, position, height))
    }

    /// Resolves the previous output spent by `outpoint` via the tx index.
    /// Returns `None` for the coinbase sentinel outpoint (nothing to
    /// connect — spec.md §3, "a coinbase input ... is skipped").
    fn resolve_spent_output(&self, outpoint: &Outpoint) -> Result<Option<UtxoEntry>, Error> {
        if outpoint.is_coinbase_sentinel() {
            return Ok(None);
        }

        let (block, position, height) = self.locate_transaction(&outpoint.txid)?;
        let output = block.transactions[position]
            .outputs
            .get(outpoint.vout as usize)
            .ok_or_else(|| {
                Error::ConsistencyError(format!(
                    "outpoint {}:{} references a vout beyond the referenced transaction's outputs",
                    outpoint.txid.to_hex(),
                    outpoint.vout
                ))
            })?;

        Ok(Some(UtxoEntry {
            value: output.value,
            script_pubkey: output.script_pubkey.clone(),
            height,
            coinbase: position == 0,
        }))
    }

    fn resolve_block_spends(
        &self,
        block: &RawBlock,
        connected: bool,
    ) -> Result<Vec<Vec<Option<UtxoEntry>>>, Error> {
        if !connected {
            return Ok(Vec::new());
        }
        block
            .transactions
            .iter()
            .skip(1)
            .map(|tx| {
                tx.inputs
                    .iter()
                    .map(|input| self.resolve_spent_output(&input.prev_outpoint))
                    .collect::<Result<Vec<_>, Error>>()
            })
            .collect()
    }

    /// Streams blocks `[start, stop)`. `start` is forced to 0 when
    /// `connected` is set — see `iter::ConnectedIter`.
    pub fn iter_by_range(
        &self,
        start: u32,
        stop: u32,
        simple: bool,
        connected: bool,
    ) -> iter::ConnectedIter<'_> {
        iter::ConnectedIter::new(self, start, stop, simple, connected)
    }

    pub fn iter_by_heights(&self, heights: Vec<u32>, simple: bool) -> iter::HeightsIter<'_> {
        iter::HeightsIter::new(self, heights, simple)
    }
}

impl RandomAccess for ChainQuery {
    fn get_max_height(&self) -> Result<u32, Error> {
        self.block_index
            .max_height()
            .ok_or_else(|| Error::ConsistencyError("block index has no active chain".into()))
    }

    fn get_hash_from_height(&self, height: u32) -> Result<BlockHash, Error> {
        Ok(self.block_index.hash_at_height(height)?)
    }

    fn get_height_from_hash(&self, hash: &BlockHash) -> Result<u32, Error> {
        Ok(self.block_index.height_of_hash(hash)?)
    }

    fn get_block_header(&self, height: u32) -> Result<BlockHeaderView, Error> {
        let record = self.block_index.record_at_height(height)?;
        let hash = self.block_index.hash_at_height(height)?;
        Ok(BlockHeaderView {
            height,
            hash: hash.to_hex(),
            version: record.header_version,
            prev_hash: record.prev_hash.to_hex(),
            merkle_root: hex::encode(record.merkle_root),
            time: record.time,
            bits: record.bits,
            nonce: record.nonce,
            n_tx: record.n_tx,
        })
    }

    fn get_block(&self, height: u32, simple: bool, connected: bool) -> Result<BlockView, Error> {
        if connected {
            self.require_tx_index()?;
        }
        let block = self.decode_block_for_height(height)?;
        let hash = self.block_index.hash_at_height(height)?;
        let spent = self.resolve_block_spends(&block, connected)?;
        Ok(format::build_block_view(
            height,
            hash.to_hex(),
            &block,
            &spent,
            self.network,
            simple,
        ))
    }

    fn get_transaction(
        &self,
        txid: &TxId,
        simple: bool,
        connected: bool,
    ) -> Result<TransactionView, Error> {
        let (block, position, _height) = self.locate_transaction(txid)?;
        let tx = &block.transactions[position];

        let spent = if connected && position != 0 {
            tx.inputs
                .iter()
                .map(|input| self.resolve_spent_output(&input.prev_outpoint))
                .collect::<Result<Vec<_>, Error>>()?
        } else {
            vec![None; tx.inputs.len()]
        };

        Ok(format::build_transaction_view(tx, &spent, self.network, simple))
    }

    fn get_height_from_txid(&self, txid: &TxId) -> Result<u32, Error> {
        let (_block, _position, height) = self.locate_transaction(txid)?;
        Ok(height)
    }

    fn parse_script(&self, script_hex: &str) -> Result<ParsedScript, Error> {
        let bytes = hex::decode(script_hex)
            .map_err(|e| Error::InvalidEncoding(format!("not valid hex: {e}")))?;
        Ok(parse_script(&bytes, self.network))
    }
}
