//! The sequential connected iterator (spec.md §4.G): streams the chain from
//! genesis to a caller-supplied stop height, maintaining a live UTXO map so
//! inputs can be rewritten to the output they spend without a per-input
//! index lookup. Block decode for the next `worker_lanes` heights is
//! dispatched to a scoped thread batch so the sequencer overlaps I/O with
//! decode the way spec.md's "bounded pool of worker lanes" describes; unlike
//! a persistent thread pool, the batch joins before every yield, which keeps
//! the borrow of `&ChainQuery` scoped and avoids needing to wrap the engine
//! in an `Arc` just to satisfy `'static` — a deliberate simplification
//! recorded in DESIGN.md.

use super::ChainQuery;
use crate::format::{self, BlockView};
use crate::parse::RawBlock;
use crate::Error;
use chainquery_types::{Outpoint, UtxoEntry};
use std::collections::{HashMap, VecDeque};

const UTXO_SHARDS: usize = 64;

/// A sharded `Outpoint -> UtxoEntry` map. Sharding exists only to bound the
/// cost of individual shard rehashes at mainnet-tip scale (~10^8 entries,
/// spec.md §9 "UTXO map sizing") — the sequencer is the map's sole owner, so
/// no locking is needed between shards.
struct UtxoMap {
    shards: Vec<HashMap<Outpoint, UtxoEntry>>,
}

impl UtxoMap {
    fn new() -> Self {
        Self {
            shards: (0..UTXO_SHARDS).map(|_| HashMap::new()).collect(),
        }
    }

    fn shard_index(outpoint: &Outpoint) -> usize {
        outpoint.txid.to_le_bytes()[0] as usize % UTXO_SHARDS
    }

    fn insert(&mut self, outpoint: Outpoint, entry: UtxoEntry) {
        let idx = Self::shard_index(&outpoint);
        self.shards[idx].insert(outpoint, entry);
    }

    fn remove(&mut self, outpoint: &Outpoint) -> Option<UtxoEntry> {
        let idx = Self::shard_index(outpoint);
        self.shards[idx].remove(outpoint)
    }

    fn len(&self) -> usize {
        self.shards.iter().map(HashMap::len).sum()
    }
}

fn decode_block_for_iter(engine: &ChainQuery, height: u32) -> Result<RawBlock, Error> {
    engine.decode_block_for_height(height)
}

/// `iter_by_range(start, stop, simple, connected)`. In connected mode
/// `start` is forced to 0 (spec.md §6: "in connected-range iteration, start
/// is ignored — the UTXO invariant forces start = 0"), since the live UTXO
/// map can only be built by replaying from genesis; in non-connected mode
/// `start` is honored as the first height decoded, so a sub-range query
/// doesn't pay the cost of decoding and discarding every block below it.
pub struct ConnectedIter<'a> {
    engine: &'a ChainQuery,
    stop: u32,
    simple: bool,
    connected: bool,
    next_height: u32,
    utxo: UtxoMap,
    pending: VecDeque<(u32, Result<RawBlock, Error>)>,
    exhausted: bool,
}

impl<'a> ConnectedIter<'a> {
    pub(crate) fn new(
        engine: &'a ChainQuery,
        start: u32,
        stop: u32,
        simple: bool,
        connected: bool,
    ) -> Self {
        let start = if connected { 0 } else { start };
        Self {
            engine,
            stop,
            simple,
            connected,
            next_height: start,
            utxo: UtxoMap::new(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Number of live entries in the UTXO map right now. Exposed for tests
    /// verifying spec.md §8 invariant 5 against a synthetic chain.
    pub fn utxo_entry_count(&self) -> usize {
        self.utxo.len()
    }

    fn fill_batch(&mut self) {
        let batch_start = self.next_height;
        let lanes = self.engine.worker_lanes as u32;
        let batch_end = self.stop.min(batch_start.saturating_add(lanes));
        if batch_start >= batch_end {
            return;
        }

        let engine = self.engine;
        let results: Vec<(u32, Result<RawBlock, Error>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (batch_start..batch_end)
                .map(|height| scope.spawn(move || (height, decode_block_for_iter(engine, height))))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("block decode worker panicked"))
                .collect()
        });

        self.pending.extend(results);
    }

    /// Applies the state-machine steps of spec.md §4.G for one block: adds
    /// coinbase outputs, then for every subsequent transaction removes each
    /// spent entry (the connected substitution) and adds its own outputs.
    fn process_block(&mut self, height: u32, raw: RawBlock) -> Result<BlockView, Error> {
        let hash = self.engine.block_index.hash_at_height(height)?;

        let coinbase = raw.transactions.first().ok_or_else(|| {
            Error::ConsistencyError(format!("block at height {height} has no coinbase transaction"))
        })?;
        let coinbase_txid = coinbase.txid();
        for (i, output) in coinbase.outputs.iter().enumerate() {
            self.utxo.insert(
                Outpoint::new(coinbase_txid, i as u32),
                UtxoEntry {
                    value: output.value,
                    script_pubkey: output.script_pubkey.clone(),
                    height,
                    coinbase: true,
                },
            );
        }

        let mut spent: Vec<Vec<Option<UtxoEntry>>> = Vec::with_capacity(raw.transactions.len());
        for tx in raw.transactions.iter().skip(1) {
            let mut tx_spent = Vec::with_capacity(tx.inputs.len());
            for input in &tx.inputs {
                let removed = self.utxo.remove(&input.prev_outpoint).ok_or_else(|| {
                    Error::ConsistencyError(format!(
                        "outpoint {}:{} not found in the live UTXO map at height {height}",
                        input.prev_outpoint.txid.to_hex(),
                        input.prev_outpoint.vout
                    ))
                })?;
                tx_spent.push(Some(removed));
            }

            let txid = tx.txid();
            for (i, output) in tx.outputs.iter().enumerate() {
                self.utxo.insert(
                    Outpoint::new(txid, i as u32),
                    UtxoEntry {
                        value: output.value,
                        script_pubkey: output.script_pubkey.clone(),
                        height,
                        coinbase: false,
                    },
                );
            }
            spent.push(tx_spent);
        }

        let spent_for_view = if self.connected { spent } else { Vec::new() };
        Ok(format::build_block_view(
            height,
            hash.to_hex(),
            &raw,
            &spent_for_view,
            self.engine.network,
            self.simple,
        ))
    }
}

impl<'a> Iterator for ConnectedIter<'a> {
    type Item = Result<BlockView, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.next_height >= self.stop {
            return None;
        }

        if self.pending.is_empty() {
            self.fill_batch();
        }

        let (height, raw_result) = self.pending.pop_front()?;
        debug_assert_eq!(height, self.next_height);

        let raw = match raw_result {
            Ok(raw) => raw,
            Err(e) => {
                self.exhausted = true;
                return Some(Err(e));
            }
        };

        match self.process_block(height, raw) {
            Ok(view) => {
                self.next_height += 1;
                Some(Ok(view))
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

/// `iter_by_heights`: dispatches each height to the worker pool independent
/// of the others and returns results in input order. No UTXO map — the
/// required previous outputs may live in blocks outside the requested set
/// (spec.md §4.G, "connected mode is not available in this variant").
pub struct HeightsIter<'a> {
    engine: &'a ChainQuery,
    heights: VecDeque<u32>,
    simple: bool,
    pending: VecDeque<Result<BlockView, Error>>,
    exhausted: bool,
}

impl<'a> HeightsIter<'a> {
    pub(crate) fn new(engine: &'a ChainQuery, heights: Vec<u32>, simple: bool) -> Self {
        Self {
            engine,
            heights: heights.into(),
            simple,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fill_batch(&mut self) {
        let lanes = self.engine.worker_lanes;
        let batch_len = lanes.min(self.heights.len());
        if batch_len == 0 {
            return;
        }
        let batch: Vec<u32> = (0..batch_len).filter_map(|_| self.heights.pop_front()).collect();

        let engine = self.engine;
        let simple = self.simple;
        let results: Vec<Result<BlockView, Error>> = std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .into_iter()
                .map(|height| scope.spawn(move || decode_and_view(engine, height, simple)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("block decode worker panicked"))
                .collect()
        });

        self.pending.extend(results);
    }
}

fn decode_and_view(engine: &ChainQuery, height: u32, simple: bool) -> Result<BlockView, Error> {
    let raw = engine.decode_block_for_height(height)?;
    let hash = engine.block_index.hash_at_height(height)?;
    Ok(format::build_block_view(height, hash.to_hex(), &raw, &[], engine.network, simple))
}

impl<'a> Iterator for HeightsIter<'a> {
    type Item = Result<BlockView, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if self.pending.is_empty() {
            if self.heights.is_empty() {
                return None;
            }
            self.fill_batch();
        }
        let result = self.pending.pop_front()?;
        if result.is_err() {
            self.exhausted = true;
        }
        Some(result)
    }
}
