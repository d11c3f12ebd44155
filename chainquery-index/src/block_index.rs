//! Loads every record out of `blocks/index/` and reduces it to the single
//! best chain spec.md operates over: a contiguous `height -> hash` array
//! with no forks, reorgs, or orphaned side-chain entries visible through it.
//! The array can run past the last height with on-disk block data: trailing
//! entries there carry a validated header but `file`/`data_pos` of `None`,
//! so `get_max_height` reports the highest *header-present* height while
//! `get_block` still fails `BlockNotAvailable` above the data tip.
//!
//! Grounded on `bootstrap/utxo-dump/src/main.rs`'s pattern of opening a
//! LevelDB store, iterating every entry with a key prefix, and folding the
//! decoded records into an in-memory structure before doing anything else
//! with them.

use crate::error::IndexError;
use crate::record::BlockIndexRecord;
use crate::store::KvStore;
use chainquery_types::BlockHash;
use std::collections::HashMap;
use std::path::Path;

const BLOCK_INDEX_PREFIX: u8 = b'b';

/// The reduced, fork-free view of `blocks/index/`.
pub struct BlockIndex {
    /// `heights[h]` is the record for the active-chain block at height `h`.
    heights: Vec<BlockIndexRecord>,
    hash_by_height: Vec<BlockHash>,
    height_by_hash: HashMap<BlockHash, u32>,
    /// Kept open (and the exclusive lock on `blocks/index/` held with it)
    /// for the lifetime of the engine, not just while this load scans the
    /// store, per spec.md §5.
    _store: KvStore,
}

impl BlockIndex {
    /// Opens `blocks/index/` under `datadir` and builds the active-chain
    /// view. `datadir` is the path to the node's data directory (not the
    /// `blocks/index` subdirectory itself).
    pub fn load(datadir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let index_dir = datadir.as_ref().join("blocks").join("index");
        let mut store = KvStore::open(&index_dir)?;

        let mut by_hash: HashMap<BlockHash, BlockIndexRecord> = HashMap::new();
        store.scan(&[BLOCK_INDEX_PREFIX], |key, value| {
            // Key is the one-byte 'b' prefix followed by the 32-byte block
            // hash in its internal (little-endian) byte order.
            if key.len() != 1 + 32 {
                return;
            }
            let mut hash_bytes = [0u8; 32];
            hash_bytes.copy_from_slice(&key[1..]);
            let hash = BlockHash::from_le_bytes(hash_bytes);
            if let Ok(record) = BlockIndexRecord::decode(value) {
                by_hash.insert(hash, record);
            }
        })?;

        let active = Self::resolve_active_chain(&by_hash)?;
        let active = Self::extend_with_header_only_tip(active, &by_hash);
        Self::build_from_active_chain(active, store)
    }

    /// Walks backwards from every connectable, fully-validated candidate
    /// towards genesis, and keeps the longest chain that reaches it. This
    /// stands in for Bitcoin Core's cumulative-chainwork tip selection: we
    /// don't have chainwork on disk (it's recomputed in memory, never
    /// serialized to `CDiskBlockIndex`), and height is a monotonic proxy for
    /// work on any chain without a deep reorg in its index.
    fn resolve_active_chain(
        by_hash: &HashMap<BlockHash, BlockIndexRecord>,
    ) -> Result<Vec<(BlockHash, BlockIndexRecord)>, IndexError> {
        let mut candidates: Vec<&BlockHash> = by_hash
            .iter()
            .filter(|(_, r)| r.is_in_active_chain_candidate())
            .map(|(h, _)| h)
            .collect();
        candidates.sort_by_key(|h| std::cmp::Reverse(by_hash[*h].height));

        for tip_hash in candidates {
            if let Some(chain) = Self::try_walk_to_genesis(*tip_hash, by_hash) {
                return Ok(chain);
            }
        }
        Ok(Vec::new())
    }

    fn try_walk_to_genesis(
        tip: BlockHash,
        by_hash: &HashMap<BlockHash, BlockIndexRecord>,
    ) -> Option<Vec<(BlockHash, BlockIndexRecord)>> {
        let mut chain = Vec::new();
        let mut cursor = tip;
        loop {
            let record = by_hash.get(&cursor)?.clone();
            let is_genesis = record.prev_hash.is_all_zero();
            let expected_height = record.height;
            chain.push((cursor, record.clone()));
            if is_genesis {
                if record.height != 0 {
                    return None;
                }
                chain.reverse();
                return Some(chain);
            }
            if expected_height == 0 {
                return None;
            }
            cursor = record.prev_hash;
        }
    }

    /// Extends `chain` past its data tip with header-only records (spec.md
    /// §4.F: "header presence does not imply data presence"). Walks forward
    /// one height at a time, at each step picking the validated, non-failed
    /// child whose `prev_hash` matches the current tip and whose own height
    /// is exactly one past it; stops at the first height with no such child
    /// (an unknown header, or only failed/unconnected candidates).
    fn extend_with_header_only_tip(
        mut chain: Vec<(BlockHash, BlockIndexRecord)>,
        by_hash: &HashMap<BlockHash, BlockIndexRecord>,
    ) -> Vec<(BlockHash, BlockIndexRecord)> {
        let Some((mut tip_hash, mut tip_height)) =
            chain.last().map(|(hash, record)| (*hash, record.height))
        else {
            return chain;
        };

        loop {
            let next_height = tip_height + 1;
            let mut children: Vec<(&BlockHash, &BlockIndexRecord)> = by_hash
                .iter()
                .filter(|(_, r)| {
                    r.prev_hash == tip_hash && r.height == next_height && r.is_valid_header_candidate()
                })
                .collect();
            if children.is_empty() {
                return chain;
            }
            // A header-space fork past the data tip: pick deterministically
            // rather than arbitrarily, since there is no chainwork on disk
            // to break the tie with.
            children.sort_by_key(|(hash, _)| **hash);
            let (next_hash, next_record) = children[0];

            chain.push((*next_hash, next_record.clone()));
            tip_hash = *next_hash;
            tip_height = next_height;
        }
    }

    fn build_from_active_chain(
        chain: Vec<(BlockHash, BlockIndexRecord)>,
        store: KvStore,
    ) -> Result<Self, IndexError> {
        let mut heights = Vec::with_capacity(chain.len());
        let mut hash_by_height = Vec::with_capacity(chain.len());
        let mut height_by_hash = HashMap::with_capacity(chain.len());

        for (expected_height, (hash, record)) in chain.into_iter().enumerate() {
            if record.height != expected_height as u32 {
                return Err(IndexError::InvalidEncoding(format!(
                    "block index active chain has a height gap at {expected_height}"
                )));
            }
            height_by_hash.insert(hash, record.height);
            hash_by_height.push(hash);
            heights.push(record);
        }

        Ok(Self {
            heights,
            hash_by_height,
            height_by_hash,
            _store: store,
        })
    }

    pub fn max_height(&self) -> Option<u32> {
        if self.heights.is_empty() {
            None
        } else {
            Some(self.heights.len() as u32 - 1)
        }
    }

    pub fn record_at_height(&self, height: u32) -> Result<&BlockIndexRecord, IndexError> {
        self.heights
            .get(height as usize)
            .ok_or(IndexError::UnknownHeight(height))
    }

    pub fn hash_at_height(&self, height: u32) -> Result<BlockHash, IndexError> {
        self.hash_by_height
            .get(height as usize)
            .copied()
            .ok_or(IndexError::UnknownHeight(height))
    }

    pub fn height_of_hash(&self, hash: &BlockHash) -> Result<u32, IndexError> {
        self.height_by_hash
            .get(hash)
            .copied()
            .ok_or_else(|| IndexError::UnknownHash(hash.to_hex()))
    }

    pub fn record_of_hash(&self, hash: &BlockHash) -> Result<&BlockIndexRecord, IndexError> {
        let height = self.height_of_hash(hash)?;
        self.record_at_height(height)
    }
}
