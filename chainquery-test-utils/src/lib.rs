//! Synthetic data-directory fixtures for `chainquery-core`'s tests: block
//! files, a `blocks/index/` LevelDB store and (optionally) an
//! `indexes/txindex/` one, all built by fluent builders in the same style as
//! the teacher's own `test-utils` crate (`BlockBuilder`/`TransactionBuilder`
//! culminating in `.build()`), adapted to chainquery's block/transaction
//! shapes and to writing directly into `rusty_leveldb::DB` rather than the
//! node's own write path (chainquery has none; this crate is the only
//! producer of these stores in the whole workspace).

use chainquery_core::parse::block_file::write_block_record;
use chainquery_core::parse::{RawBlock, RawBlockHeader, RawInput, RawOutput, RawTransaction};
use chainquery_index::{BlockIndexRecord, BlockStatus, TxIndexRecord};
use chainquery_types::{BlockHash, Network, Outpoint, TxId};
use rusty_leveldb::{Options as LevelDbOptions, DB};
use std::fs::{self, File};
use std::path::PathBuf;
use tempfile::TempDir;

/// Builds a single transaction, defaulting to a coinbase paying 50 BTC to an
/// arbitrary P2PKH script when the caller supplies no inputs/outputs of
/// their own (mirrors `TransactionBuilder`'s coinbase default upstream).
pub struct TransactionBuilder {
    version: i32,
    inputs: Vec<RawInput>,
    outputs: Vec<RawOutput>,
    lock_time: u32,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn coinbase() -> Self {
        let mut builder = Self::new();
        builder.inputs.push(coinbase_input(vec![0x51]));
        builder
    }

    pub fn with_coinbase_script(mut self, script_sig: Vec<u8>) -> Self {
        self.inputs = vec![coinbase_input(script_sig)];
        self
    }

    pub fn with_input(mut self, prev_outpoint: Outpoint, script_sig: Vec<u8>) -> Self {
        self.inputs.push(RawInput {
            prev_outpoint,
            script_sig,
            sequence: 0xffff_ffff,
            witness: Vec::new(),
        });
        self
    }

    pub fn with_output(mut self, value: u64, script_pubkey: Vec<u8>) -> Self {
        self.outputs.push(RawOutput { value, script_pubkey });
        self
    }

    pub fn with_lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = lock_time;
        self
    }

    pub fn build(self) -> RawTransaction {
        let inputs = if self.inputs.is_empty() {
            vec![coinbase_input(vec![0x51])]
        } else {
            self.inputs
        };
        let outputs = if self.outputs.is_empty() {
            vec![RawOutput {
                value: 50_0000_0000,
                script_pubkey: default_p2pkh_script(),
            }]
        } else {
            self.outputs
        };
        RawTransaction {
            version: self.version,
            has_witness: false,
            inputs,
            outputs,
            lock_time: self.lock_time,
        }
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a single block, defaulting to one coinbase-only transaction. When
/// `prev_hash` is left at its zero default, `DataDirBuilder::with_block`
/// chains it to the previously appended block automatically.
pub struct BlockBuilder {
    prev_hash: BlockHash,
    time: u32,
    bits: u32,
    nonce: u32,
    transactions: Vec<RawTransaction>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self {
            prev_hash: BlockHash::all_zero(),
            time: 1_231_006_505,
            bits: 0x1d00_ffff,
            nonce: 0,
            transactions: Vec::new(),
        }
    }

    pub fn with_prev_hash(mut self, prev_hash: BlockHash) -> Self {
        self.prev_hash = prev_hash;
        self
    }

    pub fn with_time(mut self, time: u32) -> Self {
        self.time = time;
        self
    }

    pub fn with_transaction(mut self, tx: RawTransaction) -> Self {
        self.transactions.push(tx);
        self
    }

    pub fn build(self) -> RawBlock {
        let transactions = if self.transactions.is_empty() {
            vec![TransactionBuilder::coinbase().build()]
        } else {
            self.transactions
        };
        RawBlock {
            header: RawBlockHeader {
                version: 1,
                prev_hash: self.prev_hash,
                merkle_root: [0u8; 32],
                time: self.time,
                bits: self.bits,
                nonce: self.nonce,
            },
            transactions,
        }
    }
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn coinbase_input(script_sig: Vec<u8>) -> RawInput {
    RawInput {
        prev_outpoint: Outpoint::new(TxId::all_zero(), 0xffff_ffff),
        script_sig,
        sequence: 0xffff_ffff,
        witness: Vec::new(),
    }
}

fn default_p2pkh_script() -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(&[0xab; 20]);
    script.push(0x88);
    script.push(0xac);
    script
}

/// A temporary node data directory: `blocks/blk00000.dat` plus a populated
/// `blocks/index/` LevelDB store and, when requested, an `indexes/txindex/`
/// one. Held alive only as long as the `DataDir` value is; dropping it
/// removes the directory.
pub struct DataDir {
    _tempdir: TempDir,
    path: PathBuf,
}

impl DataDir {
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// Appends blocks (in order, height 0 first) to a single flat block file and
/// writes their entries into synthetic LevelDB index stores, the way
/// `BlockIndex::load`/`TxIndex::load` expect to find them on a real node.
pub struct DataDirBuilder {
    network: Network,
    tx_index: bool,
    blocks: Vec<RawBlock>,
}

impl DataDirBuilder {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            tx_index: true,
            blocks: Vec::new(),
        }
    }

    pub fn with_tx_index(mut self, enabled: bool) -> Self {
        self.tx_index = enabled;
        self
    }

    /// Appends `block` at the next height. If its header's `prev_hash` is
    /// still the zero default, it is rewritten to the hash of the
    /// previously appended block, so callers building a linear chain don't
    /// have to thread hashes through themselves.
    pub fn with_block(mut self, mut block: RawBlock) -> Self {
        if block.header.prev_hash.is_all_zero() {
            if let Some(prev) = self.blocks.last() {
                block.header.prev_hash = prev.header.block_hash();
            }
        }
        self.blocks.push(block);
        self
    }

    pub fn build(self) -> DataDir {
        let tempdir = tempfile::tempdir().expect("failed to create fixture datadir");
        let path = tempdir.path().to_path_buf();

        let blocks_dir = path.join("blocks");
        fs::create_dir_all(&blocks_dir).expect("failed to create blocks/ dir");
        let mut block_file =
            File::create(blocks_dir.join("blk00000.dat")).expect("failed to create blk00000.dat");

        let index_dir = blocks_dir.join("index");
        fs::create_dir_all(&index_dir).expect("failed to create blocks/index/ dir");
        let mut index_db = DB::open(&index_dir, LevelDbOptions::default())
            .expect("failed to open fixture block index store");

        let mut tx_index_db = if self.tx_index {
            let dir = path.join("indexes").join("txindex");
            fs::create_dir_all(&dir).expect("failed to create indexes/txindex/ dir");
            Some(
                DB::open(&dir, LevelDbOptions::default())
                    .expect("failed to open fixture tx index store"),
            )
        } else {
            None
        };

        let mut offset: u64 = 0;
        for (height, block) in self.blocks.iter().enumerate() {
            let height = height as u32;
            let data_pos = offset as u32;

            let mut encoded = Vec::new();
            block
                .encode(&mut encoded)
                .expect("encoding a fixture block into a Vec cannot fail");
            write_block_record(&mut block_file, self.network.magic(), &encoded)
                .expect("failed to write fixture block record");
            offset += 8 + encoded.len() as u64;

            let hash = block.header.block_hash();
            let record = BlockIndexRecord {
                height,
                status: BlockStatus::VALID_SCRIPTS | BlockStatus::HAVE_DATA | BlockStatus::HAVE_UNDO,
                n_tx: block.transactions.len() as u32,
                file: Some(0),
                data_pos: Some(data_pos),
                undo_pos: Some(0),
                header_version: block.header.version,
                prev_hash: block.header.prev_hash,
                merkle_root: block.header.merkle_root,
                time: block.header.time,
                bits: block.header.bits,
                nonce: block.header.nonce,
            };
            index_db
                .put(&block_index_key(&hash), &record.encode())
                .expect("failed to write fixture block index entry");

            if let Some(db) = tx_index_db.as_mut() {
                for tx in &block.transactions {
                    let tx_record = TxIndexRecord {
                        file: 0,
                        block_pos: data_pos,
                        tx_offset: 0,
                    };
                    db.put(&tx_index_key(&tx.txid()), &tx_record.encode())
                        .expect("failed to write fixture tx index entry");
                }
            }
        }

        index_db
            .flush()
            .expect("failed to flush fixture block index store");
        drop(index_db);
        if let Some(mut db) = tx_index_db.take() {
            db.flush().expect("failed to flush fixture tx index store");
            drop(db);
        }

        DataDir {
            _tempdir: tempdir,
            path,
        }
    }
}

fn block_index_key(hash: &BlockHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(b'b');
    key.extend_from_slice(&hash.to_le_bytes());
    key
}

fn tx_index_key(txid: &TxId) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(b't');
    key.extend_from_slice(&txid.to_le_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainquery_core::{ChainQuery, Options, RandomAccess};

    #[test]
    fn a_two_block_fixture_chain_opens_and_connects() {
        let genesis = BlockBuilder::new().with_time(1_231_006_505).build();
        let coinbase_two = TransactionBuilder::coinbase().build();
        let spend = TransactionBuilder::new()
            .with_input(Outpoint::new(coinbase_two.txid(), 0), vec![0x51])
            .with_output(49_0000_0000, default_p2pkh_script())
            .build();
        let second = BlockBuilder::new()
            .with_time(1_231_006_506)
            .with_transaction(coinbase_two)
            .with_transaction(spend)
            .build();

        let datadir = DataDirBuilder::new(Network::Regtest)
            .with_block(genesis)
            .with_block(second)
            .build();

        let engine = ChainQuery::open(
            Options::new(datadir.path().to_path_buf()).with_network(Network::Regtest),
        )
        .unwrap();

        assert_eq!(engine.get_max_height().unwrap(), 1);
        let block = engine.get_block(1, false, true).unwrap();
        let _ = block.to_json();
    }

    #[test]
    fn without_tx_index_the_store_is_absent() {
        let genesis = BlockBuilder::new().build();
        let datadir = DataDirBuilder::new(Network::Regtest)
            .with_tx_index(false)
            .with_block(genesis)
            .build();
        assert!(!datadir.path().join("indexes").join("txindex").is_dir());
    }
}
