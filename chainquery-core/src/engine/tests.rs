//! End-to-end coverage of the engine's public contract against synthetic
//! data directories built with `chainquery-test-utils`, plus the genesis
//! coinbase transaction (public Bitcoin mainnet data, not sourced from the
//! reference pack) for the one scenario that calls for a real wire-format
//! fixture rather than a hand-built one.

use super::*;
use crate::format::BlockView;
use crate::parse::RawTransaction;
use chainquery_test_utils::{BlockBuilder, DataDir, DataDirBuilder, TransactionBuilder};
use chainquery_types::{Network, Outpoint, TxId};
use std::io::Cursor;

/// The first transaction ever mined, byte-for-byte. Public domain data; see
/// any Bitcoin block explorer for the genesis block.
const GENESIS_COINBASE_HEX: &str = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";
const GENESIS_COINBASE_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
const GENESIS_COINBASE_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

fn decode_genesis_coinbase() -> RawTransaction {
    let bytes = hex::decode(GENESIS_COINBASE_HEX).unwrap();
    RawTransaction::decode(&mut Cursor::new(&bytes)).unwrap()
}

fn p2pkh_script() -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(&[0xab; 20]);
    script.push(0x88);
    script.push(0xac);
    script
}

/// A four-block chain: a real genesis coinbase, then three more blocks each
/// spending the previous block's coinbase output. Mirrors the shape of the
/// height-9/height-170 mainnet connection scenario without needing an
/// actual synced data directory.
fn open_four_block_chain() -> (DataDir, ChainQuery) {
    let genesis = BlockBuilder::new()
        .with_time(1_231_006_505)
        .with_transaction(decode_genesis_coinbase())
        .build();

    let mut blocks = vec![genesis];
    let mut prev_coinbase_txid = GENESIS_COINBASE_TXID
        .parse::<TxId>()
        .expect("valid hex txid");

    for i in 1..4u32 {
        // Each block's coinbase must carry a distinct script_sig — two
        // byte-identical coinbase transactions would collide on txid and
        // corrupt the tx index.
        let coinbase = TransactionBuilder::new()
            .with_coinbase_script(vec![i as u8])
            .build();
        let spend = TransactionBuilder::new()
            .with_input(Outpoint::new(prev_coinbase_txid, 0), vec![0x51])
            .with_output(49_0000_0000 - i as u64 * 1_000_000, p2pkh_script())
            .build();
        prev_coinbase_txid = coinbase.txid();
        blocks.push(
            BlockBuilder::new()
                .with_time(1_231_006_505 + i)
                .with_transaction(coinbase)
                .with_transaction(spend)
                .build(),
        );
    }

    let mut builder = DataDirBuilder::new(Network::Mainnet);
    for block in blocks {
        builder = builder.with_block(block);
    }
    let datadir = builder.build();

    let engine = ChainQuery::open(
        Options::new(datadir.path().to_path_buf()).with_network(Network::Mainnet),
    )
    .unwrap();
    (datadir, engine)
}

// Invariants 1 and 2 (spec.md §8): height/hash resolve to each other in both
// directions, and a block header's own hash matches `get_hash_from_height`.
#[test]
fn invariant_height_and_hash_resolve_to_each_other() {
    let (_datadir, engine) = open_four_block_chain();
    let max_height = engine.get_max_height().unwrap();
    assert_eq!(max_height, 3);

    for h in 0..=max_height {
        let hash = engine.get_hash_from_height(h).unwrap();
        assert_eq!(engine.get_height_from_hash(&hash).unwrap(), h);

        let header = engine.get_block_header(h).unwrap();
        assert_eq!(header.hash, hash.to_hex());
    }
}

// Invariant 3: a txid resolved to a height via the tx index must actually
// appear in that height's block.
#[test]
fn invariant_height_from_txid_is_consistent_with_block_contents() {
    let (_datadir, engine) = open_four_block_chain();
    let txid = GENESIS_COINBASE_TXID.parse::<TxId>().unwrap();
    let height = engine.get_height_from_txid(&txid).unwrap();
    assert_eq!(height, 0);

    let BlockView::Full(block) = engine.get_block(height, false, false).unwrap() else {
        panic!("expected full view")
    };
    assert!(block.txdata.iter().any(|tx| tx.txid == txid.to_hex()));
}

// Invariant 4: a full-view block, reconstructed from its on-disk bytes,
// reserializes byte-for-byte.
#[test]
fn invariant_full_block_round_trips_byte_for_byte() {
    let (_datadir, engine) = open_four_block_chain();
    let raw = engine.decode_block_for_height(2).unwrap();

    let mut original_bytes = Vec::new();
    raw.encode(&mut original_bytes).unwrap();

    let decoded_again = crate::parse::RawBlock::decode(&original_bytes).unwrap();
    let mut reencoded = Vec::new();
    decoded_again.encode(&mut reencoded).unwrap();

    assert_eq!(original_bytes, reencoded);
}

// Invariants 5 and 6: the live UTXO map after block h reflects exactly what
// blocks 0..=h produced and spent, and a range iterator's last item matches
// a direct connected `get_block` call for the same height.
#[test]
fn invariant_connected_iteration_matches_direct_connected_lookup() {
    let (_datadir, engine) = open_four_block_chain();

    let mut iter = engine.iter_by_range(0, 4, false, true);
    let mut last = None;
    let mut entries_after_height = Vec::new();
    while let Some(item) = iter.next() {
        let view = item.unwrap();
        entries_after_height.push(iter.utxo_entry_count());
        last = Some(view);
    }
    let last = last.unwrap();

    // Every block past genesis spends exactly one coinbase output and
    // creates two new ones (a fresh coinbase plus the spend's single
    // output), so the map never runs dry and never grows without bound.
    assert!(entries_after_height.iter().all(|&n| n > 0));

    let direct = engine.get_block(3, false, true).unwrap();
    assert_eq!(last.to_json().unwrap(), direct.to_json().unwrap());
}

// Non-connected range iteration honors `start` (spec.md §6): only
// connected mode forces a walk from genesis.
#[test]
fn non_connected_range_iteration_starts_at_the_given_height() {
    let (_datadir, engine) = open_four_block_chain();
    let heights: Vec<u32> = engine
        .iter_by_range(2, 4, true, false)
        .map(|item| match item.unwrap() {
            BlockView::Simple(block) => block.height,
            BlockView::Full(block) => block.height,
        })
        .collect();
    assert_eq!(heights, vec![2, 3]);
}

// Invariant 7: parse_script never panics, and unrecognised input is
// NonStandard rather than an error.
#[test]
fn invariant_parse_script_is_total() {
    let (_datadir, engine) = open_four_block_chain();
    let probes: &[&[u8]] = &[
        &[],
        &[0x00],
        &[0xff; 64],
        &[0x6a],
        &[0x51, 0x20],
        &[0x76, 0xa9],
    ];
    for bytes in probes {
        let parsed = engine.parse_script(&hex::encode(bytes)).unwrap();
        let _ = parsed.script_type;
    }
}

// Scenario: the genesis coinbase transaction's txid and paid-to address
// match the well-known mainnet values.
#[test]
fn scenario_genesis_coinbase_matches_known_values() {
    let (_datadir, engine) = open_four_block_chain();
    let BlockView::Simple(block) = engine.get_block(0, true, false).unwrap() else {
        panic!("expected simple view")
    };
    assert_eq!(block.txdata.len(), 1);
    let coinbase = &block.txdata[0];
    assert_eq!(coinbase.txid, GENESIS_COINBASE_TXID);
    assert_eq!(coinbase.outputs.len(), 1);
    assert_eq!(coinbase.outputs[0].value, 50_0000_0000);
    assert_eq!(coinbase.outputs[0].addresses, vec![GENESIS_COINBASE_ADDRESS]);
}

// Scenario: tx-index-disabled construction fails transaction lookups with
// TxIndexDisabled rather than silently degrading.
#[test]
fn scenario_tx_lookup_without_tx_index_is_disabled() {
    let genesis = BlockBuilder::new()
        .with_transaction(decode_genesis_coinbase())
        .build();
    let datadir = DataDirBuilder::new(Network::Mainnet)
        .with_tx_index(false)
        .with_block(genesis)
        .build();
    let engine = ChainQuery::open(
        Options::new(datadir.path().to_path_buf())
            .with_network(Network::Mainnet)
            .with_tx_index(false),
    )
    .unwrap();

    let txid = GENESIS_COINBASE_TXID.parse::<TxId>().unwrap();
    let err = engine.get_transaction(&txid, true, false).unwrap_err();
    assert!(matches!(err, Error::TxIndexDisabled));
}

// Scenario: resolving a height past the tip fails with UnknownHeight.
#[test]
fn scenario_unknown_height_is_reported() {
    let (_datadir, engine) = open_four_block_chain();
    let max_height = engine.get_max_height().unwrap();
    let err = engine.get_hash_from_height(max_height + 1).unwrap_err();
    assert!(matches!(err, Error::UnknownHeight(h) if h == max_height + 1));
}

// Scenario: a block record whose first four on-disk bytes are not the
// network's magic fails with InvalidEncoding rather than silently
// misparsing.
#[test]
fn scenario_corrupt_magic_is_rejected() {
    let (datadir, engine) = open_four_block_chain();
    let block_file_path = datadir.path().join("blocks").join("blk00000.dat");
    let mut bytes = std::fs::read(&block_file_path).unwrap();
    bytes[0] ^= 0xff;
    std::fs::write(&block_file_path, bytes).unwrap();

    let err = engine.decode_block_for_height(0).unwrap_err();
    assert!(matches!(err, Error::InvalidEncoding(_)));
}

// Scenario: a second engine opened against a data directory another engine
// is still using fails with LockHeld, for the block-index store's
// exclusive lock (spec.md §5).
#[test]
fn scenario_second_engine_on_same_datadir_hits_lock_held() {
    let genesis = BlockBuilder::new()
        .with_transaction(decode_genesis_coinbase())
        .build();
    let datadir = DataDirBuilder::new(Network::Mainnet).with_block(genesis).build();

    let _first = ChainQuery::open(
        Options::new(datadir.path().to_path_buf()).with_network(Network::Mainnet),
    )
    .unwrap();

    let second = ChainQuery::open(
        Options::new(datadir.path().to_path_buf()).with_network(Network::Mainnet),
    );
    assert!(matches!(second, Err(Error::LockHeld)));
}
