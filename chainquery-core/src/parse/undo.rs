//! Undo file decode: for each non-coinbase transaction in a block, in block
//! order, one previous-output record per non-coinbase input (spec.md §4.C).
//! The per-record layout — varint `height*2 + coinbase`, a legacy dummy
//! version varint, then a compressed amount and compressed script — and the
//! `nsize` compressed-script table are ported from
//! `bootstrap/utxo-dump/src/chainstate.rs::{deserialize_txout,deserialize_script}`,
//! which decodes the same `CTxOutCompressor` encoding for chainstate
//! entries; undo records on disk use the identical compression for the
//! previous output they carry.

use chainquery_types::codec::{decompress_amount, read_core_varint, write_core_varint};
use chainquery_types::error::DecodeError;
use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, PublicKey, ScriptBuf, ScriptHash};
use std::io::{Read, Write};

/// One previous output consumed by a non-coinbase input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoTxOut {
    pub height: u32,
    pub coinbase: bool,
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// Previous outputs consumed by one non-coinbase transaction's inputs, in
/// wire (input) order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxUndo {
    pub prevouts: Vec<UndoTxOut>,
}

/// The decoded undo data for one block: one `TxUndo` per non-coinbase
/// transaction, in block order. The coinbase transaction has no entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockUndo {
    pub tx_undo: Vec<TxUndo>,
}

impl BlockUndo {
    /// `non_coinbase_input_counts[i]` is the number of non-coinbase inputs
    /// of the i-th non-coinbase transaction in the block, used to know how
    /// many `UndoTxOut` records to read per transaction.
    pub fn decode(
        reader: &mut impl Read,
        non_coinbase_input_counts: &[usize],
    ) -> Result<Self, DecodeError> {
        let mut tx_undo = Vec::with_capacity(non_coinbase_input_counts.len());
        for &input_count in non_coinbase_input_counts {
            let mut prevouts = Vec::with_capacity(input_count);
            for _ in 0..input_count {
                prevouts.push(UndoTxOut::decode(reader)?);
            }
            tx_undo.push(TxUndo { prevouts });
        }
        Ok(Self { tx_undo })
    }

    pub fn encode(&self, writer: &mut impl Write) -> Result<(), DecodeError> {
        for tx in &self.tx_undo {
            for prevout in &tx.prevouts {
                prevout.encode(writer)?;
            }
        }
        Ok(())
    }
}

impl UndoTxOut {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let code = read_core_varint(reader)?;
        let height = (code / 2) as u32;
        let coinbase = code & 1 != 0;
        if height > 0 {
            let _legacy_version_dummy = read_core_varint(reader)?;
        }

        let compressed_amount = read_core_varint(reader)?;
        let value = decompress_amount(compressed_amount)?;
        let script_pubkey = decode_compressed_script(reader)?;

        Ok(Self {
            height,
            coinbase,
            value,
            script_pubkey,
        })
    }

    fn encode(&self, writer: &mut impl Write) -> Result<(), DecodeError> {
        let code = (self.height as u64) * 2 + self.coinbase as u64;
        write_core_varint(writer, code)?;
        if self.height > 0 {
            write_core_varint(writer, 0)?;
        }
        write_core_varint(writer, compress_amount(self.value))?;
        encode_compressed_script(writer, &self.script_pubkey)?;
        Ok(())
    }
}

/// `nsize` compressed-script table, ported from `chainstate.rs`:
/// 0/1 = hash160 (P2PKH/P2SH), 2..=5 = compressed/uncompressed pubkey
/// (P2PK), 6+ = raw script of length `nsize - 6`.
fn decode_compressed_script(reader: &mut impl Read) -> Result<Vec<u8>, DecodeError> {
    let nsize = read_core_varint(reader)?;

    if nsize >= 6 {
        let script_len = (nsize - 6) as usize;
        let mut bytes = vec![0u8; script_len];
        reader.read_exact(&mut bytes)?;
        return Ok(bytes);
    }

    let compressed_len = match nsize {
        0 | 1 => 20,
        2 | 3 | 4 | 5 => 33,
        _ => unreachable!("nsize < 6 only matches the arms above"),
    };
    let mut compressed = vec![0u8; compressed_len];
    if (2..6).contains(&nsize) {
        compressed[0] = nsize as u8;
        reader.read_exact(&mut compressed[1..])?;
    } else {
        reader.read_exact(&mut compressed)?;
    }

    let script = match nsize {
        0 => {
            let hash: [u8; 20] = compressed.try_into().expect("20 bytes");
            ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash))
        }
        1 => {
            let hash: [u8; 20] = compressed.try_into().expect("20 bytes");
            ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash))
        }
        2 | 3 => {
            let pk = PublicKey::from_slice(&compressed)
                .map_err(|e| DecodeError::InvalidEncoding(format!("bad compressed pubkey: {e}")))?;
            ScriptBuf::new_p2pk(&pk)
        }
        4 | 5 => {
            // 4 => y is even, prefix must read as 0x02; 5 => y is odd, prefix 0x03.
            let mut fixed = compressed;
            fixed[0] -= 2;
            let secp_pk = secp256k1::PublicKey::from_slice(&fixed)
                .map_err(|e| DecodeError::InvalidEncoding(format!("bad compressed pubkey: {e}")))?;
            let uncompressed = secp_pk.serialize_uncompressed();
            let pk = PublicKey::from_slice(&uncompressed)
                .map_err(|e| DecodeError::InvalidEncoding(format!("bad uncompressed pubkey: {e}")))?;
            ScriptBuf::new_p2pk(&pk)
        }
        _ => unreachable!(),
    };
    Ok(script.into_bytes())
}

fn encode_compressed_script(writer: &mut impl Write, script_pubkey: &[u8]) -> Result<(), DecodeError> {
    // Fixtures and re-encoding always use the uncompressed (nsize >= 6)
    // form; the compressed forms (0-5) are a storage optimisation whose
    // decode path above is the part spec.md actually requires.
    let nsize = script_pubkey.len() as u64 + 6;
    write_core_varint(writer, nsize)?;
    writer.write_all(script_pubkey)?;
    Ok(())
}

fn compress_amount(amount: u64) -> u64 {
    if amount == 0 {
        return 0;
    }
    let mut e = 0u64;
    let mut n = amount;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    if e < 9 {
        let d = n % 10;
        debug_assert!((1..=9).contains(&d));
        n /= 10;
        n * 10 * 9 + d * 10 + e + 1
    } else {
        n * 10 + 9 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_single_p2pkh_undo_entry() {
        let entry = UndoTxOut {
            height: 9,
            coinbase: true,
            value: 50_0000_0000,
            script_pubkey: {
                let script = ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([1u8; 20]));
                script.into_bytes()
            },
        };
        let mut bytes = Vec::new();
        entry.encode(&mut bytes).unwrap();
        let decoded = UndoTxOut::decode(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn block_undo_reads_the_right_number_of_entries_per_tx() {
        let one = UndoTxOut {
            height: 1,
            coinbase: false,
            value: 1_000,
            script_pubkey: vec![0x51],
        };
        let two = UndoTxOut {
            height: 2,
            coinbase: false,
            value: 2_000,
            script_pubkey: vec![0x52, 0x53],
        };

        let mut bytes = Vec::new();
        one.encode(&mut bytes).unwrap();
        two.encode(&mut bytes).unwrap();
        two.encode(&mut bytes).unwrap();

        let decoded = BlockUndo::decode(&mut &bytes[..], &[1, 2]).unwrap();
        assert_eq!(decoded.tx_undo.len(), 2);
        assert_eq!(decoded.tx_undo[0].prevouts, vec![one]);
        assert_eq!(decoded.tx_undo[1].prevouts, vec![two.clone(), two]);
    }

    #[test]
    fn compress_amount_roundtrips_through_decompress() {
        for value in [0u64, 1, 100_000_000, 50 * 100_000_000, 21_000_000 * 100_000_000] {
            let compressed = compress_amount(value);
            assert_eq!(decompress_amount(compressed).unwrap(), value);
        }
    }
}
