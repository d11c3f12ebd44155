//! Block body decode: the 80-byte header plus a varint transaction count and
//! that many transactions (spec.md §4.C).

use super::transaction::RawTransaction;
use chainquery_types::codec::{read_compact_size, write_compact_size};
use chainquery_types::error::DecodeError;
use chainquery_types::BlockHash;
use std::io::{Cursor, Read, Write};

pub const HEADER_LEN: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlockHeader {
    pub version: i32,
    pub prev_hash: BlockHash,
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl RawBlockHeader {
    pub fn decode(cursor: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        let version = read_i32(cursor)?;
        let mut prev_hash_bytes = [0u8; 32];
        cursor.read_exact(&mut prev_hash_bytes)?;
        let mut merkle_root = [0u8; 32];
        cursor.read_exact(&mut merkle_root)?;
        let time = read_u32(cursor)?;
        let bits = read_u32(cursor)?;
        let nonce = read_u32(cursor)?;
        Ok(Self {
            version,
            prev_hash: BlockHash::from_le_bytes(prev_hash_bytes),
            merkle_root,
            time,
            bits,
            nonce,
        })
    }

    pub fn encode(&self, writer: &mut impl Write) -> Result<(), DecodeError> {
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.prev_hash.to_le_bytes())?;
        writer.write_all(&self.merkle_root)?;
        writer.write_all(&self.time.to_le_bytes())?;
        writer.write_all(&self.bits.to_le_bytes())?;
        writer.write_all(&self.nonce.to_le_bytes())?;
        Ok(())
    }

    /// Double-SHA256 of the 80 serialized header bytes, in wire (LE) order.
    pub fn block_hash(&self) -> BlockHash {
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        self.encode(&mut bytes).expect("encoding into a Vec cannot fail");
        BlockHash::from_le_bytes(double_sha256(&bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub header: RawBlockHeader,
    pub transactions: Vec<RawTransaction>,
}

impl RawBlock {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(bytes);
        let header = RawBlockHeader::decode(&mut cursor)?;
        let tx_count = read_compact_size(&mut cursor)?;
        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            transactions.push(RawTransaction::decode(&mut cursor)?);
        }
        Ok(Self { header, transactions })
    }

    pub fn encode(&self, writer: &mut impl Write) -> Result<(), DecodeError> {
        self.header.encode(writer)?;
        write_compact_size(writer, self.transactions.len() as u64)?;
        for tx in &self.transactions {
            tx.encode(writer)?;
        }
        Ok(())
    }
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, DecodeError> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(cursor: &mut Cursor<&[u8]>) -> Result<i32, DecodeError> {
    Ok(read_u32(cursor)? as i32)
}

fn double_sha256(bytes: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first);
    second.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::transaction::{RawInput, RawOutput};
    use chainquery_types::{Outpoint, TxId};

    fn sample_block() -> RawBlock {
        let coinbase = RawTransaction {
            version: 1,
            has_witness: false,
            inputs: vec![RawInput {
                prev_outpoint: Outpoint::new(TxId::from_le_bytes([0u8; 32]), 0xffff_ffff),
                script_sig: vec![0x04],
                sequence: 0xffff_ffff,
                witness: Vec::new(),
            }],
            outputs: vec![RawOutput {
                value: 50_0000_0000,
                script_pubkey: vec![0x76, 0xa9, 0x14],
            }],
            lock_time: 0,
        };
        RawBlock {
            header: RawBlockHeader {
                version: 1,
                prev_hash: BlockHash::from_le_bytes([0u8; 32]),
                merkle_root: [7u8; 32],
                time: 1_231_006_505,
                bits: 0x1d00ffff,
                nonce: 2_083_236_893,
            },
            transactions: vec![coinbase],
        }
    }

    #[test]
    fn roundtrips_a_block_byte_for_byte() {
        let block = sample_block();
        let mut bytes = Vec::new();
        block.encode(&mut bytes).unwrap();

        let decoded = RawBlock::decode(&bytes).unwrap();
        assert_eq!(decoded, block);

        let mut reencoded = Vec::new();
        decoded.encode(&mut reencoded).unwrap();
        assert_eq!(reencoded, bytes);
    }

    #[test]
    fn header_hash_is_stable_for_identical_fields() {
        let a = sample_block().header;
        let b = sample_block().header;
        assert_eq!(a.block_hash(), b.block_hash());
    }
}
