//! On-disk record formats for the `blocks/index/` block-index store and the
//! `indexes/txindex/` transaction-index store. Both stores use Bitcoin
//! Core's internal varint (see `chainquery_types::codec::read_core_varint`)
//! for every integer field, the same format `bootstrap/utxo-dump` already
//! decodes for chainstate records — this module applies it to the sibling
//! on-disk formats spec.md needs instead (block index entries, tx index
//! entries) rather than UTXO entries.

use crate::error::IndexError;
use chainquery_types::codec::{read_core_varint, write_core_varint};
use chainquery_types::BlockHash;
use std::io::Read;

bitflags::bitflags! {
    /// Mirrors Bitcoin Core's `BlockStatus` bitfield.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BlockStatus: u64 {
        const VALID_HEADER       = 1;
        const VALID_TREE         = 2;
        const VALID_TRANSACTIONS = 3;
        const VALID_CHAIN        = 4;
        const VALID_SCRIPTS      = 5;
        const VALID_MASK         = 7;
        const HAVE_DATA          = 8;
        const HAVE_UNDO          = 16;
        const HAVE_MASK          = 24;
        const FAILED_VALID       = 32;
        const FAILED_CHILD       = 64;
        const FAILED_MASK        = 96;
        const OPT_WITNESS        = 128;
    }
}

/// Decoded form of a `'b'`-prefixed entry in `blocks/index/`: enough of
/// `CDiskBlockIndex` to place a block in the height/hash graph and locate
/// its bytes in the flat block files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndexRecord {
    pub height: u32,
    pub status: BlockStatus,
    pub n_tx: u32,
    pub file: Option<i32>,
    pub data_pos: Option<u32>,
    pub undo_pos: Option<u32>,
    pub header_version: i32,
    pub prev_hash: BlockHash,
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockIndexRecord {
    pub fn decode(mut bytes: &[u8]) -> Result<Self, IndexError> {
        let reader = &mut bytes;
        let _client_version = read_core_varint(reader)?;
        let height = read_core_varint(reader)? as u32;
        let status_bits = read_core_varint(reader)?;
        let status = BlockStatus::from_bits_truncate(status_bits);
        let n_tx = read_core_varint(reader)? as u32;

        let file = if status.intersects(BlockStatus::HAVE_DATA | BlockStatus::HAVE_UNDO) {
            Some(read_core_varint(reader)? as i32)
        } else {
            None
        };
        let data_pos = if status.contains(BlockStatus::HAVE_DATA) {
            Some(read_core_varint(reader)? as u32)
        } else {
            None
        };
        let undo_pos = if status.contains(BlockStatus::HAVE_UNDO) {
            Some(read_core_varint(reader)? as u32)
        } else {
            None
        };

        let header_version = read_i32_plain(reader)?;
        let mut prev_hash_bytes = [0u8; 32];
        reader.read_exact(&mut prev_hash_bytes)?;
        let mut merkle_root = [0u8; 32];
        reader.read_exact(&mut merkle_root)?;
        let time = read_u32_plain(reader)?;
        let bits = read_u32_plain(reader)?;
        let nonce = read_u32_plain(reader)?;

        Ok(Self {
            height,
            status,
            n_tx,
            file,
            data_pos,
            undo_pos,
            header_version,
            prev_hash: BlockHash::from_le_bytes(prev_hash_bytes),
            merkle_root,
            time,
            bits,
            nonce,
        })
    }

    pub fn is_in_active_chain_candidate(&self) -> bool {
        self.status.contains(BlockStatus::VALID_SCRIPTS)
            && self.status.contains(BlockStatus::HAVE_DATA)
            && !self.status.intersects(BlockStatus::FAILED_MASK)
    }

    /// True for a header the node has validated to at least `VALID_TREE`
    /// (connects to a known previous header) and that has not failed,
    /// regardless of whether its block data is on disk. Used to extend the
    /// active chain past its data tip for header-only heights.
    pub fn is_valid_header_candidate(&self) -> bool {
        self.status.contains(BlockStatus::VALID_TREE)
            && !self.status.intersects(BlockStatus::FAILED_MASK)
    }

    /// Encodes back to the `CDiskBlockIndex` byte layout `decode` reads.
    /// Used by `chainquery-test-utils` to populate synthetic `blocks/index/`
    /// fixtures; the engine itself never writes records.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_core_varint(&mut buf, 1).expect("encoding into a Vec cannot fail");
        write_core_varint(&mut buf, self.height as u64).expect("encoding into a Vec cannot fail");
        write_core_varint(&mut buf, self.status.bits()).expect("encoding into a Vec cannot fail");
        write_core_varint(&mut buf, self.n_tx as u64).expect("encoding into a Vec cannot fail");
        if let Some(file) = self.file {
            write_core_varint(&mut buf, file as u64).expect("encoding into a Vec cannot fail");
        }
        if let Some(pos) = self.data_pos {
            write_core_varint(&mut buf, pos as u64).expect("encoding into a Vec cannot fail");
        }
        if let Some(pos) = self.undo_pos {
            write_core_varint(&mut buf, pos as u64).expect("encoding into a Vec cannot fail");
        }
        buf.extend_from_slice(&self.header_version.to_le_bytes());
        buf.extend_from_slice(&self.prev_hash.to_le_bytes());
        buf.extend_from_slice(&self.merkle_root);
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.bits.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf
    }
}

/// Decoded form of a `'t'`-prefixed entry in `indexes/txindex/`:
/// `CDiskTxPos`, the (file, block offset, in-block offset) triple that
/// locates a transaction's bytes without scanning the block that contains
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxIndexRecord {
    pub file: i32,
    pub block_pos: u32,
    pub tx_offset: u32,
}

impl TxIndexRecord {
    pub fn decode(mut bytes: &[u8]) -> Result<Self, IndexError> {
        let reader = &mut bytes;
        let file = read_core_varint(reader)? as i32;
        let block_pos = read_core_varint(reader)? as u32;
        let tx_offset = read_core_varint(reader)? as u32;
        Ok(Self {
            file,
            block_pos,
            tx_offset,
        })
    }

    /// Encodes back to the `CDiskTxPos` byte layout `decode` reads. Used by
    /// `chainquery-test-utils` to populate synthetic `indexes/txindex/`
    /// fixtures.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_core_varint(&mut buf, self.file as u64).expect("encoding into a Vec cannot fail");
        write_core_varint(&mut buf, self.block_pos as u64).expect("encoding into a Vec cannot fail");
        write_core_varint(&mut buf, self.tx_offset as u64).expect("encoding into a Vec cannot fail");
        buf
    }
}

fn read_u32_plain(reader: &mut impl Read) -> Result<u32, IndexError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32_plain(reader: &mut impl Read) -> Result<i32, IndexError> {
    Ok(read_u32_plain(reader)? as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_fully_connected_record() {
        let record = BlockIndexRecord {
            height: 170,
            status: BlockStatus::VALID_SCRIPTS | BlockStatus::HAVE_DATA | BlockStatus::HAVE_UNDO,
            n_tx: 2,
            file: Some(0),
            data_pos: Some(123),
            undo_pos: Some(45),
            header_version: 1,
            prev_hash: BlockHash::from_le_bytes([7u8; 32]),
            merkle_root: [9u8; 32],
            time: 1_231_731_025,
            bits: 0x1d00ffff,
            nonce: 1_889_418_792,
        };
        let bytes = record.encode();
        let decoded = BlockIndexRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.is_in_active_chain_candidate());
    }

    #[test]
    fn header_only_record_has_no_file_positions() {
        let record = BlockIndexRecord {
            height: 5,
            status: BlockStatus::VALID_TREE,
            n_tx: 0,
            file: None,
            data_pos: None,
            undo_pos: None,
            header_version: 1,
            prev_hash: BlockHash::from_le_bytes([0u8; 32]),
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
        };
        let bytes = record.encode();
        let decoded = BlockIndexRecord::decode(&bytes).unwrap();
        assert_eq!(decoded.file, None);
        assert!(!decoded.is_in_active_chain_candidate());
    }

    #[test]
    fn tx_index_record_roundtrip() {
        let record = TxIndexRecord {
            file: 3,
            block_pos: 80_000,
            tx_offset: 145,
        };
        assert_eq!(TxIndexRecord::decode(&record.encode()).unwrap(), record);
    }
}
