//! Transaction wire decode/encode, including the SegWit marker/flag
//! (spec.md §4.C). Operates on an in-memory `Cursor<&[u8]>` rather than a
//! generic `Read` because decoding the marker/flag requires peeking one byte
//! ahead of the input-count prefix and backtracking if it isn't `0x00`.

use chainquery_types::codec::{read_compact_size, write_compact_size};
use chainquery_types::error::DecodeError;
use chainquery_types::{Outpoint, TxId};
use std::io::{Cursor, Read, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    pub prev_outpoint: Outpoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Empty when the transaction carries no witness data, or when this
    /// particular input's witness stack is itself empty.
    pub witness: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub version: i32,
    pub has_witness: bool,
    pub inputs: Vec<RawInput>,
    pub outputs: Vec<RawOutput>,
    pub lock_time: u32,
}

impl RawTransaction {
    pub fn txid(&self) -> TxId {
        let mut bytes = Vec::new();
        self.encode_non_witness(&mut bytes)
            .expect("encoding into a Vec cannot fail");
        TxId::from_le_bytes(double_sha256(&bytes))
    }

    pub fn decode(cursor: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        let version = read_i32(cursor)?;

        let checkpoint = cursor.position();
        let maybe_marker = read_u8(cursor)?;
        let has_witness = if maybe_marker == 0x00 {
            let flag = read_u8(cursor)?;
            if flag != 0x01 {
                return Err(DecodeError::InvalidEncoding(format!(
                    "unexpected segwit flag byte {flag:#04x}"
                )));
            }
            true
        } else {
            cursor.set_position(checkpoint);
            false
        };

        let input_count = read_compact_size(cursor)?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            inputs.push(RawInput::decode(cursor)?);
        }

        let output_count = read_compact_size(cursor)?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            outputs.push(RawOutput::decode(cursor)?);
        }

        if has_witness {
            for input in inputs.iter_mut() {
                let stack_count = read_compact_size(cursor)?;
                let mut stack = Vec::with_capacity(stack_count as usize);
                for _ in 0..stack_count {
                    let len = read_compact_size(cursor)?;
                    let mut item = vec![0u8; len as usize];
                    cursor.read_exact(&mut item)?;
                    stack.push(item);
                }
                input.witness = stack;
            }
        }

        let lock_time = read_u32(cursor)?;

        Ok(Self {
            version,
            has_witness,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Encodes exactly what `decode` would have read, including the
    /// marker/flag and witness stacks when present. Used to verify
    /// byte-for-byte reserialisation (spec.md §8 invariant 4).
    pub fn encode(&self, writer: &mut impl Write) -> Result<(), DecodeError> {
        writer.write_all(&self.version.to_le_bytes())?;
        if self.has_witness {
            writer.write_all(&[0x00, 0x01])?;
        }

        write_compact_size(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.encode(writer)?;
        }

        write_compact_size(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.encode(writer)?;
        }

        if self.has_witness {
            for input in &self.inputs {
                write_compact_size(writer, input.witness.len() as u64)?;
                for item in &input.witness {
                    write_compact_size(writer, item.len() as u64)?;
                    writer.write_all(item)?;
                }
            }
        }

        writer.write_all(&self.lock_time.to_le_bytes())?;
        Ok(())
    }

    /// The legacy (pre-SegWit) serialization used for txid computation:
    /// never includes the marker/flag or witness data, regardless of
    /// `has_witness`.
    fn encode_non_witness(&self, writer: &mut impl Write) -> Result<(), DecodeError> {
        writer.write_all(&self.version.to_le_bytes())?;
        write_compact_size(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.encode(writer)?;
        }
        write_compact_size(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.encode(writer)?;
        }
        writer.write_all(&self.lock_time.to_le_bytes())?;
        Ok(())
    }
}

impl RawInput {
    fn decode(cursor: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        let mut txid_bytes = [0u8; 32];
        cursor.read_exact(&mut txid_bytes)?;
        let vout = read_u32(cursor)?;
        let script_len = read_compact_size(cursor)?;
        let mut script_sig = vec![0u8; script_len as usize];
        cursor.read_exact(&mut script_sig)?;
        let sequence = read_u32(cursor)?;

        Ok(Self {
            prev_outpoint: Outpoint::new(TxId::from_le_bytes(txid_bytes), vout),
            script_sig,
            sequence,
            witness: Vec::new(),
        })
    }

    fn encode(&self, writer: &mut impl Write) -> Result<(), DecodeError> {
        writer.write_all(&self.prev_outpoint.txid.to_le_bytes())?;
        writer.write_all(&self.prev_outpoint.vout.to_le_bytes())?;
        write_compact_size(writer, self.script_sig.len() as u64)?;
        writer.write_all(&self.script_sig)?;
        writer.write_all(&self.sequence.to_le_bytes())?;
        Ok(())
    }
}

impl RawOutput {
    fn decode(cursor: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        let value = read_u64(cursor)?;
        let script_len = read_compact_size(cursor)?;
        let mut script_pubkey = vec![0u8; script_len as usize];
        cursor.read_exact(&mut script_pubkey)?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }

    fn encode(&self, writer: &mut impl Write) -> Result<(), DecodeError> {
        writer.write_all(&self.value.to_le_bytes())?;
        write_compact_size(writer, self.script_pubkey.len() as u64)?;
        writer.write_all(&self.script_pubkey)?;
        Ok(())
    }
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, DecodeError> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, DecodeError> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(cursor: &mut Cursor<&[u8]>) -> Result<i32, DecodeError> {
    Ok(read_u32(cursor)? as i32)
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, DecodeError> {
    let mut buf = [0u8; 8];
    cursor.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
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

    fn legacy_transaction() -> RawTransaction {
        RawTransaction {
            version: 1,
            has_witness: false,
            inputs: vec![RawInput {
                prev_outpoint: Outpoint::new(TxId::from_le_bytes([0u8; 32]), 0xffff_ffff),
                script_sig: vec![0x51],
                sequence: 0xffff_ffff,
                witness: Vec::new(),
            }],
            outputs: vec![RawOutput {
                value: 50_0000_0000,
                script_pubkey: vec![0x76, 0xa9, 0x14],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn roundtrips_a_legacy_transaction() {
        let tx = legacy_transaction();
        let mut bytes = Vec::new();
        tx.encode(&mut bytes).unwrap();
        let decoded = RawTransaction::decode(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded, tx);

        let mut reencoded = Vec::new();
        decoded.encode(&mut reencoded).unwrap();
        assert_eq!(reencoded, bytes);
    }

    #[test]
    fn roundtrips_a_segwit_transaction_with_witness() {
        let mut tx = legacy_transaction();
        tx.has_witness = true;
        tx.inputs[0].witness = vec![vec![0xde, 0xad], vec![0xbe, 0xef, 0x01]];

        let mut bytes = Vec::new();
        tx.encode(&mut bytes).unwrap();
        assert_eq!(&bytes[4..6], &[0x00, 0x01]);

        let decoded = RawTransaction::decode(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn txid_excludes_witness_data() {
        let legacy = legacy_transaction();
        let mut segwit = legacy.clone();
        segwit.has_witness = true;
        segwit.inputs[0].witness = vec![vec![0x01]];

        assert_eq!(legacy.txid(), segwit.txid());
    }
}
