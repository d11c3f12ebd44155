//! Classifies `scriptPubKey` bytes into the standard output templates and
//! derives the addresses they pay to. Builds on `bitcoin::Address` for the
//! base58check/bech32 plumbing exactly as `bootstrap/utxo-dump`'s
//! `blockchain.rs`/`chainstate.rs` do for P2PKH/P2SH; this module adds the
//! SegWit/Taproot and bare-multisig templates the UTXO-dump tool never
//! needed (chainstate records only ever compress those five legacy shapes).

use crate::network::Network;
use bitcoin::blockdata::opcodes::all as opcodes;
use bitcoin::hashes::Hash;
use bitcoin::{Address, PubkeyHash, PublicKey, ScriptBuf, ScriptHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    P2pk,
    P2pkh,
    P2sh,
    MultisigBare,
    P2wpkh,
    P2wsh,
    P2tr,
    OpReturn,
    NonStandard,
}

/// Result of classifying a `scriptPubKey`. Never fails to produce one:
/// anything that doesn't match a known template is `NonStandard` with no
/// addresses, per spec.md's "`parse_script` is total" invariant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ParsedScript {
    pub script_type: ScriptType,
    pub addresses: Vec<String>,
    /// `(m, n)` for bare multisig: `m`-of-`n`.
    pub multisig: Option<(u8, u8)>,
}

impl ParsedScript {
    fn non_standard() -> Self {
        Self {
            script_type: ScriptType::NonStandard,
            addresses: vec![],
            multisig: None,
        }
    }
}

/// Classifies a raw `scriptPubKey` and derives its address(es). Total: no
/// input causes a panic or an `Err`.
pub fn parse_script(script_pubkey: &[u8], network: Network) -> ParsedScript {
    let script = ScriptBuf::from_bytes(script_pubkey.to_vec());

    if script.is_op_return() {
        return ParsedScript {
            script_type: ScriptType::OpReturn,
            addresses: vec![],
            multisig: None,
        };
    }

    if let Some(parsed) = try_p2pk(&script, network) {
        return parsed;
    }
    if let Some(parsed) = try_multisig_bare(&script, network) {
        return parsed;
    }
    if let Some(parsed) = try_standard_address_template(&script, network) {
        return parsed;
    }

    ParsedScript::non_standard()
}

/// `<pubkey> OP_CHECKSIG` -> one address, the P2PKH address of the pubkey.
fn try_p2pk(script: &ScriptBuf, network: Network) -> Option<ParsedScript> {
    let bytes = script.as_bytes();
    let push_len = match bytes.first()? {
        0x21 => 33usize,
        0x41 => 65usize,
        _ => return None,
    };
    if bytes.len() != 1 + push_len + 1 {
        return None;
    }
    if bytes[bytes.len() - 1] != opcodes::OP_CHECKSIG.to_u8() {
        return None;
    }
    let pubkey_bytes = &bytes[1..1 + push_len];
    let pubkey = PublicKey::from_slice(pubkey_bytes).ok()?;
    let address = Address::p2pkh(pubkey.pubkey_hash(), network.to_bitcoin_network());
    Some(ParsedScript {
        script_type: ScriptType::P2pk,
        addresses: vec![address.to_string()],
        multisig: None,
    })
}

/// `<m> <pubkey>...<pubkey> <n> OP_CHECKMULTISIG` (no `OP_HASH160` wrapper).
fn try_multisig_bare(script: &ScriptBuf, network: Network) -> Option<ParsedScript> {
    let bytes = script.as_bytes();
    if bytes.len() < 3 {
        return None;
    }
    if *bytes.last()? != opcodes::OP_CHECKMULTISIG.to_u8() {
        return None;
    }
    let m = decode_small_int(bytes[0])?;
    let n = decode_small_int(bytes[bytes.len() - 2])?;

    let mut cursor = 1usize;
    let mut pubkeys = Vec::new();
    while cursor < bytes.len() - 2 {
        let push_len = bytes[cursor] as usize;
        if push_len == 0 || push_len > 75 || cursor + 1 + push_len > bytes.len() - 2 {
            return None;
        }
        let pk_bytes = &bytes[cursor + 1..cursor + 1 + push_len];
        pubkeys.push(PublicKey::from_slice(pk_bytes).ok()?);
        cursor += 1 + push_len;
    }
    if cursor != bytes.len() - 2 || pubkeys.len() != n as usize || n < m {
        return None;
    }

    let addresses = pubkeys
        .iter()
        .map(|pk| Address::p2pkh(pk.pubkey_hash(), network.to_bitcoin_network()).to_string())
        .collect();

    Some(ParsedScript {
        script_type: ScriptType::MultisigBare,
        addresses,
        multisig: Some((m, n)),
    })
}

/// `OP_1` through `OP_16` (and `OP_0`) as a small integer, as used for `m`/`n`
/// in a bare multisig script.
fn decode_small_int(opcode: u8) -> Option<u8> {
    match opcode {
        0x00 => Some(0),
        0x51..=0x60 => Some(opcode - 0x50),
        _ => None,
    }
}

/// Everything `bitcoin::Address::from_script` already understands:
/// P2PKH, P2SH, P2WPKH, P2WSH, P2TR.
fn try_standard_address_template(script: &ScriptBuf, network: Network) -> Option<ParsedScript> {
    let bytes = script.as_bytes();

    let script_type = if script.is_p2pkh() {
        ScriptType::P2pkh
    } else if script.is_p2sh() {
        ScriptType::P2sh
    } else if bytes.len() == 22 && bytes[0] == 0x00 && bytes[1] == 0x14 {
        ScriptType::P2wpkh
    } else if bytes.len() == 34 && bytes[0] == 0x00 && bytes[1] == 0x20 {
        ScriptType::P2wsh
    } else if bytes.len() == 34 && bytes[0] == 0x51 && bytes[1] == 0x20 {
        ScriptType::P2tr
    } else {
        return None;
    };

    let address = Address::from_script(script, network.to_bitcoin_network()).ok()?;
    Some(ParsedScript {
        script_type,
        addresses: vec![address.to_string()],
        multisig: None,
    })
}

/// Derives the single P2PKH address for a 20-byte `hash160` pubkey hash, the
/// shape stored by P2PKH scripts (and by undo records under compression
/// type 0, see `chainquery_core::parse::undo`).
pub fn p2pkh_address_from_hash(hash: [u8; 20], network: Network) -> String {
    let pubkey_hash = PubkeyHash::from_byte_array(hash);
    Address::p2pkh(pubkey_hash, network.to_bitcoin_network()).to_string()
}

/// Derives the single P2SH address for a 20-byte `hash160` script hash, the
/// shape stored by P2SH scripts (and by undo records under compression
/// type 1).
pub fn p2sh_address_from_hash(hash: [u8; 20], network: Network) -> String {
    let script_hash = ScriptHash::from_byte_array(hash);
    Address::p2sh_from_hash(script_hash, network.to_bitcoin_network()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_p2pkh() {
        // OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
        let mut bytes = vec![0x76, 0xa9, 0x14];
        bytes.extend_from_slice(&[0xAA; 20]);
        bytes.push(0x88);
        bytes.push(0xac);
        let parsed = parse_script(&bytes, Network::Mainnet);
        assert_eq!(parsed.script_type, ScriptType::P2pkh);
        assert_eq!(parsed.addresses.len(), 1);
    }

    #[test]
    fn classifies_op_return_as_unspendable() {
        let bytes = vec![0x6a, 0x04, 0xde, 0xad, 0xbe, 0xef];
        let parsed = parse_script(&bytes, Network::Mainnet);
        assert_eq!(parsed.script_type, ScriptType::OpReturn);
        assert!(parsed.addresses.is_empty());
    }

    #[test]
    fn classifies_p2wpkh() {
        let mut bytes = vec![0x00, 0x14];
        bytes.extend_from_slice(&[0x01; 20]);
        let parsed = parse_script(&bytes, Network::Mainnet);
        assert_eq!(parsed.script_type, ScriptType::P2wpkh);
        assert!(parsed.addresses[0].starts_with("bc1q"));
    }

    #[test]
    fn classifies_p2tr() {
        let mut bytes = vec![0x51, 0x20];
        bytes.extend_from_slice(&[0x02; 32]);
        let parsed = parse_script(&bytes, Network::Mainnet);
        assert_eq!(parsed.script_type, ScriptType::P2tr);
        assert!(parsed.addresses[0].starts_with("bc1p"));
    }

    #[test]
    fn unrecognized_shape_is_non_standard_not_an_error() {
        let bytes = vec![0xab, 0xcd, 0xef];
        let parsed = parse_script(&bytes, Network::Mainnet);
        assert_eq!(parsed.script_type, ScriptType::NonStandard);
        assert!(parsed.addresses.is_empty());
    }

    #[test]
    fn empty_script_is_non_standard() {
        let parsed = parse_script(&[], Network::Mainnet);
        assert_eq!(parsed.script_type, ScriptType::NonStandard);
    }
}
