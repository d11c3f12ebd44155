use crate::error::DecodeError;
use std::fmt;
use std::str::FromStr;

/// A 32-byte double-SHA256 digest, stored in the wire (little-endian) byte
/// order and displayed the conventional way (big-endian hex), matching the
/// `txid.reverse()` dance `bootstrap/utxo-dump` does before hex-encoding.
macro_rules! wire_hash {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn from_le_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn to_le_bytes(self) -> [u8; 32] {
                self.0
            }

            /// All-zero hash; used as the coinbase previous-txid sentinel.
            pub const fn all_zero() -> Self {
                Self([0u8; 32])
            }

            pub fn is_all_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Hex string in display (big-endian) order.
            pub fn to_hex(self) -> String {
                let mut reversed = self.0;
                reversed.reverse();
                hex::encode(reversed)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = hex::decode(s)
                    .map_err(|e| DecodeError::InvalidEncoding(format!("{}: {e}", s)))?;
                if bytes.len() != 32 {
                    return Err(DecodeError::InvalidEncoding(format!(
                        "{} is not a 32-byte hash",
                        s
                    )));
                }
                bytes.reverse();
                let mut array = [0u8; 32];
                array.copy_from_slice(&bytes);
                Ok(Self(array))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

wire_hash!(BlockHash);
wire_hash!(TxId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_byte_reverses_wire_order() {
        let mut wire = [0u8; 32];
        wire[0] = 0xab;
        wire[31] = 0xcd;
        let hash = BlockHash::from_le_bytes(wire);
        assert!(hash.to_hex().starts_with("cd"));
        assert!(hash.to_hex().ends_with("ab"));
    }

    #[test]
    fn roundtrips_through_display_and_fromstr() {
        let hex_str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
        let hash = TxId::from_str(hex_str).unwrap();
        assert_eq!(hash.to_hex(), hex_str);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(BlockHash::from_str("abcd").is_err());
    }
}
