use std::path::Path;

/// Which Bitcoin network a data directory belongs to, inferred from the
/// directory layout the way `bootstrap/utxo-dump`'s CLI infers
/// testnet-ness from its `--db`/`--testnet` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    /// Magic bytes prefixing every record in `blocks/blk?????.dat`.
    pub const fn magic(self) -> [u8; 4] {
        match self {
            Network::Mainnet => [0xf9, 0xbe, 0xb4, 0xd9],
            Network::Testnet => [0x0b, 0x11, 0x09, 0x07],
            Network::Signet => [0x0a, 0x03, 0xcf, 0x40],
            Network::Regtest => [0xfa, 0xbf, 0xb5, 0xda],
        }
    }

    pub fn to_bitcoin_network(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }

    /// Infers the network from a Bitcoin Core data directory path, the way
    /// `bitcoind` itself lays out `testnet3`/`signet`/`regtest` as
    /// subdirectories of the base datadir.
    pub fn infer_from_datadir(path: &Path) -> Network {
        let text = path.to_string_lossy();
        if text.contains("testnet3") || text.contains("testnet") {
            Network::Testnet
        } else if text.contains("signet") {
            Network::Signet
        } else if text.contains("regtest") {
            Network::Regtest
        } else {
            Network::Mainnet
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn infers_testnet_from_suffix() {
        let p = PathBuf::from("/home/user/.bitcoin/testnet3");
        assert_eq!(Network::infer_from_datadir(&p), Network::Testnet);
    }

    #[test]
    fn defaults_to_mainnet() {
        let p = PathBuf::from("/home/user/.bitcoin");
        assert_eq!(Network::infer_from_datadir(&p), Network::Mainnet);
    }

    #[test]
    fn infers_regtest_and_signet() {
        assert_eq!(
            Network::infer_from_datadir(&PathBuf::from("/data/regtest")),
            Network::Regtest
        );
        assert_eq!(
            Network::infer_from_datadir(&PathBuf::from("/data/signet")),
            Network::Signet
        );
    }
}
