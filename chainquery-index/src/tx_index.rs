//! Wraps `indexes/txindex/`, the node's optional transaction index, for
//! O(1) txid -> on-disk location lookups. Absent when the node was run
//! without `-txindex`; spec.md requires callers to get a clear
//! `TxIndexDisabled` signal rather than a generic not-found in that case.

use crate::error::IndexError;
use crate::record::TxIndexRecord;
use crate::store::KvStore;
use chainquery_types::TxId;
use std::path::Path;

const TX_INDEX_PREFIX: u8 = b't';

pub struct TxIndex {
    store: KvStore,
}

impl TxIndex {
    /// Returns `Ok(None)` if `indexes/txindex/` does not exist under
    /// `datadir` (the node was never run with `-txindex`), rather than an
    /// error — the caller decides whether that's fatal.
    pub fn load(datadir: impl AsRef<Path>) -> Result<Option<Self>, IndexError> {
        let dir = datadir.as_ref().join("indexes").join("txindex");
        if !dir.is_dir() {
            return Ok(None);
        }
        Ok(Some(Self {
            store: KvStore::open(dir)?,
        }))
    }

    pub fn lookup(&mut self, txid: &TxId) -> Result<TxIndexRecord, IndexError> {
        let mut key = Vec::with_capacity(33);
        key.push(TX_INDEX_PREFIX);
        key.extend_from_slice(&txid.to_le_bytes());
        let value = self
            .store
            .get(&key)
            .ok_or_else(|| IndexError::UnknownTxId(txid.to_hex()))?;
        TxIndexRecord::decode(&value)
    }
}
