//! Thin adapter over the node's on-disk key-value index stores
//! (`blocks/index/`, `indexes/txindex/`), opened with an OS-level exclusive
//! lock per spec.md §5 ("two engine instances cannot open the same data
//! directory simultaneously, and ... the node itself must be shut down
//! first"). Wraps `rusty-leveldb`, the same pure-Rust LevelDB
//! implementation `bootstrap/utxo-dump` already depends on for exactly this
//! kind of on-disk store.

use crate::error::IndexError;
use fs2::FileExt;
use rusty_leveldb::{LdbIterator, Options, DB};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// A held, process-exclusive lock on an index store directory. Dropping it
/// releases the lock, which is what lets a short-lived engine instance
/// (e.g. in a test) hand the store back promptly.
struct StoreLock {
    _file: File,
}

impl StoreLock {
    fn acquire(dir: &Path) -> Result<Self, IndexError> {
        std::fs::create_dir_all(dir)?;
        let lock_path = dir.join("chainquery.lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)?;
        file.try_lock_exclusive().map_err(|_| IndexError::LockHeld)?;
        Ok(Self { _file: file })
    }
}

/// A read-only view over one of the node's LevelDB index stores, held under
/// an exclusive lock for the lifetime of this handle.
pub struct KvStore {
    db: DB,
    _lock: StoreLock,
}

impl KvStore {
    /// Opens the store at `dir`. Fails with `LockHeld` if another process
    /// (most likely the node itself, or another `chainquery` instance)
    /// already holds the lock.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let dir: PathBuf = dir.as_ref().to_path_buf();
        let lock = StoreLock::acquire(&dir)?;
        let options = Options::default();
        let db = DB::open(&dir, options).map_err(|e| IndexError::Io(to_io_error(e)))?;
        Ok(Self { db, _lock: lock })
    }

    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.get(key)
    }

    /// Invokes `callback` with every `(key, value)` pair whose key starts
    /// with `prefix`, in key order. Stops early (without error) once keys
    /// stop matching the prefix, since LevelDB iterates in sorted order.
    pub fn scan(
        &mut self,
        prefix: &[u8],
        mut callback: impl FnMut(&[u8], &[u8]),
    ) -> Result<(), IndexError> {
        let mut iter = self
            .db
            .new_iter()
            .map_err(|e| IndexError::Io(to_io_error(e)))?;
        iter.seek(prefix);
        while iter.valid() {
            match iter.next() {
                Some((key, value)) => {
                    if !key.starts_with(prefix) {
                        break;
                    }
                    callback(&key, &value);
                }
                None => break,
            }
        }
        Ok(())
    }
}

fn to_io_error(status: rusty_leveldb::Status) -> std::io::Error {
    std::io::Error::other(status.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_open_fails_with_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let _store = KvStore::open(dir.path()).unwrap();
        let second = KvStore::open(dir.path());
        assert!(matches!(second, Err(IndexError::LockHeld)));
    }

    #[test]
    fn scan_respects_prefix_and_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = KvStore::open(dir.path()).unwrap();
            store.db.put(b"a:1", b"one").unwrap();
            store.db.put(b"b:1", b"two").unwrap();
            store.db.put(b"b:2", b"three").unwrap();
            store.db.flush().unwrap();

            let mut seen = Vec::new();
            store
                .scan(b"b:", |k, v| seen.push((k.to_vec(), v.to_vec())))
                .unwrap();
            assert_eq!(
                seen,
                vec![
                    (b"b:1".to_vec(), b"two".to_vec()),
                    (b"b:2".to_vec(), b"three".to_vec()),
                ]
            );
        }
    }
}
