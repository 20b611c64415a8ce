//! The Write-Ahead Log boundary.
//!
//! The core consumes exactly two operations at commit: `log_write` for each
//! dirty page's before/after images, then `force`. Records are framed as an
//! 8-byte header (total length, CRC of the body) followed by the
//! bincode-encoded body; `read_record` verifies the CRC. Replay and recovery
//! are outside the core.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};
use crate::transaction::TransactionId;
use crate::PageId;

/// A Log Sequence Number: the byte offset of a record in the log file.
pub type Lsn = u64;

const RECORD_HEADER_LEN: usize = 8;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum WalRecord {
    /// A page image pair, written before the page itself is flushed.
    Update {
        tid: TransactionId,
        pid: PageId,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    Commit {
        tid: TransactionId,
    },
    Abort {
        tid: TransactionId,
    },
}

pub struct WalManager {
    file: Mutex<File>,
    path: PathBuf,
    next_lsn: AtomicU64,
}

impl WalManager {
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let path_buf = path.as_ref().to_path_buf();
        if let Some(parent) = path_buf.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path_buf)?;
        let next_lsn = AtomicU64::new(file.metadata()?.len());
        Ok(Self {
            file: Mutex::new(file),
            path: path_buf,
            next_lsn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the before/after images of one page mutation.
    pub fn log_write(
        &self,
        tid: TransactionId,
        pid: PageId,
        before: &[u8],
        after: &[u8],
    ) -> DbResult<Lsn> {
        self.append(&WalRecord::Update {
            tid,
            pid,
            before: before.to_vec(),
            after: after.to_vec(),
        })
    }

    pub fn log_commit(&self, tid: TransactionId) -> DbResult<Lsn> {
        self.append(&WalRecord::Commit { tid })
    }

    pub fn log_abort(&self, tid: TransactionId) -> DbResult<Lsn> {
        self.append(&WalRecord::Abort { tid })
    }

    /// Durably syncs everything appended so far.
    pub fn force(&self) -> DbResult<()> {
        let file = self.file.lock().unwrap();
        file.sync_all()?;
        Ok(())
    }

    fn append(&self, record: &WalRecord) -> DbResult<Lsn> {
        let body = bincode::serialize(record)
            .map_err(|e| DbError::Db(format!("failed to encode WAL record: {e}")))?;
        let total_len = (RECORD_HEADER_LEN + body.len()) as u64;
        let lsn = self.next_lsn.fetch_add(total_len, Ordering::SeqCst);

        let mut hasher = Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(lsn))?;
        file.write_all(&(total_len as u32).to_be_bytes())?;
        file.write_all(&crc.to_be_bytes())?;
        file.write_all(&body)?;
        Ok(lsn)
    }

    /// Reads the record at `lsn`, returning it with the LSN of the following
    /// record. `None` past the end of the log.
    pub fn read_record(&self, lsn: Lsn) -> DbResult<Option<(WalRecord, Lsn)>> {
        let mut file = self.file.lock().unwrap();
        if lsn >= file.metadata()?.len() {
            return Ok(None);
        }

        file.seek(SeekFrom::Start(lsn))?;
        let mut header = [0u8; RECORD_HEADER_LEN];
        file.read_exact(&mut header)?;
        let total_len = u32::from_be_bytes(header[..4].try_into().expect("header length")) as usize;
        let crc = u32::from_be_bytes(header[4..].try_into().expect("header length"));
        if total_len < RECORD_HEADER_LEN {
            return Err(DbError::Db(format!(
                "corrupt WAL record length {total_len} at lsn {lsn}"
            )));
        }

        let mut body = vec![0u8; total_len - RECORD_HEADER_LEN];
        file.read_exact(&mut body)?;

        let mut hasher = Hasher::new();
        hasher.update(&body);
        if hasher.finalize() != crc {
            return Err(DbError::Db(format!("WAL record CRC mismatch at lsn {lsn}")));
        }

        let record = bincode::deserialize(&body)
            .map_err(|e| DbError::Db(format!("failed to decode WAL record: {e}")))?;
        Ok(Some((record, lsn + total_len as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_round_trip_in_order() {
        let dir = tempdir().unwrap();
        let wal = WalManager::open(dir.path().join("test.wal")).unwrap();

        let tid = TransactionId::new();
        let pid = PageId::new(3, 1);
        let first = wal.log_write(tid, pid, b"before", b"after").unwrap();
        wal.log_commit(tid).unwrap();
        wal.force().unwrap();

        let (record, next) = wal.read_record(first).unwrap().unwrap();
        match record {
            WalRecord::Update {
                tid: t,
                pid: p,
                before,
                after,
            } => {
                assert_eq!(t, tid);
                assert_eq!(p, pid);
                assert_eq!(before, b"before");
                assert_eq!(after, b"after");
            }
            other => panic!("unexpected record {other:?}"),
        }

        let (record, end) = wal.read_record(next).unwrap().unwrap();
        assert!(matches!(record, WalRecord::Commit { tid: t } if t == tid));
        assert!(wal.read_record(end).unwrap().is_none());
    }

    #[test]
    fn corrupted_body_fails_crc_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let wal = WalManager::open(&path).unwrap();
        let lsn = wal
            .log_write(TransactionId::new(), PageId::new(0, 0), b"x", b"y")
            .unwrap();
        wal.force().unwrap();
        drop(wal);

        // Flip one byte of the record body.
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let wal = WalManager::open(&path).unwrap();
        assert!(matches!(wal.read_record(lsn), Err(DbError::Db(_))));
    }
}
