//! Heap files: one flat on-disk file of fixed-size pages per table.
//!
//! Page N occupies bytes `[N * P, (N + 1) * P)`. All page access on behalf of
//! a transaction goes through the buffer pool so that locking and caching see
//! every fetch; the raw `read_page`/`write_page` pair is the buffer pool's
//! own I/O boundary.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::buffer_pool::{BufferPool, PageRef, Permission};
use crate::cairn_debug_log;
use crate::error::{DbError, DbResult};
use crate::page::HeapPage;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::{page_size, PageId, TableId};

pub struct HeapFile {
    file: Mutex<File>,
    path: PathBuf,
    table_id: TableId,
    desc: Arc<TupleDesc>,
}

impl HeapFile {
    /// Opens (or creates) the backing file. The table id is assigned by the
    /// catalog, never derived from the path.
    pub fn open<P: AsRef<Path>>(path: P, table_id: TableId, desc: Arc<TupleDesc>) -> DbResult<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;
        Ok(Self {
            file: Mutex::new(file),
            path: path_ref.to_path_buf(),
            table_id,
            desc,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages currently in the file.
    pub fn num_pages(&self) -> DbResult<usize> {
        let file = self.file.lock().unwrap();
        Ok((file.metadata()?.len() as usize).div_ceil(page_size()))
    }

    /// Reads the page at `pid` from disk. Fails if the offset lies past the
    /// end of the file.
    pub fn read_page(&self, pid: PageId) -> DbResult<HeapPage> {
        if pid.table_id != self.table_id {
            return Err(DbError::InvalidArgument(format!(
                "page {pid:?} does not belong to table {}",
                self.table_id
            )));
        }
        let offset = pid.page_no as u64 * page_size() as u64;

        let mut file = self.file.lock().unwrap();
        if offset + page_size() as u64 > file.metadata()?.len() {
            return Err(DbError::InvalidArgument(format!(
                "page {} is past the end of table {}'s file",
                pid.page_no, self.table_id
            )));
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; page_size()];
        file.read_exact(&mut data)?;
        drop(file);

        HeapPage::new(pid, &data, self.desc.clone())
    }

    /// Overwrites the page's on-disk bytes in place.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        let data = page.page_data()?;
        let offset = page.id().page_no as u64 * page_size() as u64;
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(())
    }

    /// Extends the file by one all-free page and returns its id. Only empty
    /// bytes reach disk here; the insert that follows stays in the cache
    /// until its transaction commits.
    fn append_empty_page(&self) -> DbResult<PageId> {
        let mut file = self.file.lock().unwrap();
        let page_no = (file.metadata()?.len() as usize).div_ceil(page_size()) as u32;
        let offset = page_no as u64 * page_size() as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&HeapPage::empty_page_data())?;
        file.sync_all()?;
        cairn_debug_log!(
            "[HeapFile] table {} grew to {} pages",
            self.table_id,
            page_no + 1
        );
        Ok(PageId::new(self.table_id, page_no))
    }

    /// Inserts the tuple into the first page with a free slot, fetching each
    /// candidate through the buffer pool with write permission; appends a new
    /// page when every existing one is full. Returns the mutated pages.
    pub fn insert_tuple(
        &self,
        bp: &BufferPool,
        tid: TransactionId,
        tuple: Tuple,
    ) -> DbResult<Vec<PageRef>> {
        for page_no in 0..self.num_pages()? as u32 {
            let pid = PageId::new(self.table_id, page_no);
            let page_ref = bp.get_page(tid, pid, Permission::ReadWrite)?;
            let has_room = page_ref.read().num_empty_slots() > 0;
            if has_room {
                page_ref.write().insert_tuple(tuple)?;
                return Ok(vec![page_ref]);
            }
        }

        let new_pid = self.append_empty_page()?;
        let page_ref = bp.get_page(tid, new_pid, Permission::ReadWrite)?;
        page_ref.write().insert_tuple(tuple)?;
        Ok(vec![page_ref])
    }

    /// Clears the slot named by the tuple's record id. Returns the mutated
    /// pages.
    pub fn delete_tuple(
        &self,
        bp: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> DbResult<Vec<PageRef>> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::Db("tuple to delete has no record id".to_string()))?;
        let page_ref = bp.get_page(tid, rid.page_id, Permission::ReadWrite)?;
        page_ref.write().delete_tuple(tuple)?;
        Ok(vec![page_ref])
    }

    /// A page-ordered iterator over the file's live tuples, fetching each
    /// page with read permission and skipping empty pages.
    pub fn iterator(
        self: &Arc<Self>,
        bp: Arc<BufferPool>,
        tid: TransactionId,
    ) -> HeapFileIterator {
        HeapFileIterator {
            file: self.clone(),
            bp,
            tid,
            next_page: 0,
            buffered: VecDeque::new(),
            opened: false,
        }
    }
}

/// Lazy cursor over a heap file. State is just the next page index and the
/// not-yet-yielded tuples of the current page; rewind is close then open.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    bp: Arc<BufferPool>,
    tid: TransactionId,
    next_page: u32,
    buffered: VecDeque<Tuple>,
    opened: bool,
}

impl HeapFileIterator {
    pub fn open(&mut self) -> DbResult<()> {
        self.opened = true;
        self.next_page = 0;
        self.buffered.clear();
        Ok(())
    }

    pub fn has_next(&mut self) -> DbResult<bool> {
        if !self.opened {
            return Ok(false);
        }
        while self.buffered.is_empty() && (self.next_page as usize) < self.file.num_pages()? {
            let pid = PageId::new(self.file.table_id(), self.next_page);
            self.next_page += 1;
            let page_ref = self
                .bp
                .get_page(self.tid, pid, Permission::ReadOnly)?;
            let page = page_ref.read();
            self.buffered.extend(page.iter().cloned());
        }
        Ok(!self.buffered.is_empty())
    }

    pub fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.has_next()? {
            return Ok(None);
        }
        Ok(self.buffered.pop_front())
    }

    pub fn rewind(&mut self) -> DbResult<()> {
        self.close();
        self.open()
    }

    pub fn close(&mut self) {
        self.opened = false;
        self.buffered.clear();
    }
}
