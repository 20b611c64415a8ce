//! The buffer pool: a bounded cache of heap pages, and the enforcement point
//! for page locking and NO-STEAL/FORCE transaction semantics.
//!
//! Every page a transaction touches is fetched through `get_page`, which
//! acquires the lock matching the declared permission before consulting the
//! cache. A given page id resolves to at most one in-memory page at any
//! moment; callers share it through an `Arc`. Dirty pages never reach disk
//! before their transaction commits (NO-STEAL), and commit flushes every page
//! the transaction dirtied before its locks are released (FORCE).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use parking_lot::RwLock;

use crate::cairn_debug_log;
use crate::catalog::Catalog;
use crate::error::{DbError, DbResult};
use crate::failpoint;
use crate::lock_manager::LockManager;
use crate::page::HeapPage;
use crate::transaction::TransactionId;
use crate::tuple::Tuple;
use crate::wal::WalManager;
use crate::{PageId, TableId};

/// Default number of resident pages.
pub const DEFAULT_PAGES: usize = 50;

/// The access a caller declares when fetching a page. Read-only fetches take
/// a shared lock; read-write fetches take an exclusive lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

/// The single shared in-memory instance of a cached page.
pub type PageRef = Arc<RwLock<HeapPage>>;

pub struct BufferPool {
    capacity: usize,
    pool: Mutex<HashMap<PageId, PageRef>>,
    lock_manager: LockManager,
    catalog: Arc<Catalog>,
    log: Arc<WalManager>,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, log: Arc<WalManager>) -> Self {
        Self::with_capacity(DEFAULT_PAGES, catalog, log)
    }

    pub fn with_capacity(capacity: usize, catalog: Arc<Catalog>, log: Arc<WalManager>) -> Self {
        Self {
            capacity,
            pool: Mutex::new(HashMap::new()),
            lock_manager: LockManager::new(),
            catalog,
            log,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Fetches a page on behalf of a transaction, blocking until the lock
    /// matching `perm` can be granted. Cache hits return the already-resident
    /// page; misses read through the owning heap file, evicting one clean
    /// page first when the pool is full.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> DbResult<PageRef> {
        match perm {
            Permission::ReadOnly => self.lock_manager.acquire_shared(tid, pid)?,
            Permission::ReadWrite => self.lock_manager.acquire_exclusive(tid, pid)?,
        }

        let mut pool = self.pool.lock().unwrap();
        if let Some(page_ref) = pool.get(&pid) {
            return Ok(page_ref.clone());
        }

        if pool.len() >= self.capacity {
            self.evict_one(&mut pool)?;
        }

        // A failed read leaves the cache untouched.
        let file = self.catalog.heap_file(pid.table_id)?;
        let page = file.read_page(pid)?;
        cairn_debug_log!("[BufferPool] loaded {:?}", pid);
        let page_ref: PageRef = Arc::new(RwLock::new(page));
        pool.insert(pid, page_ref.clone());
        Ok(page_ref)
    }

    /// Discards one clean page. NO-STEAL forbids writing a dirty page out, so
    /// when every resident page is dirty the fetch fails instead.
    fn evict_one(&self, pool: &mut HashMap<PageId, PageRef>) -> DbResult<()> {
        let victim = pool
            .iter()
            .find(|(_, page_ref)| page_ref.read().dirtier().is_none())
            .map(|(&pid, _)| pid);
        match victim {
            Some(pid) => {
                cairn_debug_log!("[BufferPool] evicting clean page {:?}", pid);
                pool.remove(&pid);
                Ok(())
            }
            None => Err(DbError::Db(
                "all pages in the buffer pool are dirty; nothing can be evicted".to_string(),
            )),
        }
    }

    /// Inserts a tuple into the named table, marking every mutated page dirty
    /// with `tid` and (re)installing it in the cache.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: TableId, tuple: Tuple) -> DbResult<()> {
        let file = self.catalog.heap_file(table_id)?;
        if tuple.desc().as_ref() != file.tuple_desc().as_ref() {
            return Err(DbError::Db(format!(
                "tuple schema does not match table {table_id}"
            )));
        }
        let touched = file.insert_tuple(self, tid, tuple)?;
        self.install_dirty(tid, touched);
        Ok(())
    }

    /// Deletes the tuple named by its record id, with the same dirty-page
    /// bookkeeping as `insert_tuple`.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::Db("tuple to delete has no record id".to_string()))?;
        let file = self.catalog.heap_file(rid.page_id.table_id)?;
        let touched = file.delete_tuple(self, tid, tuple)?;
        self.install_dirty(tid, touched);
        Ok(())
    }

    fn install_dirty(&self, tid: TransactionId, pages: Vec<PageRef>) {
        let mut pool = self.pool.lock().unwrap();
        for page_ref in pages {
            let pid = {
                let mut page = page_ref.write();
                page.mark_dirty(Some(tid));
                page.id()
            };
            pool.insert(pid, page_ref);
        }
    }

    /// Commit or abort. On commit every page dirtied by `tid` is logged,
    /// forced and written to disk, and its before image advances to the new
    /// contents. On abort the cached pages are rebuilt in place from their
    /// before images, so the transaction's writes never existed. Either way
    /// the locks fall only after the page work is done.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        let dirty: Vec<(PageId, PageRef)> = {
            let pool = self.pool.lock().unwrap();
            pool.iter()
                .filter(|(_, page_ref)| page_ref.read().dirtier() == Some(tid))
                .map(|(&pid, page_ref)| (pid, page_ref.clone()))
                .collect()
        };

        if commit {
            for (pid, page_ref) in &dirty {
                self.flush_page_ref(*pid, page_ref)?;
                let mut page = page_ref.write();
                page.set_before_image()?;
                page.mark_dirty(None);
            }
            self.log.log_commit(tid)?;
            self.log.force()?;
        } else {
            self.log.log_abort(tid)?;
            for (pid, page_ref) in &dirty {
                let mut page = page_ref.write();
                let image = page.before_image_data().to_vec();
                let desc = page.tuple_desc().clone();
                *page = HeapPage::new(*pid, &image, desc)?;
            }
        }

        self.lock_manager.release_all(tid);
        cairn_debug_log!(
            "[BufferPool] {:?} {}",
            tid,
            if commit { "committed" } else { "aborted" }
        );
        Ok(())
    }

    /// Write-ahead, force, then overwrite the page on disk. Leaves the dirty
    /// marker untouched; callers that flushed for commit clear it afterwards,
    /// so a failed write keeps the page dirty in cache.
    fn flush_page_ref(&self, pid: PageId, page_ref: &PageRef) -> DbResult<()> {
        let file = self.catalog.heap_file(pid.table_id)?;
        {
            let page = page_ref.read();
            if let Some(dirtier) = page.dirtier() {
                let after = page.page_data()?;
                self.log
                    .log_write(dirtier, pid, page.before_image_data(), &after)?;
                self.log.force()?;
            }
        }
        failpoint::maybe_fail("buffer_pool.flush.before_write")?;
        let page = page_ref.read();
        file.write_page(&page)?;
        Ok(())
    }

    /// Flushes the named page. Fails if it is not resident.
    pub fn flush_page(&self, pid: PageId) -> DbResult<()> {
        let page_ref = {
            let pool = self.pool.lock().unwrap();
            pool.get(&pid).cloned()
        }
        .ok_or_else(|| DbError::Db(format!("page {pid:?} not in buffer pool")))?;
        self.flush_page_ref(pid, &page_ref)
    }

    /// Writes every dirty page to disk regardless of its owning transaction.
    /// Breaks NO-STEAL; only for shutdown and tests.
    pub fn flush_all_pages(&self) -> DbResult<()> {
        let resident: Vec<(PageId, PageRef)> = {
            let pool = self.pool.lock().unwrap();
            pool.iter()
                .map(|(&pid, page_ref)| (pid, page_ref.clone()))
                .collect()
        };
        for (pid, page_ref) in resident {
            if page_ref.read().dirtier().is_some() {
                self.flush_page_ref(pid, &page_ref)?;
            }
        }
        Ok(())
    }

    /// Drops a page from the cache without flushing it. Used when a caller
    /// knows the on-disk copy is the one to keep.
    pub fn discard_page(&self, pid: PageId) {
        let mut pool = self.pool.lock().unwrap();
        pool.remove(&pid);
    }

    /// Early release of one page lock. Risky: only callers that neither read
    /// nor wrote the page can use this without breaking two-phase locking.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds_lock(tid, pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap_file::HeapFile;
    use crate::tuple::{Field, FieldType, TupleDesc};
    use tempfile::{tempdir, TempDir};

    fn desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::with_names(
            &[FieldType::Int, FieldType::Int],
            &["a", "b"],
        ))
    }

    fn setup(capacity: usize) -> (TempDir, Arc<BufferPool>, Arc<HeapFile>) {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(Catalog::new());
        let log = Arc::new(WalManager::open(dir.path().join("wal.log")).unwrap());
        let bp = Arc::new(BufferPool::with_capacity(capacity, catalog.clone(), log));

        let id = catalog.next_table_id();
        let file =
            Arc::new(HeapFile::open(dir.path().join("t.dat"), id, desc()).unwrap());
        catalog.add_table(file.clone(), "t");
        (dir, bp, file)
    }

    fn seed_empty_pages(file: &HeapFile, n: u32) {
        for page_no in 0..n {
            let page = HeapPage::new(
                PageId::new(file.table_id(), page_no),
                &HeapPage::empty_page_data(),
                file.tuple_desc().clone(),
            )
            .unwrap();
            file.write_page(&page).unwrap();
        }
    }

    fn tuple(a: i32, b: i32) -> Tuple {
        Tuple::new(desc(), vec![Field::Int(a), Field::Int(b)]).unwrap()
    }

    #[test]
    fn concurrent_fetches_share_one_page_instance() {
        let (_dir, bp, file) = setup(10);
        seed_empty_pages(&file, 1);
        let pid = PageId::new(file.table_id(), 0);

        let t1 = TransactionId::new();
        let t2 = TransactionId::new();
        let first = bp.get_page(t1, pid, Permission::ReadOnly).unwrap();
        let second = bp.get_page(t2, pid, Permission::ReadOnly).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn insert_stays_in_cache_until_commit() {
        let (_dir, bp, file) = setup(10);
        let tid = TransactionId::new();
        bp.insert_tuple(tid, file.table_id(), tuple(1, 10)).unwrap();

        // The appended page reached disk empty; the tuple lives only in cache.
        assert_eq!(file.num_pages().unwrap(), 1);
        let on_disk = file.read_page(PageId::new(file.table_id(), 0)).unwrap();
        assert_eq!(on_disk.iter().count(), 0);

        bp.transaction_complete(tid, true).unwrap();
        let on_disk = file.read_page(PageId::new(file.table_id(), 0)).unwrap();
        assert_eq!(on_disk.iter().count(), 1);
    }

    #[test]
    fn commit_clears_dirty_state_and_advances_before_image() {
        let (_dir, bp, file) = setup(10);
        let tid = TransactionId::new();
        bp.insert_tuple(tid, file.table_id(), tuple(2, 20)).unwrap();

        let pid = PageId::new(file.table_id(), 0);
        let page_ref = bp.get_page(tid, pid, Permission::ReadOnly).unwrap();
        assert_eq!(page_ref.read().dirtier(), Some(tid));

        bp.transaction_complete(tid, true).unwrap();
        let page = page_ref.read();
        assert_eq!(page.dirtier(), None);
        assert_eq!(page.before_image_data(), page.page_data().unwrap().as_slice());
    }

    #[test]
    fn abort_reverts_to_the_before_image() {
        let (_dir, bp, file) = setup(10);

        // Commit one tuple so the page has a non-trivial before image.
        let setup_tid = TransactionId::new();
        bp.insert_tuple(setup_tid, file.table_id(), tuple(1, 10))
            .unwrap();
        bp.transaction_complete(setup_tid, true).unwrap();

        let tid = TransactionId::new();
        bp.insert_tuple(tid, file.table_id(), tuple(2, 20)).unwrap();

        let pid = PageId::new(file.table_id(), 0);
        let page_ref = bp.get_page(tid, pid, Permission::ReadOnly).unwrap();
        assert_eq!(page_ref.read().iter().count(), 2);

        bp.transaction_complete(tid, false).unwrap();
        let page = page_ref.read();
        assert_eq!(page.dirtier(), None);
        let survivors: Vec<Tuple> = page.iter().cloned().collect();
        assert_eq!(survivors, vec![tuple(1, 10)]);
    }

    #[test]
    fn eviction_skips_dirty_pages_and_fails_when_all_are_dirty() {
        let (_dir, bp, file) = setup(2);
        seed_empty_pages(&file, 3);
        let tid = TransactionId::new();

        for page_no in 0..2 {
            let pid = PageId::new(file.table_id(), page_no);
            let page_ref = bp.get_page(tid, pid, Permission::ReadWrite).unwrap();
            let mut page = page_ref.write();
            page.insert_tuple(tuple(page_no as i32, 0)).unwrap();
            page.mark_dirty(Some(tid));
        }

        let extra = PageId::new(file.table_id(), 2);
        let err = bp.get_page(tid, extra, Permission::ReadOnly).unwrap_err();
        assert!(matches!(err, DbError::Db(_)));

        bp.transaction_complete(tid, true).unwrap();
        let tid2 = TransactionId::new();
        bp.get_page(tid2, extra, Permission::ReadOnly).unwrap();
    }

    #[test]
    fn failed_flush_leaves_the_page_dirty() {
        let (_dir, bp, file) = setup(10);
        let tid = TransactionId::new();
        bp.insert_tuple(tid, file.table_id(), tuple(3, 30)).unwrap();

        failpoint::clear();
        failpoint::enable("buffer_pool.flush.before_write");
        let res = bp.transaction_complete(tid, true);
        failpoint::clear();
        assert!(res.is_err());

        let pid = PageId::new(file.table_id(), 0);
        let page_ref = bp.get_page(tid, pid, Permission::ReadOnly).unwrap();
        assert_eq!(page_ref.read().dirtier(), Some(tid));
        drop(page_ref);

        bp.transaction_complete(tid, true).unwrap();
        let on_disk = file.read_page(pid).unwrap();
        assert_eq!(on_disk.iter().count(), 1);
    }

    #[test]
    fn flush_of_uncached_page_fails() {
        let (_dir, bp, file) = setup(10);
        let err = bp.flush_page(PageId::new(file.table_id(), 0)).unwrap_err();
        assert!(matches!(err, DbError::Db(_)));
    }

    #[test]
    fn schema_mismatch_on_insert_is_rejected() {
        let (_dir, bp, file) = setup(10);
        let wrong = Tuple::new(
            Arc::new(TupleDesc::of(&[FieldType::Int])),
            vec![Field::Int(1)],
        )
        .unwrap();
        let err = bp
            .insert_tuple(TransactionId::new(), file.table_id(), wrong)
            .unwrap_err();
        assert!(matches!(err, DbError::Db(_)));
    }

    #[test]
    fn unknown_table_is_rejected() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(Catalog::new());
        let log = Arc::new(WalManager::open(dir.path().join("wal.log")).unwrap());
        let bp = BufferPool::new(catalog, log);
        let err = bp
            .get_page(
                TransactionId::new(),
                PageId::new(42, 0),
                Permission::ReadOnly,
            )
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }

    #[test]
    fn discard_page_drops_the_cached_copy() {
        let (_dir, bp, file) = setup(10);
        seed_empty_pages(&file, 1);
        let pid = PageId::new(file.table_id(), 0);

        let tid = TransactionId::new();
        let first = bp.get_page(tid, pid, Permission::ReadOnly).unwrap();
        bp.discard_page(pid);
        let second = bp.get_page(tid, pid, Permission::ReadOnly).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
