//! Page cache with NO STEAL / FORCE eviction (spec §4.4).
//!
//! Generalizes the `HashMap<PageId, Arc<RwLock<HeapPage>>>` cache in
//! `bufferpool.rs` (old) to a fixed-capacity, LRU-ordered cache
//! (`crate::lru::LruCache`) with real eviction, and replaces `RwLock<Page>`
//! with `Mutex<Page>` since every caller needs the owning-transaction
//! dirty-mark updated regardless of read/write intent.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::{
    catalog::Catalog,
    config::Config,
    error::{DbError, DbResult},
    heap_file::HeapFile,
    ids::{PageId, RecordId, TableId},
    lock_manager::{LockManager, LockMode},
    lru::LruCache,
    page::SlottedPage,
    transaction::TransactionId,
    tuple::Tuple,
};

pub struct BufferPool {
    cache: Mutex<LruCache<Arc<Mutex<SlottedPage>>>>,
    capacity: usize,
    lock_manager: LockManager,
    catalog: Mutex<Catalog>,
    /// Transaction ids `transaction_complete` has already run for, commit or
    /// abort. A caller that reuses a finished tid in `get_page` (and so,
    /// transitively, `insert_tuple`/`delete_tuple`) is handed
    /// `TransactionAborted` instead of being let back into the lock
    /// manager/cache on behalf of a transaction that no longer exists.
    finished: Mutex<HashSet<TransactionId>>,
}

impl BufferPool {
    pub fn new(config: Config) -> Self {
        Self {
            cache: Mutex::new(LruCache::new()),
            capacity: config.buffer_pool_pages(),
            lock_manager: LockManager::new(),
            catalog: Mutex::new(Catalog::new()),
            finished: Mutex::new(HashSet::new()),
        }
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn register_table(&self, heap_file: Arc<HeapFile>, tuple_desc: Arc<crate::TupleDesc>) {
        self.catalog.lock().unwrap().add_table(heap_file, tuple_desc);
    }

    pub fn open_table(&self, path: &Path, tuple_desc: crate::TupleDesc, page_size: usize) -> DbResult<TableId> {
        let heap_file = Arc::new(HeapFile::open(path, tuple_desc.clone(), page_size)?);
        let table_id = heap_file.table_id();
        self.register_table(heap_file, Arc::new(tuple_desc));
        Ok(table_id)
    }

    /// Number of pages currently on disk for `table_id`, for callers (e.g.
    /// [`crate::sequential_scan::SequentialScan`]) that need to know when
    /// they've walked off the end of a table.
    pub fn table_num_pages(&self, table_id: TableId) -> DbResult<usize> {
        self.heap_file(table_id)?.num_pages()
    }

    fn heap_file(&self, table_id: TableId) -> DbResult<Arc<HeapFile>> {
        self.catalog
            .lock()
            .unwrap()
            .heap_file(table_id)
            .ok_or_else(|| DbError::not_found(format!("no table registered for id {:x}", table_id)))
    }

    /// Acquire the appropriate lock, then return the cached, shared handle
    /// for `pid`, reading it from disk (and evicting if necessary) on a
    /// cache miss.
    pub fn get_page(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> DbResult<Arc<Mutex<SlottedPage>>> {
        if self.finished.lock().unwrap().contains(&tid) {
            return Err(DbError::transaction_aborted(format!(
                "transaction {} has already committed or aborted",
                tid
            )));
        }

        self.lock_manager.acquire(tid, pid, mode)?;

        let mut cache = self.cache.lock().unwrap();
        if let Some(page) = cache.get(&pid) {
            return Ok(Arc::clone(page));
        }

        let heap_file = self.heap_file(pid.table_id)?;
        let page = match heap_file.read_page(pid) {
            Ok(page) => page,
            Err(e) => {
                self.lock_manager.release(tid, pid);
                return Err(e);
            }
        };

        if cache.len() >= self.capacity {
            if let Err(e) = self.evict_one_locked(&mut cache) {
                drop(cache);
                self.lock_manager.release(tid, pid);
                return Err(e);
            }
        }

        let handle = Arc::new(Mutex::new(page));
        cache.insert(pid, Arc::clone(&handle));
        Ok(handle)
    }

    /// Evict the least-recently-touched clean page. NO STEAL forbids ever
    /// evicting a dirty page, so this fails instead of silently writing an
    /// uncommitted change to disk.
    fn evict_one_locked(&self, cache: &mut LruCache<Arc<Mutex<SlottedPage>>>) -> DbResult<()> {
        let victim = cache
            .keys_lru_order()
            .into_iter()
            .find(|pid| {
                let page = cache.get(pid).expect("key came from this cache");
                page.lock().unwrap().dirty_by().is_none()
            });

        match victim {
            Some(pid) => {
                cache.remove(&pid);
                Ok(())
            }
            None => Err(DbError::no_clean_page_to_evict(
                "every cached page is dirty; NO STEAL forbids eviction",
            )),
        }
    }

    pub fn insert_tuple(&self, tid: TransactionId, table_id: TableId, tuple: Tuple) -> DbResult<RecordId> {
        let heap_file = self.heap_file(table_id)?;
        let inserted = heap_file.insert_tuple(tid, tuple, self)?;
        Ok(inserted.record_id.expect("insert_tuple always stamps record_id"))
    }

    pub fn delete_tuple(&self, tid: TransactionId, record_id: RecordId) -> DbResult<()> {
        let heap_file = self.heap_file(record_id.page_id.table_id)?;
        heap_file.delete_tuple(tid, record_id, self)?;
        Ok(())
    }

    /// If `pid` is cached and dirty, write it back and clear its dirty
    /// mark. A no-op for clean or uncached pages.
    pub fn flush_page(&self, pid: PageId) -> DbResult<()> {
        let mut cache = self.cache.lock().unwrap();
        let Some(handle) = cache.get(&pid) else {
            return Ok(());
        };
        let mut page = handle.lock().unwrap();
        if page.dirty_by().is_some() {
            let heap_file = self.heap_file(pid.table_id)?;
            heap_file.write_page(&page)?;
            page.mark_dirty(None);
            page.clear_before_image();
        }
        Ok(())
    }

    pub fn flush_all_pages(&self) -> DbResult<()> {
        let pids: Vec<PageId> = {
            let cache = self.cache.lock().unwrap();
            cache.keys_lru_order()
        };
        for pid in pids {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Flush only the pages dirtied by `tid`.
    pub fn flush_pages(&self, tid: TransactionId) -> DbResult<()> {
        let pids: Vec<PageId> = {
            let mut cache = self.cache.lock().unwrap();
            cache
                .keys_lru_order()
                .into_iter()
                .filter(|pid| {
                    cache
                        .get(pid)
                        .map(|h| h.lock().unwrap().dirty_by() == Some(tid))
                        .unwrap_or(false)
                })
                .collect()
        };
        for pid in pids {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Commit/abort a transaction's effect on the cache: on commit, flush
    /// and forget the before-images; on abort, roll every dirtied page back
    /// to its before-image without touching disk. Locks are released either
    /// way, even if the flush/restore itself fails -- per spec §4.4 this
    /// step always ends with `lock_manager.release_all(tid)`, so a failure
    /// here can never leak the transaction's locks.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        self.finished.lock().unwrap().insert(tid);

        let result = if commit { self.flush_pages(tid) } else { self.restore_pages(tid) };

        self.lock_manager.release_all(tid);
        debug!("transaction {} complete (commit={})", tid, commit);
        result
    }

    /// Roll every page dirtied by `tid` back to its before-image, in place,
    /// without touching disk.
    fn restore_pages(&self, tid: TransactionId) -> DbResult<()> {
        let mut cache = self.cache.lock().unwrap();
        for pid in cache.keys_lru_order() {
            if let Some(handle) = cache.get(&pid) {
                let mut page = handle.lock().unwrap();
                if page.dirty_by() == Some(tid) {
                    page.restore_before_image()?;
                }
            }
        }
        Ok(())
    }

    /// Remove `pid` from the cache without flushing it. `transaction_complete`
    /// never calls this itself -- an abort rolls a dirtied page back in
    /// place via `restore_before_image` and keeps it cached. This is for
    /// external callers that need to forget a cached page outright, e.g. an
    /// operator that read a page before learning the table it belongs to
    /// was dropped out from under it.
    pub fn discard_page(&self, pid: PageId) {
        self.cache.lock().unwrap().remove(&pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds_any(tid, pid)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}
