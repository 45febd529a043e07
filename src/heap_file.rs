//! On-disk heap file: a flat sequence of fixed-size pages (spec §4.2).
//!
//! Table identity is the stable hash of the backing file's canonicalized
//! path, matching this codebase's `table_id = hash(file_path)` convention
//! (`btree/file.rs`), generalized from `i32` to `u64` and from `BTreeFile`'s
//! node-shaped pages to flat heap pages.

use std::{
    collections::hash_map::DefaultHasher,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use log::debug;

use crate::{
    error::{DbError, DbErrorKind, DbResult},
    ids::{PageId, RecordId, TableId},
    lock_manager::LockMode,
    page::SlottedPage,
    transaction::TransactionId,
    TupleDesc,
};

/// Derive a table's stable id from its backing file's canonical path.
pub fn table_id_for_path(path: &Path) -> DbResult<TableId> {
    let canonical = path.canonicalize().map_err(DbError::from)?;
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    Ok(hasher.finish())
}

pub struct HeapFile {
    table_id: TableId,
    tuple_desc: TupleDesc,
    page_size: usize,
    file: Mutex<File>,
}

impl HeapFile {
    /// Open (creating if absent) the backing file at `path`.
    pub fn open(path: &Path, tuple_desc: TupleDesc, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let table_id = table_id_for_path(path)?;
        Ok(Self {
            table_id,
            tuple_desc,
            page_size,
            file: Mutex::new(file),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.tuple_desc
    }

    pub fn num_pages(&self) -> DbResult<usize> {
        let file = self.file.lock().unwrap();
        let len = file.metadata()?.len() as usize;
        Ok(len / self.page_size)
    }

    /// Positional read of exactly `page_size` bytes at `pid`'s offset.
    pub fn read_page(&self, pid: PageId) -> DbResult<SlottedPage> {
        let num_pages = self.num_pages()?;
        if pid.page_number >= num_pages {
            return Err(DbError::invalid_page(format!(
                "page {:?} is past end of file ({} pages)",
                pid, num_pages
            )));
        }

        let mut file = self.file.lock().unwrap();
        let offset = (pid.page_number * self.page_size) as u64;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.page_size];
        file.read_exact(&mut buf)
            .map_err(|e| DbError::io(format!("short read of page {:?}: {}", pid, e)))?;

        SlottedPage::parse(pid, &buf, self.tuple_desc.clone(), self.page_size)
    }

    /// Positional write. Writing at `page_number == num_pages` appends a new
    /// page, growing the file.
    pub fn write_page(&self, page: &SlottedPage) -> DbResult<()> {
        let mut file = self.file.lock().unwrap();
        let offset = (page.page_id().page_number * self.page_size) as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.serialize())?;
        Ok(())
    }

    fn append_empty_page(&self) -> DbResult<PageId> {
        let page_number = self.num_pages()?;
        let pid = PageId::new(self.table_id, page_number);
        let page = SlottedPage::empty(pid, self.tuple_desc.clone(), self.page_size);
        self.write_page(&page)?;
        Ok(pid)
    }

    /// Insert `tuple` into the first page with an empty slot, scanning in
    /// page order; appends a new page if every existing page is full.
    /// Returns the id of the page the tuple landed on, with its
    /// `record_id` stamped.
    ///
    /// Peek-then-release: a full page's EXCLUSIVE lock is dropped as soon
    /// as it's found full, so a transaction that never modifies it does
    /// not keep blocking other writers on it. A page `tid` itself already
    /// dirtied is the one exception: the lock stays held (this insert just
    /// `continue`s past it) since releasing it mid-transaction would break
    /// strict 2PL and orphan `tid`'s before-image on that page.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: crate::tuple::Tuple,
        buffer_pool: &crate::buffer_pool::BufferPool,
    ) -> DbResult<crate::tuple::Tuple> {
        let num_pages = self.num_pages()?;
        for page_number in 0..num_pages {
            let pid = PageId::new(self.table_id, page_number);
            let handle = buffer_pool.get_page(tid, pid, LockMode::Exclusive)?;
            let mut page = handle.lock().unwrap();
            if page.num_empty_slots() == 0 {
                let dirtied_by_self = page.dirty_by() == Some(tid);
                drop(page);
                if !dirtied_by_self {
                    buffer_pool.lock_manager().release(tid, pid);
                }
                continue;
            }

            page.mark_dirty(Some(tid));
            let inserted = page.insert_tuple(tuple)?;
            debug!("inserted tuple into existing page {:?}", pid);
            return Ok(inserted);
        }

        let pid = self.append_empty_page()?;
        let handle = buffer_pool.get_page(tid, pid, LockMode::Exclusive)?;
        let mut page = handle.lock().unwrap();
        page.mark_dirty(Some(tid));
        let inserted = page.insert_tuple(tuple)?;
        debug!("inserted tuple into newly appended page {:?}", pid);
        Ok(inserted)
    }

    /// Delete the tuple at `record_id`.
    pub fn delete_tuple(
        &self,
        tid: TransactionId,
        record_id: RecordId,
        buffer_pool: &crate::buffer_pool::BufferPool,
    ) -> DbResult<()> {
        let pid = record_id.page_id;
        let handle = buffer_pool.get_page(tid, pid, LockMode::Exclusive)?;
        let mut page = handle.lock().unwrap();
        page.mark_dirty(Some(tid));
        page.delete_tuple(record_id)?;
        Ok(())
    }
}
