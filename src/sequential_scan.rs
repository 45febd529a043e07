//! Full-table scan operator (spec §4.7 "External operators").
//!
//! Generalizes the teacher's `SequentialScan`, which read a single page
//! eagerly out of a process-wide `Database::global()` singleton and never
//! acquired a lock, into a lazy cursor driven by an explicit
//! [`DatabaseContext`] that acquires SHARED on every page it visits through
//! the buffer pool and holds those locks until the owning transaction
//! commits or aborts (strict 2PL, per the base spec's Open Question
//! resolution in §9).

use std::sync::Arc;

use log::debug;

use crate::{
    context::DatabaseContext,
    error::DbError,
    ids::{PageId, TableId},
    lock_manager::LockMode,
    predicate::Predicate,
    transaction::TransactionId,
    tuple::Tuple,
};

pub struct SequentialScan {
    ctx: Arc<DatabaseContext>,
    tid: TransactionId,
    table_id: TableId,
    filter: Option<Predicate>,

    page_number: usize,
    page_tuples: Vec<Tuple>,
    index: usize,
    done: bool,
    /// First error observed, if any; once set, iteration stops for good.
    error: Option<DbError>,
}

impl SequentialScan {
    pub fn new(
        ctx: Arc<DatabaseContext>,
        tid: TransactionId,
        table_id: TableId,
        filter: Option<Predicate>,
    ) -> Self {
        Self {
            ctx,
            tid,
            table_id,
            filter,
            page_number: 0,
            page_tuples: Vec::new(),
            index: 0,
            done: false,
            error: None,
        }
    }

    /// First error observed during iteration, if any (e.g. `DeadlockAbort`
    /// on a page's SHARED acquire).
    pub fn error(&self) -> Option<&DbError> {
        self.error.as_ref()
    }

    /// Restart iteration from the first page. Already-held SHARED locks are
    /// not re-acquired redundantly (`acquire` is a no-op when the caller
    /// already holds an equal-or-stronger mode) and are not released either
    /// -- they only drop when `tid` commits or aborts.
    pub fn rewind(&mut self) {
        self.page_number = 0;
        self.page_tuples.clear();
        self.index = 0;
        self.done = false;
        self.error = None;
    }

    /// Load `self.page_number` into `page_tuples`, acquiring SHARED on it
    /// first. Returns `false` once `page_number` runs past the end of the
    /// table (or on error, in which case `self.error` is set).
    fn load_page(&mut self, page_number: usize) -> bool {
        let num_pages = match self.ctx.buffer_pool().table_num_pages(self.table_id) {
            Ok(n) => n,
            Err(e) => {
                self.error = Some(e);
                return false;
            }
        };
        if page_number >= num_pages {
            return false;
        }

        let pid = PageId::new(self.table_id, page_number);
        let handle = match self.ctx.buffer_pool().get_page(self.tid, pid, LockMode::Shared) {
            Ok(h) => h,
            Err(e) => {
                self.error = Some(e);
                return false;
            }
        };
        let tuples = match handle.lock().unwrap().iterate() {
            Ok(t) => t,
            Err(e) => {
                self.error = Some(e);
                return false;
            }
        };
        debug!("scan loaded page {:?}: {} tuples", pid, tuples.len());
        self.page_number = page_number;
        self.page_tuples = tuples;
        self.index = 0;
        true
    }
}

impl Iterator for SequentialScan {
    type Item = Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.error.is_some() {
            return None;
        }

        // Lazily load page 0 on the very first call.
        if self.page_tuples.is_empty() && self.index == 0 && self.page_number == 0 {
            if !self.load_page(0) {
                self.done = true;
                return None;
            }
        }

        loop {
            if self.index < self.page_tuples.len() {
                let tuple = self.page_tuples[self.index].clone();
                self.index += 1;
                if let Some(filter) = &self.filter {
                    if !filter.matches(&tuple) {
                        continue;
                    }
                }
                return Some(tuple);
            }

            if !self.load_page(self.page_number + 1) {
                self.done = true;
                return None;
            }
        }
    }
}
