//! Transaction identity and lifecycle (spec §4.5 "TransactionId and
//! lifecycle").
//!
//! A transaction here is nothing more than an id; all the state that makes
//! it meaningful -- which locks it holds, which pages it has dirtied --
//! lives in [`crate::lock_manager::LockManager`] and
//! [`crate::buffer_pool::BufferPool`]. This keeps the same shape as the
//! teacher codebase's `transaction/tx.rs`, minus the WAL bookkeeping that
//! belongs to a separate logging subsystem this core does not implement.

use core::fmt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::{buffer_pool::BufferPool, context::DatabaseContext, error::DbResult};

pub type TransactionId = u64;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh transaction id. Ids increase monotonically and are
/// never reused, so a creation-order comparison between two ids is always
/// meaningful (available for an alternate youngest-victim deadlock policy,
/// see spec §9; the default policy is requester-is-victim and does not
/// consult this ordering).
pub fn begin_transaction() -> TransactionId {
    NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Commit `tid`: force its dirty pages to disk, clear their before-images,
/// and release every lock it holds. Matches the NO STEAL / FORCE contract
/// in spec §4.4 -- there is no separate log-flush step because every dirty
/// page this transaction touched is, by construction, already
/// force-written by `transaction_complete` before this returns.
/// `BufferPool::transaction_complete` releases `tid`'s locks itself, even if
/// the flush fails, so a propagated error here never leaks them.
pub fn commit_transaction(tid: TransactionId, buffer_pool: &BufferPool) -> DbResult<()> {
    buffer_pool.transaction_complete(tid, true)
}

/// Abort `tid`: restore the before-image of every page it dirtied (no disk
/// write), then release its locks. Errors here are logged, not propagated
/// -- an abort must always free the transaction's locks even if a
/// before-image restore somehow fails, which `transaction_complete` itself
/// guarantees by releasing locks unconditionally.
pub fn abort_transaction(tid: TransactionId, buffer_pool: &BufferPool) {
    if let Err(e) = buffer_pool.transaction_complete(tid, false) {
        e.show_backtrace();
    }
}

/// Tracks which transaction ids are currently live, purely for debugging
/// and test assertions (spec P3: "after `transaction_complete`, tid holds
/// no locks and appears in no waiter queue"). It holds no authority the
/// lock manager/buffer pool don't already have on their own.
#[derive(Default)]
pub struct TransactionManager {
    live: Mutex<HashSet<TransactionId>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> TransactionId {
        let tid = begin_transaction();
        self.live.lock().unwrap().insert(tid);
        tid
    }

    pub fn is_active(&self, tid: TransactionId) -> bool {
        self.live.lock().unwrap().contains(&tid)
    }

    fn forget(&self, tid: TransactionId) {
        self.live.lock().unwrap().remove(&tid);
    }
}

/// Thin convenience wrapper bundling a [`DatabaseContext`] with transaction
/// bookkeeping, so callers don't have to thread `buffer_pool` through every
/// call site by hand. A transaction dropped without an explicit commit or
/// abort is treated as an abort.
pub struct Transaction {
    tid: TransactionId,
    ctx: Arc<DatabaseContext>,
    finished: bool,
}

impl Transaction {
    pub fn begin(ctx: Arc<DatabaseContext>) -> Self {
        Self {
            tid: begin_transaction(),
            ctx,
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.tid
    }

    pub fn commit(mut self) -> DbResult<()> {
        self.finished = true;
        commit_transaction(self.tid, self.ctx.buffer_pool())
    }

    pub fn abort(mut self) {
        self.finished = true;
        abort_transaction(self.tid, self.ctx.buffer_pool());
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            abort_transaction(self.tid, self.ctx.buffer_pool());
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx_{}", self.tid)
    }
}
