//! Multi-mode page locking with deadlock detection (spec §4.3).
//!
//! This replaces `ConcurrentStatus`'s `sleep(10ms)`-polling
//! `request_latch` loop with a `Mutex` + `Condvar` wait: a blocked acquire
//! parks on the condvar and is only woken when a release (or another
//! acquire) might have changed the outcome, instead of re-checking on a
//! fixed timer. The s_latch_map/x_latch_map/hold_pages split and the
//! wait-for-graph wiring are carried over from `transaction/concurrent_status.rs`.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Condvar, Mutex},
    time::Duration,
};

use log::debug;

use crate::{
    error::{DbError, DbResult},
    ids::PageId,
    transaction::TransactionId,
    wait_for_graph::WaitForGraph,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Clone, Copy)]
struct PendingRequest {
    tid: TransactionId,
    mode: LockMode,
}

#[derive(Default)]
struct LockTable {
    /// Locks currently granted on each page.
    page_locks: HashMap<PageId, HashMap<TransactionId, LockMode>>,
    /// Pages each transaction currently holds a lock on (mirrors page_locks,
    /// indexed the other way, per spec invariant I3).
    txn_locks: HashMap<TransactionId, HashSet<PageId>>,
    /// FIFO queue of blocked requests per page, oldest first.
    waiters: HashMap<PageId, VecDeque<PendingRequest>>,
    wait_for: WaitForGraph,
}

impl LockTable {
    fn granted_mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        self.page_locks.get(&pid).and_then(|m| m.get(&tid)).copied()
    }

    fn holders_except(&self, pid: PageId, tid: TransactionId) -> Vec<(TransactionId, LockMode)> {
        self.page_locks
            .get(&pid)
            .map(|m| m.iter().filter(|(&t, _)| t != tid).map(|(&t, &m)| (t, m)).collect())
            .unwrap_or_default()
    }

    /// Can `tid` be granted `mode` on `pid` right now, given current holders
    /// and FIFO fairness against the head of the wait queue?
    fn grantable(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let others = self.holders_except(pid, tid);
        let compatible = match mode {
            LockMode::Shared => others.iter().all(|&(_, m)| m == LockMode::Shared),
            LockMode::Exclusive => others.is_empty(),
        };
        if !compatible {
            return false;
        }

        // Writer-starvation guard: a SHARED request that would otherwise be
        // grantable still queues behind an older waiting EXCLUSIVE request.
        if mode == LockMode::Shared {
            if let Some(front) = self.waiters.get(&pid).and_then(|q| q.front()) {
                if front.mode == LockMode::Exclusive && front.tid != tid {
                    return false;
                }
            }
        }
        true
    }

    fn grant(&mut self, tid: TransactionId, pid: PageId, mode: LockMode) {
        self.page_locks.entry(pid).or_default().insert(tid, mode);
        self.txn_locks.entry(tid).or_default().insert(pid);
    }

    /// Every other transaction currently holding a lock on `pid` -- each of
    /// them blocks `tid`'s pending request by definition, since `grantable`
    /// already ruled out immediate grant.
    fn blockers(&self, tid: TransactionId, pid: PageId) -> HashSet<TransactionId> {
        self.holders_except(pid, tid).into_iter().map(|(t, _)| t).collect()
    }

    fn dequeue(&mut self, pid: PageId, tid: TransactionId) {
        if let Some(queue) = self.waiters.get_mut(&pid) {
            queue.retain(|r| r.tid != tid);
        }
    }
}

/// Guards page-level locks for every transaction sharing a `BufferPool`.
pub struct LockManager {
    table: Mutex<LockTable>,
    condvar: Condvar,
    /// Bounds how long a single `condvar.wait` leg blocks before re-checking
    /// grantability/cycles on its own, independent of a `notify_all`. `None`
    /// (the default) blocks indefinitely, matching the base spec's "there
    /// are no timeouts" baseline; §5 permits an optional bounded wait whose
    /// expiry behaves like any other re-check, so this never changes which
    /// requests are granted, only how promptly a missed wakeup is retried.
    wait_quantum: Option<Duration>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            condvar: Condvar::new(),
            wait_quantum: None,
        }
    }

    /// Build a `LockManager` that re-checks grantability and cycle-freedom
    /// at least every `quantum`, even without an intervening `notify_all`.
    /// Purely a liveness safety net (spec §9 REDESIGN FLAGS: "waiters use
    /// bounded waits ... combined with re-check"); it never grants a lock
    /// that plain notification wouldn't also have granted.
    pub fn with_wait_quantum(quantum: Duration) -> Self {
        Self {
            wait_quantum: Some(quantum),
            ..Self::new()
        }
    }

    pub fn holds(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let table = self.table.lock().unwrap();
        matches!(
            (table.granted_mode(tid, pid), mode),
            (Some(LockMode::Exclusive), _) | (Some(LockMode::Shared), LockMode::Shared)
        )
    }

    pub fn holds_any(&self, tid: TransactionId, pid: PageId) -> bool {
        let table = self.table.lock().unwrap();
        table.granted_mode(tid, pid).is_some()
    }

    /// Block until `tid` holds at least `mode` on `pid`, or fail with
    /// `DeadlockAbort` if granting it would complete a wait-for cycle.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> DbResult<()> {
        let mut table = self.table.lock().unwrap();

        if let Some(held) = table.granted_mode(tid, pid) {
            if held >= mode {
                return Ok(());
            }
            // SHARED -> EXCLUSIVE upgrade: grantable iff tid is the sole holder.
        }

        if table.grantable(tid, pid, mode) {
            table.grant(tid, pid, mode);
            table.wait_for.remove_waiter(tid);
            self.condvar.notify_all();
            return Ok(());
        }

        table.waiters.entry(pid).or_default().push_back(PendingRequest { tid, mode });
        loop {
            let blockers = table.blockers(tid, pid);
            for &b in &blockers {
                table.wait_for.add_edge(tid, b);
            }

            if let Some(cycle) = table.wait_for.find_cycle_from(tid) {
                debug!("deadlock detected, aborting requester {}: cycle {:?}", tid, cycle);
                table.dequeue(pid, tid);
                table.wait_for.remove_waiter(tid);
                self.condvar.notify_all();
                return Err(DbError::deadlock(format!(
                    "transaction {} aborted to break cycle {:?}",
                    tid, cycle
                )));
            }

            if table.grantable(tid, pid, mode) {
                table.dequeue(pid, tid);
                table.grant(tid, pid, mode);
                table.wait_for.remove_waiter(tid);
                self.condvar.notify_all();
                return Ok(());
            }

            table = match self.wait_quantum {
                Some(quantum) => self.condvar.wait_timeout(table, quantum).unwrap().0,
                None => self.condvar.wait(table).unwrap(),
            };
        }
    }

    /// Release every lock `tid` holds on `pid`.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut table = self.table.lock().unwrap();
        if let Some(locks) = table.page_locks.get_mut(&pid) {
            locks.remove(&tid);
            if locks.is_empty() {
                table.page_locks.remove(&pid);
            }
        }
        if let Some(pages) = table.txn_locks.get_mut(&tid) {
            pages.remove(&pid);
        }
        self.recompute_wait_for(&mut table);
        self.condvar.notify_all();
    }

    /// Release every lock `tid` holds, across all pages, and drop it from
    /// every wait queue. Called on commit and abort.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock().unwrap();
        if let Some(pages) = table.txn_locks.remove(&tid) {
            for pid in pages {
                if let Some(locks) = table.page_locks.get_mut(&pid) {
                    locks.remove(&tid);
                    if locks.is_empty() {
                        table.page_locks.remove(&pid);
                    }
                }
            }
        }
        for queue in table.waiters.values_mut() {
            queue.retain(|r| r.tid != tid);
        }
        table.wait_for.remove_waiter(tid);
        self.recompute_wait_for(&mut table);
        self.condvar.notify_all();
    }

    /// After a release, blockers may have changed for every still-waiting
    /// request; rebuild `wait_for` from scratch rather than track deltas.
    fn recompute_wait_for(&self, table: &mut LockTable) {
        let waiting_tids: Vec<TransactionId> = table
            .waiters
            .values()
            .flat_map(|q| q.iter().map(|r| r.tid))
            .collect();
        for tid in waiting_tids {
            table.wait_for.remove_waiter(tid);
        }
        let pending: Vec<(TransactionId, PageId, LockMode)> = table
            .waiters
            .iter()
            .flat_map(|(&pid, q)| q.iter().map(move |r| (r.tid, pid, r.mode)))
            .collect();
        for (tid, pid, _mode) in pending {
            for b in table.blockers(tid, pid) {
                table.wait_for.add_edge(tid, b);
            }
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid() -> PageId {
        PageId::new(1, 0)
    }

    #[test]
    fn shared_locks_are_compatible() {
        let lm = LockManager::new();
        lm.acquire(1, pid(), LockMode::Shared).unwrap();
        lm.acquire(2, pid(), LockMode::Shared).unwrap();
        assert!(lm.holds(1, pid(), LockMode::Shared));
        assert!(lm.holds(2, pid(), LockMode::Shared));
    }

    #[test]
    fn upgrade_succeeds_when_sole_holder() {
        let lm = LockManager::new();
        lm.acquire(1, pid(), LockMode::Shared).unwrap();
        lm.acquire(1, pid(), LockMode::Exclusive).unwrap();
        assert!(lm.holds(1, pid(), LockMode::Exclusive));
    }

    #[test]
    fn reacquiring_held_mode_is_a_no_op() {
        let lm = LockManager::new();
        lm.acquire(1, pid(), LockMode::Exclusive).unwrap();
        lm.acquire(1, pid(), LockMode::Shared).unwrap();
        assert!(lm.holds(1, pid(), LockMode::Exclusive));
    }

    #[test]
    fn release_all_frees_every_page() {
        let lm = LockManager::new();
        let p0 = PageId::new(1, 0);
        let p1 = PageId::new(1, 1);
        lm.acquire(1, p0, LockMode::Exclusive).unwrap();
        lm.acquire(1, p1, LockMode::Shared).unwrap();
        lm.release_all(1);
        assert!(!lm.holds_any(1, p0));
        assert!(!lm.holds_any(1, p1));
    }

    #[test]
    fn self_upgrade_waiting_does_not_deadlock_against_itself() {
        let lm = LockManager::new();
        lm.acquire(1, pid(), LockMode::Shared).unwrap();
        lm.acquire(2, pid(), LockMode::Shared).unwrap();
        // tid 1 wants to upgrade but tid 2 also holds shared: must wait, not
        // false-deadlock against its own held lock.
        let err = std::thread::scope(|s| {
            let lm = &lm;
            let handle = s.spawn(move || lm.acquire(1, pid(), LockMode::Exclusive));
            std::thread::sleep(std::time::Duration::from_millis(20));
            lm.release(2, pid());
            handle.join().unwrap()
        });
        assert!(err.is_ok());
    }

    #[test]
    fn wait_quantum_does_not_change_grant_outcome() {
        let lm = LockManager::with_wait_quantum(Duration::from_millis(10));
        lm.acquire(1, pid(), LockMode::Exclusive).unwrap();
        let granted = std::thread::scope(|s| {
            let lm = &lm;
            let handle = s.spawn(move || lm.acquire(2, pid(), LockMode::Shared));
            // Outlast several quantum re-checks before releasing, to prove
            // the bounded wait alone never grants a still-conflicting lock.
            std::thread::sleep(Duration::from_millis(35));
            lm.release(1, pid());
            handle.join().unwrap()
        });
        assert!(granted.is_ok());
        assert!(lm.holds(2, pid(), LockMode::Shared));
    }
}
