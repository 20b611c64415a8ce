//! Page-level locking for strict two-phase locking.
//!
//! One mutex guards the per-page lock states and the waits-for graph
//! together, so deadlock detection always sees a consistent graph. A single
//! condvar wakes every waiter on each release; waiters re-test their
//! predicate under the mutex. The per-wait timeout is a liveness backstop;
//! cycle detection is the authoritative deadlock mechanism.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::cairn_debug_log;
use crate::error::{DbError, DbResult};
use crate::transaction::TransactionId;
use crate::PageId;

/// Default condition-wait backstop.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Lock state of a single page.
#[derive(Debug, Default)]
struct LockState {
    mode: Option<LockMode>,
    owners: HashSet<TransactionId>,
    waiters: HashSet<TransactionId>,
}

impl LockState {
    fn can_grant(&self, tid: TransactionId, mode: LockMode) -> bool {
        match (self.mode, mode) {
            (None, _) => true,
            (Some(LockMode::Shared), LockMode::Shared) => true,
            // Upgrade in place only when the requester is the sole owner.
            (Some(LockMode::Shared), LockMode::Exclusive) => {
                self.owners.len() == 1 && self.owners.contains(&tid)
            }
            // Reentrant for the exclusive holder.
            (Some(LockMode::Exclusive), _) => self.owners.contains(&tid),
        }
    }
}

/// Lock table plus waits-for graph; always mutated under one mutex.
#[derive(Debug, Default)]
struct LockTables {
    locks: HashMap<PageId, LockState>,
    /// Edge T -> {O...}: T is waiting for a lock held by each O.
    waits_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl LockTables {
    /// Grants the request if the page's state machine allows it. A grant to a
    /// new owner adds a waits-for edge from every current waiter to it.
    fn try_acquire(&mut self, pid: PageId, tid: TransactionId, mode: LockMode) -> bool {
        let state = self.locks.entry(pid).or_default();
        if !state.can_grant(tid, mode) {
            return false;
        }

        if state.mode != Some(LockMode::Exclusive) {
            state.mode = Some(match mode {
                LockMode::Exclusive => LockMode::Exclusive,
                LockMode::Shared => LockMode::Shared,
            });
        }

        if state.owners.insert(tid) {
            for &waiter in &state.waiters {
                if waiter != tid {
                    self.waits_for.entry(waiter).or_default().insert(tid);
                }
            }
        }
        true
    }

    /// True iff letting `tid` wait on `pid` would close a cycle: some current
    /// owner already (transitively) waits for `tid`.
    fn would_deadlock(&self, pid: PageId, tid: TransactionId) -> bool {
        let Some(state) = self.locks.get(&pid) else {
            return false;
        };
        state
            .owners
            .iter()
            .filter(|&&owner| owner != tid)
            .any(|&owner| self.reaches(owner, tid))
    }

    fn reaches(&self, from: TransactionId, to: TransactionId) -> bool {
        let mut queue = VecDeque::from([from]);
        let mut visited = HashSet::from([from]);
        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = self.waits_for.get(&current) {
                for &next in neighbors {
                    if next == to {
                        return true;
                    }
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        false
    }

    /// Joins the page's waiter set, with an edge to every current owner.
    fn enter_wait(&mut self, pid: PageId, tid: TransactionId) {
        let state = self.locks.entry(pid).or_default();
        if state.waiters.insert(tid) {
            let edges = self.waits_for.entry(tid).or_default();
            for &owner in &state.owners {
                if owner != tid {
                    edges.insert(owner);
                }
            }
        }
    }

    /// Leaves the waiter set and drops the edges to the page's owners.
    fn leave_wait(&mut self, pid: PageId, tid: TransactionId) {
        if let Some(state) = self.locks.get_mut(&pid) {
            state.waiters.remove(&tid);
            if let Some(edges) = self.waits_for.get_mut(&tid) {
                for owner in &state.owners {
                    edges.remove(owner);
                }
                if edges.is_empty() {
                    self.waits_for.remove(&tid);
                }
            }
        }
    }

    /// Removes `tid` from the page's owners. Returns true if it held the lock.
    fn release(&mut self, pid: PageId, tid: TransactionId) -> bool {
        let Some(state) = self.locks.get_mut(&pid) else {
            return false;
        };
        if !state.owners.remove(&tid) {
            return false;
        }
        if state.owners.is_empty() {
            state.mode = None;
        }
        for waiter in &state.waiters {
            if let Some(edges) = self.waits_for.get_mut(waiter) {
                edges.remove(&tid);
            }
        }
        if state.owners.is_empty() && state.waiters.is_empty() {
            self.locks.remove(&pid);
        }
        true
    }
}

/// Shared/exclusive page locks with waits-for-graph deadlock detection.
/// The victim policy: the requester whose wait would close a cycle fails
/// with `TransactionAborted`; holders are never chosen.
#[derive(Debug)]
pub struct LockManager {
    tables: Mutex<LockTables>,
    cvar: Condvar,
    wait_timeout: Duration,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_WAIT_TIMEOUT)
    }

    pub fn with_timeout(wait_timeout: Duration) -> Self {
        Self {
            tables: Mutex::new(LockTables::default()),
            cvar: Condvar::new(),
            wait_timeout,
        }
    }

    pub fn acquire_shared(&self, tid: TransactionId, pid: PageId) -> DbResult<()> {
        self.acquire(tid, pid, LockMode::Shared)
    }

    pub fn acquire_exclusive(&self, tid: TransactionId, pid: PageId) -> DbResult<()> {
        self.acquire(tid, pid, LockMode::Exclusive)
    }

    fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> DbResult<()> {
        let mut tables = self.tables.lock().unwrap();
        loop {
            if tables.try_acquire(pid, tid, mode) {
                return Ok(());
            }
            if tables.would_deadlock(pid, tid) {
                cairn_debug_log!(
                    "[LockManager] deadlock: aborting requester {:?} on {:?}",
                    tid,
                    pid
                );
                self.cvar.notify_all();
                return Err(DbError::TransactionAborted);
            }
            tables.enter_wait(pid, tid);
            let (guard, _timeout) = self.cvar.wait_timeout(tables, self.wait_timeout).unwrap();
            tables = guard;
            tables.leave_wait(pid, tid);
        }
    }

    /// Early release of one lock. Risky under two-phase locking; the buffer
    /// pool exposes it for callers that know a page was not read or written.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut tables = self.tables.lock().unwrap();
        if tables.release(pid, tid) {
            self.cvar.notify_all();
        }
    }

    /// Releases every lock `tid` holds and clears it from the graph.
    pub fn release_all(&self, tid: TransactionId) {
        let mut tables = self.tables.lock().unwrap();
        let pids: Vec<PageId> = tables.locks.keys().copied().collect();
        let mut released_any = false;
        for pid in pids {
            released_any |= tables.release(pid, tid);
        }
        tables.waits_for.remove(&tid);
        for edges in tables.waits_for.values_mut() {
            edges.remove(&tid);
        }
        if released_any {
            self.cvar.notify_all();
        }
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        let tables = self.tables.lock().unwrap();
        tables
            .locks
            .get(&pid)
            .map(|state| state.owners.contains(&tid))
            .unwrap_or(false)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
