//! Page-level lock management.
//!
//! Every transaction acquires a shared or exclusive lock on a page before it
//! touches the page's bytes, and keeps all its locks until it completes
//! (strict two-phase locking). Blocked requests wait on a condition variable.
//!
//! Deadlocks are detected on a wait-for graph that is derived from the live
//! lock table whenever a request has to wait: an edge `a -> b` exists when
//! `a`'s pending request is blocked by `b`, either because `b` holds a
//! conflicting lock or because `b` is a queued writer that a new reader must
//! not overtake. The request whose wait would close a cycle is refused with
//! [`AbortReason::Deadlock`]. An optional timeout bounds every wait as well.

use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Deadlock,
    Timeout,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Deadlock => write!(f, "deadlock detected"),
            AbortReason::Timeout => write!(f, "lock wait timed out"),
        }
    }
}

/// The abort signal: `tid` must be completed with `commit = false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{tid} aborted while waiting for {page_id}: {reason}")]
pub struct TransactionAborted {
    pub tid: TransactionId,
    pub page_id: PageId,
    pub reason: AbortReason,
}

#[derive(Debug)]
struct LockEntry {
    holders: HashSet<TransactionId>,
    mode: LockMode,
}

#[derive(Debug, Clone, Copy)]
struct WaitRequest {
    page_id: PageId,
    mode: LockMode,
}

#[derive(Debug, Default)]
struct LockTable {
    locks: HashMap<PageId, LockEntry>,
    /// Pages each transaction holds a lock on.
    held: HashMap<TransactionId, HashSet<PageId>>,
    /// Pages each transaction has written.
    dirtied: HashMap<TransactionId, HashSet<PageId>>,
    /// The single request each blocked transaction is waiting on.
    waiting: HashMap<TransactionId, WaitRequest>,
}

impl LockTable {
    fn has_queued_writer(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.waiting
            .iter()
            .any(|(&w, req)| w != tid && req.page_id == page_id && req.mode == LockMode::Exclusive)
    }

    /// Grants the request if it is compatible with the current holders.
    fn try_grant(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode) -> bool {
        let queued_writer = self.has_queued_writer(tid, page_id);

        match self.locks.get_mut(&page_id) {
            None => {
                if mode == LockMode::Shared && queued_writer {
                    return false;
                }
                self.locks.insert(
                    page_id,
                    LockEntry {
                        holders: HashSet::from([tid]),
                        mode,
                    },
                );
            }
            Some(entry) if entry.holders.contains(&tid) => {
                if mode == LockMode::Shared || entry.mode == LockMode::Exclusive {
                    return true;
                }
                if entry.holders.len() > 1 {
                    return false;
                }
                entry.mode = LockMode::Exclusive;
                debug!("{} upgraded to exclusive on {}", tid, page_id);
            }
            Some(entry) => {
                if mode == LockMode::Exclusive || entry.mode == LockMode::Exclusive || queued_writer
                {
                    return false;
                }
                entry.holders.insert(tid);
            }
        }

        self.held.entry(tid).or_default().insert(page_id);
        true
    }

    /// Transactions that currently prevent `tid`'s request from being granted.
    fn blockers(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Vec<TransactionId> {
        let mut blockers = Vec::new();
        let is_holder = match self.locks.get(&page_id) {
            Some(entry) => {
                if mode == LockMode::Exclusive || entry.mode == LockMode::Exclusive {
                    blockers.extend(entry.holders.iter().copied().filter(|&h| h != tid));
                }
                entry.holders.contains(&tid)
            }
            None => false,
        };

        if mode == LockMode::Shared && !is_holder {
            blockers.extend(self.waiting.iter().filter_map(|(&w, req)| {
                (w != tid && req.page_id == page_id && req.mode == LockMode::Exclusive)
                    .then_some(w)
            }));
        }
        blockers
    }

    /// True if `start` is waiting and its wait closes a cycle in the
    /// wait-for graph.
    fn closes_cycle(&self, start: TransactionId) -> bool {
        let Some(req) = self.waiting.get(&start) else {
            return false;
        };

        let mut stack = self.blockers(start, req.page_id, req.mode);
        let mut visited = HashSet::new();
        while let Some(tid) = stack.pop() {
            if tid == start {
                return true;
            }
            if visited.insert(tid) {
                if let Some(req) = self.waiting.get(&tid) {
                    stack.extend(self.blockers(tid, req.page_id, req.mode));
                }
            }
        }
        false
    }

    fn release(&mut self, tid: TransactionId, page_id: PageId) {
        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }

        if let Some(entry) = self.locks.get_mut(&page_id) {
            entry.holders.remove(&tid);
            if entry.holders.is_empty() {
                self.locks.remove(&page_id);
            }
        }
    }
}

/// Lock table shared by all transactions.
pub struct LockManager {
    table: Mutex<LockTable>,
    cv: Condvar,
    default_timeout: Option<Duration>,
}

impl LockManager {
    /// Creates a lock manager that relies on deadlock detection alone.
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// Creates a lock manager whose waits are additionally bounded by `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            cv: Condvar::new(),
            default_timeout: timeout,
        }
    }

    /// Blocks until `tid` holds `page_id` in a mode at least as strong as
    /// `mode`, or returns the abort signal.
    pub fn acquire(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> Result<(), TransactionAborted> {
        self.acquire_with_timeout(tid, page_id, mode, self.default_timeout)
    }

    pub fn acquire_with_timeout(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> Result<(), TransactionAborted> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut table = self.table.lock();

        loop {
            if table.try_grant(tid, page_id, mode) {
                if table.waiting.remove(&tid).is_some() {
                    debug!("{} granted {:?} on {} after waiting", tid, mode, page_id);
                }
                return Ok(());
            }

            table.waiting.insert(tid, WaitRequest { page_id, mode });

            if table.closes_cycle(tid) {
                table.waiting.remove(&tid);
                // Readers queued behind this request may proceed now.
                self.cv.notify_all();
                warn!("{} refused {:?} on {}: deadlock", tid, mode, page_id);
                return Err(TransactionAborted {
                    tid,
                    page_id,
                    reason: AbortReason::Deadlock,
                });
            }

            match deadline {
                Some(deadline) => {
                    if self.cv.wait_until(&mut table, deadline).timed_out() {
                        if table.try_grant(tid, page_id, mode) {
                            table.waiting.remove(&tid);
                            return Ok(());
                        }
                        table.waiting.remove(&tid);
                        self.cv.notify_all();
                        warn!("{} timed out waiting for {:?} on {}", tid, mode, page_id);
                        return Err(TransactionAborted {
                            tid,
                            page_id,
                            reason: AbortReason::Timeout,
                        });
                    }
                }
                None => self.cv.wait(&mut table),
            }
        }
    }

    /// Releases one lock. Only safe for pages `tid` has not written.
    pub fn release(&self, tid: TransactionId, page_id: PageId) {
        let mut table = self.table.lock();
        table.release(tid, page_id);
        self.cv.notify_all();
    }

    /// Releases every lock held by `tid` and forgets its dirtied pages.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock();
        if let Some(pages) = table.held.remove(&tid) {
            for page_id in pages {
                table.release(tid, page_id);
            }
        }
        table.dirtied.remove(&tid);
        table.waiting.remove(&tid);
        self.cv.notify_all();
    }

    /// Checks if a transaction holds any lock on `page_id`.
    pub fn holds(&self, tid: TransactionId, page_id: PageId) -> bool {
        let table = self.table.lock();
        table
            .locks
            .get(&page_id)
            .is_some_and(|entry| entry.holders.contains(&tid))
    }

    /// The mode `page_id` is currently locked in, if any.
    pub fn lock_mode(&self, page_id: PageId) -> Option<LockMode> {
        self.table.lock().locks.get(&page_id).map(|entry| entry.mode)
    }

    pub fn holders(&self, page_id: PageId) -> Vec<TransactionId> {
        let table = self.table.lock();
        let mut holders: Vec<_> = table
            .locks
            .get(&page_id)
            .map(|entry| entry.holders.iter().copied().collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }

    /// Pages `tid` currently holds locks on, in page order.
    pub fn held_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        let mut pages: Vec<_> = table
            .held
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }

    /// Records that `tid` wrote `page_id`.
    pub fn record_dirtied(&self, tid: TransactionId, page_id: PageId) {
        self.table
            .lock()
            .dirtied
            .entry(tid)
            .or_default()
            .insert(page_id);
    }

    pub fn dirtied_pages_of(&self, tid: TransactionId) -> HashSet<PageId> {
        self.table
            .lock()
            .dirtied
            .get(&tid)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
