//! Per-sibling-set locks with bounded, FIFO-fair waiting.
//!
//! # Responsibility
//! - Serialize structural changes (create, move, delete, renumber) touching
//!   the same sibling set.
//! - Acquire several sets in one global order so two operations can never
//!   wait on each other.
//!
//! # Invariants
//! - Keys are acquired in ascending `SiblingSetKey` order: card sets, then
//!   list sets, then board sets, each by ascending parent id.
//! - Waiters are served in arrival order (ticket lock).
//! - A timed-out acquisition releases everything it already holds and leaves
//!   no ticket behind that could stall later waiters.

use crate::model::hierarchy::SiblingSetKey;
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lock acquisition failures. Nothing is held when one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The set stayed locked for the whole bounded wait.
    Timeout {
        key: SiblingSetKey,
        waited: Duration,
    },
    /// The entity kept changing parent between validation and locking.
    Contended {
        key: SiblingSetKey,
        attempts: u32,
    },
}

impl Display for LockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { key, waited } => write!(
                f,
                "sibling set {key} busy: lock not acquired within {} ms",
                waited.as_millis()
            ),
            Self::Contended { key, attempts } => write!(
                f,
                "sibling set {key} busy: still changing after {attempts} attempts"
            ),
        }
    }
}

impl Error for LockError {}

#[derive(Debug, Default)]
struct TicketState {
    next_ticket: u64,
    now_serving: u64,
    abandoned: BTreeSet<u64>,
}

impl TicketState {
    fn advance(&mut self) {
        self.now_serving += 1;
        while self.abandoned.remove(&self.now_serving) {
            self.now_serving += 1;
        }
    }

    fn is_idle(&self) -> bool {
        self.now_serving == self.next_ticket
    }
}

/// FIFO gate guarding one sibling set.
#[derive(Debug, Default)]
struct Gate {
    state: Mutex<TicketState>,
    turn: Condvar,
}

impl Gate {
    fn state(&self) -> MutexGuard<'_, TicketState> {
        // Ticket counters stay consistent across a panic in a holder.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, deadline: Instant) -> bool {
        let mut state = self.state();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while state.now_serving != ticket {
            let now = Instant::now();
            if now >= deadline {
                state.abandoned.insert(ticket);
                return false;
            }
            state = self
                .turn
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn release(&self) {
        let mut state = self.state();
        state.advance();
        drop(state);
        self.turn.notify_all();
    }

    fn is_idle(&self) -> bool {
        self.state().is_idle()
    }
}

/// Registry of sibling-set gates, created on demand and pruned when idle.
#[derive(Debug)]
pub struct SiblingLocks {
    gates: Mutex<HashMap<SiblingSetKey, Arc<Gate>>>,
    timeout: Duration,
}

impl SiblingLocks {
    /// Creates a registry whose acquisitions wait at most `timeout` in total.
    pub fn new(timeout: Duration) -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Locks one sibling set.
    pub fn lock_set(&self, key: SiblingSetKey) -> Result<SiblingLockGuard<'_>, LockError> {
        self.lock_sets(&[key])
    }

    /// Locks every distinct key in global order within one shared deadline.
    pub fn lock_sets(&self, keys: &[SiblingSetKey]) -> Result<SiblingLockGuard<'_>, LockError> {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let started_at = Instant::now();
        let deadline = started_at + self.timeout;
        let mut guard = SiblingLockGuard {
            registry: self,
            held: Vec::with_capacity(ordered.len()),
        };

        for key in ordered {
            let gate = self.gate(key);
            if !gate.acquire(deadline) {
                debug!(
                    "event=lock_timeout module=engine status=error set={} held={} waited_ms={}",
                    key,
                    guard.held.len(),
                    started_at.elapsed().as_millis()
                );
                // Dropping `guard` releases what was already taken.
                self.prune(key, &gate);
                return Err(LockError::Timeout {
                    key,
                    waited: started_at.elapsed(),
                });
            }
            guard.held.push((key, gate));
        }
        Ok(guard)
    }

    /// Number of sets with a live gate (held, awaited, or not yet pruned).
    pub fn tracked_sets(&self) -> usize {
        self.gates().len()
    }

    fn gates(&self) -> MutexGuard<'_, HashMap<SiblingSetKey, Arc<Gate>>> {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, key: SiblingSetKey) -> Arc<Gate> {
        Arc::clone(self.gates().entry(key).or_default())
    }

    fn prune(&self, key: SiblingSetKey, gate: &Arc<Gate>) {
        let mut gates = self.gates();
        // Registry entry plus the caller's clone: nobody else can reach it.
        if Arc::strong_count(gate) == 2 && gate.is_idle() {
            gates.remove(&key);
        }
    }
}

/// Scoped ownership of one or more sibling sets. Released on drop, in
/// reverse acquisition order.
#[derive(Debug)]
pub struct SiblingLockGuard<'a> {
    registry: &'a SiblingLocks,
    held: Vec<(SiblingSetKey, Arc<Gate>)>,
}

impl SiblingLockGuard<'_> {
    pub fn keys(&self) -> Vec<SiblingSetKey> {
        self.held.iter().map(|(key, _)| *key).collect()
    }

    pub fn covers(&self, key: &SiblingSetKey) -> bool {
        self.held.iter().any(|(held, _)| held == key)
    }
}

impl Drop for SiblingLockGuard<'_> {
    fn drop(&mut self) {
        while let Some((key, gate)) = self.held.pop() {
            gate.release();
            self.registry.prune(key, &gate);
        }
    }
}
