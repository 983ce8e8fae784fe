use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use super::{Lock, LockError};

struct State {
    owner: Option<ThreadId>,
    holds: usize,
    /// Tickets of blocked waiters, in arrival order.
    waiters: VecDeque<u64>,
    next_ticket: u64,
}

/// Reentrant lock with first-in-first-out hand-off, backed by `Mutex` + `Condvar`.
///
/// The owning thread may lock again; each `lock` must be paired with an
/// `unlock`. When the lock is released, the longest-waiting thread gets it
/// next, even if a newcomer arrives first.
pub struct ReentrantLock {
    name: String,
    state: Mutex<State>,
    wake: Condvar,
}

impl ReentrantLock {
    pub fn new() -> Self {
        Self::named("")
    }

    /// A lock whose errors mention `name`.
    pub fn named(name: impl Into<String>) -> Self {
        ReentrantLock {
            name: name.into(),
            state: Mutex::new(State {
                owner: None,
                holds: 0,
                waiters: VecDeque::new(),
                next_ticket: 0,
            }),
            wake: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any thread currently holds the lock.
    pub fn is_locked(&self) -> Result<bool, LockError> {
        Ok(self.state()?.owner.is_some())
    }

    pub fn is_held_by_current_thread(&self) -> Result<bool, LockError> {
        Ok(self.state()?.owner == Some(thread::current().id()))
    }

    /// Number of holds the current thread has on this lock (0 if not the owner).
    pub fn hold_count(&self) -> Result<usize, LockError> {
        let state = self.state()?;
        if state.owner == Some(thread::current().id()) {
            Ok(state.holds)
        } else {
            Ok(0)
        }
    }

    /// Number of threads blocked waiting for the lock.
    pub fn queue_len(&self) -> Result<usize, LockError> {
        Ok(self.state()?.waiters.len())
    }

    /// Poison the internal state, as a panic while holding it would.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _state = self.state.lock();
            panic!("panic while holding lock state");
        }));
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, LockError> {
        self.state.lock().map_err(LockError::poisoned)
    }

    fn acquire(&self, deadline: Option<Instant>) -> Result<bool, LockError> {
        let me = thread::current().id();
        let mut state = self.state()?;

        if state.owner == Some(me) {
            state.holds += 1;
            return Ok(true);
        }
        if state.owner.is_none() && state.waiters.is_empty() {
            state.owner = Some(me);
            state.holds = 1;
            return Ok(true);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back(ticket);

        loop {
            if state.owner.is_none() && state.waiters.front() == Some(&ticket) {
                state.waiters.pop_front();
                state.owner = Some(me);
                state.holds = 1;
                return Ok(true);
            }

            state = match deadline {
                None => self.wake.wait(state).map_err(LockError::poisoned)?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.waiters.retain(|waiter| *waiter != ticket);
                        // Leaving may have promoted a new head of the queue.
                        self.wake.notify_all();
                        return Ok(false);
                    }
                    let (state, _) = self
                        .wake
                        .wait_timeout(state, deadline - now)
                        .map_err(LockError::poisoned)?;
                    state
                }
            };
        }
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for ReentrantLock {
    fn lock(&self) -> Result<(), LockError> {
        self.acquire(None).map(|_| ())
    }

    fn lock_timeout(&self, timeout: Duration) -> Result<bool, LockError> {
        // A deadline past what `Instant` can represent is no deadline at all.
        self.acquire(Instant::now().checked_add(timeout))
    }

    fn try_lock(&self) -> Result<bool, LockError> {
        let me = thread::current().id();
        let mut state = self.state()?;
        if state.owner == Some(me) {
            state.holds += 1;
            Ok(true)
        } else if state.owner.is_none() && state.waiters.is_empty() {
            state.owner = Some(me);
            state.holds = 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn unlock(&self) -> Result<(), LockError> {
        let mut state = self.state()?;
        if state.owner != Some(thread::current().id()) {
            return Err(LockError::NotOwner {
                key: self.name.clone(),
            });
        }
        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            // Every waiter re-checks; only the head of the queue proceeds.
            self.wake.notify_all();
        }
        Ok(())
    }
}
