//! Hold-off bookkeeping for request preparers.
//!
//! While a preparation session is open every item passed to
//! [`RequestPreparerCoordinator::maybe_hold`] waits, in arrival order. A
//! session closes when each of its preparers has reported done or when its
//! timeout fires; signals carry the session's generation and signals for any
//! other generation are ignored.

use std::collections::VecDeque;

use tracing::{debug, info};

/// Outcome of [`RequestPreparerCoordinator::maybe_hold`].
#[derive(Debug)]
pub enum HoldDecision<T> {
    /// No preparation pending; run the item now.
    Proceed(T),
    /// The item is parked. `started` is the generation of a session this call
    /// opened, if it opened one.
    Held { started: Option<u64> },
}

#[derive(Debug)]
pub struct RequestPreparerCoordinator<T> {
    active: usize,
    current: Option<u64>,
    last_generation: u64,
    waiting: VecDeque<T>,
}

impl<T> Default for RequestPreparerCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestPreparerCoordinator<T> {
    pub fn new() -> Self {
        Self {
            active: 0,
            current: None,
            last_generation: 0,
            waiting: VecDeque::new(),
        }
    }

    /// Park `item` if a session is open, or open one when `preparer_count > 0`.
    pub fn maybe_hold(&mut self, item: T, preparer_count: usize) -> HoldDecision<T> {
        if self.current.is_some() {
            self.waiting.push_back(item);
            return HoldDecision::Held { started: None };
        }
        if preparer_count == 0 {
            return HoldDecision::Proceed(item);
        }
        self.last_generation += 1;
        let generation = self.last_generation;
        self.current = Some(generation);
        self.active = preparer_count;
        self.waiting.push_back(item);
        info!(generation, preparers = preparer_count, "Preparation session started");
        HoldDecision::Held {
            started: Some(generation),
        }
    }

    /// One preparer finished. Returns the released items once all have.
    pub fn on_preparer_done(&mut self, generation: u64) -> Option<Vec<T>> {
        if !self.is_current(generation) {
            return None;
        }
        self.active = self.active.saturating_sub(1);
        if self.active > 0 {
            debug!(generation, remaining = self.active, "Preparer done");
            return None;
        }
        Some(self.finish())
    }

    /// The session's timeout fired. Releases everything still waiting.
    pub fn on_timeout(&mut self, generation: u64) -> Option<Vec<T>> {
        if !self.is_current(generation) {
            return None;
        }
        Some(self.finish())
    }

    fn is_current(&self, generation: u64) -> bool {
        if self.current == Some(generation) {
            return true;
        }
        debug!(generation, current = ?self.current, "Ignoring stale preparer signal");
        false
    }

    fn finish(&mut self) -> Vec<T> {
        self.current = None;
        self.active = 0;
        self.waiting.drain(..).collect()
    }

    pub fn is_preparing(&self) -> bool {
        self.current.is_some()
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Generation of the open session.
    pub fn generation(&self) -> Option<u64> {
        self.current
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Drop the open session and everything waiting on it.
    pub fn clear(&mut self) {
        self.finish();
    }
}
