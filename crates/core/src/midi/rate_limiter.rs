//! Coalescing debouncer for step changes.
//!
//! At most one step change reaches the sequence engine per debounce window.
//! Candidates arriving inside the window overwrite each other and the most
//! recent one is dispatched when the window closes.

use std::time::{Duration, Instant};

use crate::timer::{Scheduler, TimerKind, TimerToken};

pub const DEFAULT_DEBOUNCE_MS: u64 = 100;
pub const MIN_DEBOUNCE_MS: u64 = 10;
pub const MAX_DEBOUNCE_MS: u64 = 1000;

const MIN_RETRY_DELAY: Duration = Duration::from_millis(10);

pub fn clamp_debounce_ms(debounce_ms: u64) -> u64 {
    debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS)
}

#[derive(Debug)]
pub struct StepRateLimiter {
    interval: Duration,
    last_dispatch: Option<Instant>,
    pending: Option<usize>,
    timer: Option<TimerToken>,
}

impl Default for StepRateLimiter {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            last_dispatch: None,
            pending: None,
            timer: None,
        }
    }
}

impl StepRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_dispatch(&self) -> Option<Instant> {
        self.last_dispatch
    }

    /// Returns the interval actually in use after clamping.
    pub fn set_interval_ms(&mut self, debounce_ms: u64) -> u64 {
        let clamped = clamp_debounce_ms(debounce_ms);
        if clamped != debounce_ms {
            log::warn!(
                "MIDI debounce {}ms out of range, using {}ms",
                debounce_ms,
                clamped
            );
        }
        self.interval = Duration::from_millis(clamped);
        clamped
    }

    /// Offer a candidate index. Returns it when it may be dispatched right
    /// away; otherwise it is held until the armed timer fires.
    pub fn submit(&mut self, index: usize, now: Instant, scheduler: &mut Scheduler) -> Option<usize> {
        let elapsed = self
            .last_dispatch
            .map(|at| now.saturating_duration_since(at));

        match elapsed {
            Some(elapsed) if elapsed < self.interval => {
                self.pending = Some(index);
                if self.timer.is_none() {
                    let delay = (self.interval - elapsed).max(MIN_RETRY_DELAY);
                    self.timer = Some(scheduler.schedule(TimerKind::Debounce, now + delay));
                    log::debug!("Step change {} deferred by {}ms", index, delay.as_millis());
                } else {
                    log::debug!("Step change {} replaces pending change", index);
                }
                None
            }
            _ => {
                // A newer candidate supersedes anything still waiting
                if let Some(token) = self.timer.take() {
                    scheduler.cancel(token);
                }
                self.pending = None;
                Some(index)
            }
        }
    }

    /// The debounce timer fired. Yields the pending index without checking
    /// the elapsed time again.
    pub fn fire(&mut self, token: TimerToken) -> Option<usize> {
        if self.timer != Some(token) {
            return None;
        }
        self.timer = None;
        self.pending.take()
    }

    /// Record a change that actually reached the sequence engine.
    pub fn mark_dispatched(&mut self, at: Instant) {
        self.last_dispatch = Some(at);
    }

    /// Drop the pending change and open a fresh window at `now`, so a burst
    /// arriving right after attach or enable collapses into one dispatch.
    pub fn reset(&mut self, now: Instant, scheduler: &mut Scheduler) {
        if let Some(token) = self.timer.take() {
            scheduler.cancel(token);
        }
        self.pending = None;
        self.last_dispatch = Some(now);
    }
}
