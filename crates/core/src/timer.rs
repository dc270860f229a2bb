//! Single-shot deferred callbacks with cancellation tokens.
//!
//! The controller never sleeps. Anything that has to happen later is
//! scheduled here and runs when the owning task calls
//! `CueListController::advance` with a time past the deadline. Each owner
//! keeps the token of the timer it armed and ignores tokens that no longer
//! match, so a cancelled or replaced timer can never act.

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Delayed dispatch of a coalesced step change.
    Debounce,
    /// Two-note MIDI selection gave up waiting for the second value.
    TwoNoteTimeout,
    /// Progress polling tick.
    Progress,
}

#[derive(Debug, Clone)]
struct Entry {
    token: TimerToken,
    kind: TimerKind,
    deadline: Instant,
}

/// A timer that reached its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueTimer {
    pub token: TimerToken,
    pub kind: TimerKind,
    pub deadline: Instant,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    next_token: u64,
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, kind: TimerKind, deadline: Instant) -> TimerToken {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.entries.push(Entry {
            token,
            kind,
            deadline,
        });
        token
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.token != token);
        self.entries.len() != before
    }

    pub fn is_scheduled(&self, token: TimerToken) -> bool {
        self.entries.iter().any(|entry| entry.token == token)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.deadline).min()
    }

    /// Remove and return the earliest timer due at `now`. Timers sharing a
    /// deadline come out in the order they were scheduled.
    pub fn pop_due(&mut self, now: Instant) -> Option<DueTimer> {
        let position = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.deadline <= now)
            .min_by_key(|(_, entry)| (entry.deadline, entry.token))
            .map(|(position, _)| position)?;

        let entry = self.entries.remove(position);
        Some(DueTimer {
            token: entry.token,
            kind: entry.kind,
            deadline: entry.deadline,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
