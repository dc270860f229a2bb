//! Turns MIDI velocity values into step indices.
//!
//! Single-value mode: velocity 1-127 selects step index 0-126; velocity 0 is
//! reserved. Two-value mode: a first and a second velocity combine into
//! `first * 128 + second`, selecting step index 0-16382; the pair (0, 0) is
//! reserved. If the second value does not arrive in time the first value is
//! used on its own with the single-value rule.

use std::time::{Duration, Instant};

use crate::timer::{Scheduler, TimerKind, TimerToken};

pub const DEFAULT_TIMEOUT_MS: u64 = 500;
pub const MIN_TIMEOUT_MS: u64 = 100;

const MAX_VELOCITY: u8 = 127;

pub fn clamp_timeout_ms(timeout_ms: u64) -> u64 {
    timeout_ms.max(MIN_TIMEOUT_MS)
}

#[derive(Debug)]
pub struct MidiStepDecoder {
    enabled: bool,
    two_note_mode: bool,
    timeout: Duration,
    first_note: Option<u8>,
    timeout_timer: Option<TimerToken>,
}

impl Default for MidiStepDecoder {
    fn default() -> Self {
        Self {
            enabled: false,
            two_note_mode: false,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            first_note: None,
            timeout_timer: None,
        }
    }
}

impl MidiStepDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn two_note_mode(&self) -> bool {
        self.two_note_mode
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn awaiting_second_note(&self) -> bool {
        self.first_note.is_some()
    }

    /// Returns true if the flag changed. Any buffered first note is dropped
    /// together with its timeout.
    pub fn set_enabled(&mut self, enabled: bool, scheduler: &mut Scheduler) -> bool {
        if self.enabled == enabled {
            return false;
        }
        self.enabled = enabled;
        self.reset(scheduler);
        true
    }

    pub fn set_two_note_mode(&mut self, two_note_mode: bool, scheduler: &mut Scheduler) -> bool {
        if self.two_note_mode == two_note_mode {
            return false;
        }
        self.two_note_mode = two_note_mode;
        self.reset(scheduler);
        true
    }

    /// Applies to timeouts armed from now on. Values under 100 ms are raised.
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) -> u64 {
        let clamped = clamp_timeout_ms(timeout_ms);
        if clamped != timeout_ms {
            log::warn!(
                "MIDI two-note timeout {}ms below minimum, using {}ms",
                timeout_ms,
                clamped
            );
        }
        self.timeout = Duration::from_millis(clamped);
        clamped
    }

    pub fn reset(&mut self, scheduler: &mut Scheduler) {
        if let Some(token) = self.timeout_timer.take() {
            scheduler.cancel(token);
        }
        self.first_note = None;
    }

    /// First-note input. Returns a step index ready for rate limiting, or
    /// `None` when the value is reserved or buffered for a second note.
    pub fn handle_first_note(
        &mut self,
        velocity: u8,
        now: Instant,
        scheduler: &mut Scheduler,
    ) -> Option<usize> {
        if !self.enabled {
            return None;
        }
        let velocity = velocity.min(MAX_VELOCITY);

        if self.two_note_mode {
            if let Some(token) = self.timeout_timer.take() {
                scheduler.cancel(token);
            }
            self.first_note = Some(velocity);
            self.timeout_timer = Some(scheduler.schedule(TimerKind::TwoNoteTimeout, now + self.timeout));
            log::debug!(
                "MIDI step selection: waiting for second velocity, timeout {}ms",
                self.timeout.as_millis()
            );
            return None;
        }

        Self::decode_single(velocity)
    }

    pub fn handle_second_note(&mut self, velocity: u8, scheduler: &mut Scheduler) -> Option<usize> {
        if !self.enabled || !self.two_note_mode {
            return None;
        }
        let first = self.first_note.take()?;
        if let Some(token) = self.timeout_timer.take() {
            scheduler.cancel(token);
        }

        let value = usize::from(first) * 128 + usize::from(velocity.min(MAX_VELOCITY));
        log::debug!(
            "MIDI step selection: {} * 128 + {} = {}",
            first,
            velocity,
            value
        );
        if value == 0 {
            log::debug!("MIDI step selection: velocities 0,0 ignored (reserved)");
            return None;
        }
        Some(value - 1)
    }

    /// The timeout armed by the first note fired. Stale tokens are ignored.
    pub fn handle_timeout(&mut self, token: TimerToken) -> Option<usize> {
        if self.timeout_timer != Some(token) {
            return None;
        }
        self.timeout_timer = None;
        let first = self.first_note.take()?;
        log::debug!(
            "MIDI step selection: second velocity timed out, using first velocity {}",
            first
        );
        Self::decode_single(first)
    }

    fn decode_single(velocity: u8) -> Option<usize> {
        if velocity == 0 {
            log::debug!("MIDI step selection: velocity 0 ignored (reserved)");
            return None;
        }
        Some(usize::from(velocity) - 1)
    }
}
