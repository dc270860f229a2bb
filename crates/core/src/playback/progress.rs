//! Polls the running step's timing and republishes it as a normalized
//! progress value plus remaining-time text.

use std::time::{Duration, Instant};

use crate::messages::{ProgressInfo, ProgressStatus};
use crate::sequence::{SequenceEngine, Speed, StepTiming};
use crate::timer::{Scheduler, TimerKind, TimerToken};

pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Progress of one timing snapshot.
pub fn compute_progress(timing: &StepTiming, format: impl Fn(Duration) -> String) -> ProgressInfo {
    let elapsed = timing.elapsed;
    let status = match timing.fade_in {
        Speed::Infinite => ProgressStatus::Infinite,
        Speed::Finite(fade_in) if elapsed <= fade_in => ProgressStatus::FadeIn,
        Speed::Finite(_) => ProgressStatus::Hold,
    };

    match (timing.duration, timing.fade_in) {
        (Speed::Finite(duration), _) => ProgressInfo {
            status,
            value: ratio(elapsed, duration),
            text: format!("-{}", format(duration.saturating_sub(elapsed))),
        },
        (Speed::Infinite, Speed::Finite(fade_in))
            if status == ProgressStatus::FadeIn && !fade_in.is_zero() =>
        {
            ProgressInfo {
                status,
                value: ratio(elapsed, fade_in),
                text: format!("-{}", format(fade_in.saturating_sub(elapsed))),
            }
        }
        (Speed::Infinite, _) => ProgressInfo {
            status,
            value: 1.0,
            text: String::new(),
        },
    }
}

fn ratio(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64()).min(1.0)
}

#[derive(Debug, Default)]
pub struct ProgressReporter {
    timer: Option<TimerToken>,
    current: ProgressInfo,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    pub fn current(&self) -> &ProgressInfo {
        &self.current
    }

    pub fn start(&mut self, now: Instant, scheduler: &mut Scheduler) {
        if self.timer.is_some() {
            return;
        }
        self.timer = Some(scheduler.schedule(TimerKind::Progress, now + PROGRESS_INTERVAL));
    }

    /// Stop polling and reset to idle. Returns true if the published
    /// progress changed.
    pub fn stop(&mut self, scheduler: &mut Scheduler) -> bool {
        if let Some(token) = self.timer.take() {
            scheduler.cancel(token);
        }
        self.publish(ProgressInfo::default())
    }

    /// A progress timer fired at `deadline`. Returns the new progress when
    /// it differs from what was last published.
    pub fn on_tick(
        &mut self,
        token: TimerToken,
        deadline: Instant,
        now: Instant,
        engine: Option<&dyn SequenceEngine>,
        scheduler: &mut Scheduler,
    ) -> Option<ProgressInfo> {
        if self.timer != Some(token) {
            return None;
        }

        let Some(engine) = engine.filter(|engine| engine.is_running()) else {
            self.timer = None;
            return None;
        };

        let mut next = deadline + PROGRESS_INTERVAL;
        if next <= now {
            next = now + PROGRESS_INTERVAL;
        }
        self.timer = Some(scheduler.schedule(TimerKind::Progress, next));

        let progress = match engine.current_running_step() {
            Some(timing) => compute_progress(&timing, |duration| engine.format_speed(duration)),
            None => ProgressInfo {
                value: 0.0,
                ..self.current.clone()
            },
        };

        if self.publish(progress) {
            Some(self.current.clone())
        } else {
            None
        }
    }

    fn publish(&mut self, progress: ProgressInfo) -> bool {
        if self.current == progress {
            return false;
        }
        self.current = progress;
        true
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::playback::testing::RecordingSequence;
    use crate::sequence::speed_to_string;

    fn timing(elapsed_ms: u64, fade_in: Speed, duration: Speed) -> StepTiming {
        StepTiming {
            elapsed: Duration::from_millis(elapsed_ms),
            fade_in,
            duration,
        }
    }

    #[test]
    fn test_finite_step() {
        let fade_in = Speed::from_millis(1000);
        let duration = Speed::from_millis(4000);

        let progress = compute_progress(&timing(500, fade_in, duration), speed_to_string);
        assert_eq!(progress.status, ProgressStatus::FadeIn);
        assert_relative_eq!(progress.value, 0.125);
        assert_eq!(progress.text, "-03s.50");

        let progress = compute_progress(&timing(1000, fade_in, duration), speed_to_string);
        assert_eq!(progress.status, ProgressStatus::FadeIn);

        let progress = compute_progress(&timing(3000, fade_in, duration), speed_to_string);
        assert_eq!(progress.status, ProgressStatus::Hold);
        assert_relative_eq!(progress.value, 0.75);
        assert_eq!(progress.text, "-01s");
    }

    #[test]
    fn test_infinite_hold() {
        let fade_in = Speed::from_millis(2000);

        let progress = compute_progress(&timing(500, fade_in, Speed::Infinite), speed_to_string);
        assert_eq!(progress.status, ProgressStatus::FadeIn);
        assert_relative_eq!(progress.value, 0.25);
        assert_eq!(progress.text, "-01s.50");

        let progress = compute_progress(&timing(2500, fade_in, Speed::Infinite), speed_to_string);
        assert_eq!(progress.status, ProgressStatus::Hold);
        assert_relative_eq!(progress.value, 1.0);
        assert!(progress.text.is_empty());
    }

    #[test]
    fn test_infinite_and_zero_fade_in() {
        let progress = compute_progress(&timing(500, Speed::Infinite, Speed::Infinite), speed_to_string);
        assert_eq!(progress.status, ProgressStatus::Infinite);
        assert_relative_eq!(progress.value, 1.0);
        assert!(progress.text.is_empty());

        let progress = compute_progress(&timing(0, Speed::from_millis(0), Speed::Infinite), speed_to_string);
        assert_eq!(progress.status, ProgressStatus::FadeIn);
        assert_relative_eq!(progress.value, 1.0);
        assert!(progress.text.is_empty());
    }

    #[test]
    fn test_reporter_polls_every_interval() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();
        let mut reporter = ProgressReporter::new();
        let engine = RecordingSequence::new(4);
        engine.set_running(0);
        engine.state.lock().timing = Some(timing(100, Speed::from_millis(1000), Speed::from_millis(2000)));

        reporter.start(t0, &mut scheduler);
        assert_eq!(scheduler.next_deadline(), Some(t0 + PROGRESS_INTERVAL));

        let due = scheduler.pop_due(t0 + PROGRESS_INTERVAL).unwrap();
        let progress = reporter
            .on_tick(due.token, due.deadline, due.deadline, Some(engine.as_ref()), &mut scheduler)
            .unwrap();
        assert_relative_eq!(progress.value, 0.05);
        assert_eq!(scheduler.next_deadline(), Some(t0 + PROGRESS_INTERVAL * 2));

        // Same snapshot, nothing new to publish
        let due = scheduler.pop_due(t0 + PROGRESS_INTERVAL * 2).unwrap();
        assert!(reporter
            .on_tick(due.token, due.deadline, due.deadline, Some(engine.as_ref()), &mut scheduler)
            .is_none());

        assert!(reporter.stop(&mut scheduler));
        assert!(scheduler.is_empty());
        assert_eq!(reporter.current(), &ProgressInfo::default());
    }

    #[test]
    fn test_reporter_goes_quiet_when_engine_stops() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();
        let mut reporter = ProgressReporter::new();
        let engine = RecordingSequence::new(4);

        reporter.start(t0, &mut scheduler);
        let due = scheduler.pop_due(t0 + PROGRESS_INTERVAL).unwrap();
        assert!(reporter
            .on_tick(due.token, due.deadline, due.deadline, Some(engine.as_ref()), &mut scheduler)
            .is_none());
        assert!(!reporter.is_active());
        assert!(scheduler.is_empty());
    }
}
