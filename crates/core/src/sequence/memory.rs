//! In-memory sequence engine used by the `cuelist` binary and by tests that
//! want real step timing instead of a recording mock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::engine::{
    Direction, FadeControlMode, NotificationSender, SequenceEngine, SequenceId,
    SequenceNotification, SequenceRegistry, StepAction, StepChangeAction, StepTiming,
};
use super::step::Step;

const MAX_RUNNING_STEPS: usize = 2;

#[derive(Clone, Debug)]
struct RunnerStep {
    index: usize,
    started_at: Instant,
    intensity: f64,
}

struct SequenceState {
    steps: Vec<Step>,
    direction: Direction,
    running: bool,
    paused_at: Option<Instant>,
    // The last entry is the current step
    runner: Vec<RunnerStep>,
    start_action: Option<StepChangeAction>,
    master_intensity: f64,
    clock: Instant,
}

impl SequenceState {
    fn current(&self) -> Option<usize> {
        self.runner.last().map(|step| step.index)
    }

    fn elapsed(&self, step: &RunnerStep) -> Duration {
        let reference = self.paused_at.unwrap_or(self.clock);
        reference.saturating_duration_since(step.started_at)
    }

    fn first_index(&self) -> Option<usize> {
        if self.steps.is_empty() {
            return None;
        }
        match self.direction {
            Direction::Forward => Some(0),
            Direction::Backward => Some(self.steps.len() - 1),
        }
    }

    fn next_of(&self, from: usize) -> Option<usize> {
        let count = self.steps.len();
        if count == 0 {
            return None;
        }
        match self.direction {
            Direction::Forward => Some((from + 1) % count),
            Direction::Backward => Some(if from == 0 { count - 1 } else { from - 1 }),
        }
    }

    fn previous_of(&self, from: usize) -> Option<usize> {
        let count = self.steps.len();
        if count == 0 {
            return None;
        }
        match self.direction {
            Direction::Forward => Some(if from == 0 { count - 1 } else { from - 1 }),
            Direction::Backward => Some((from + 1) % count),
        }
    }

    /// Make `index` the current step. In crossfade mode the outgoing step
    /// keeps running so the fader can finish it.
    fn jump(&mut self, index: usize, action: &StepChangeAction) -> bool {
        let previous = self.current();
        if action.fade_mode == FadeControlMode::BlendedCrossfade {
            let keep = self.runner.pop();
            self.runner.clear();
            if let Some(keep) = keep.filter(|step| step.index != index) {
                self.runner.push(keep);
            }
        } else {
            self.runner.clear();
        }

        self.runner.push(RunnerStep {
            index,
            started_at: self.clock,
            intensity: action.step_intensity,
        });
        previous != Some(index)
    }
}

/// A looping sequence held entirely in memory.
pub struct MemorySequence {
    id: SequenceId,
    name: String,
    state: Mutex<SequenceState>,
    notifier: Option<NotificationSender>,
}

impl MemorySequence {
    pub fn new(id: SequenceId, name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id,
            name: name.into(),
            state: Mutex::new(SequenceState {
                steps,
                direction: Direction::Forward,
                running: false,
                paused_at: None,
                runner: Vec::new(),
                start_action: None,
                master_intensity: 1.0,
                clock: Instant::now(),
            }),
            notifier: None,
        }
    }

    pub fn with_direction(self, direction: Direction) -> Self {
        self.state.lock().direction = direction;
        self
    }

    pub fn with_notifier(mut self, notifier: NotificationSender) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn id(&self) -> SequenceId {
        self.id
    }

    pub fn master_intensity(&self) -> f64 {
        self.state.lock().master_intensity
    }

    /// Intensity of a running step, `None` if the step is not running.
    pub fn step_intensity(&self, index: usize) -> Option<f64> {
        let state = self.state.lock();
        state
            .runner
            .iter()
            .find(|step| step.index == index)
            .map(|step| step.intensity)
    }

    pub fn running_step_indices(&self) -> Vec<usize> {
        self.state.lock().runner.iter().map(|step| step.index).collect()
    }

    /// Advance the engine clock. A finite step that has played its full
    /// duration hands over to its successor.
    pub fn tick(&self, now: Instant) {
        let mut pending = Vec::new();
        {
            let mut state = self.state.lock();
            state.clock = now;

            if !state.running || state.paused_at.is_some() || state.runner.len() != 1 {
                return;
            }

            let Some(current) = state.runner.last().cloned() else {
                return;
            };
            let Some(duration) = state.steps[current.index].duration().as_duration() else {
                return;
            };

            if state.elapsed(&current) >= duration {
                if let Some(next) = state.next_of(current.index) {
                    let action = StepChangeAction::set_step_index(next);
                    if state.jump(next, &action) {
                        pending.push(SequenceNotification::CurrentStepChanged {
                            sequence: self.id,
                            step: next,
                        });
                    }
                }
            }
        }
        self.notify(pending);
    }

    fn notify(&self, notifications: Vec<SequenceNotification>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        for notification in notifications {
            if notifier.send(notification).is_err() {
                log::debug!("Sequence {} has no listener for notifications", self.id);
                return;
            }
        }
    }
}

impl SequenceEngine for MemorySequence {
    fn step_count(&self) -> usize {
        self.state.lock().steps.len()
    }

    fn direction(&self) -> Direction {
        self.state.lock().direction
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.running && state.paused_at.is_some()
    }

    fn current_step_index(&self) -> Option<usize> {
        self.state.lock().current()
    }

    fn running_steps(&self) -> usize {
        self.state.lock().runner.len()
    }

    fn compute_next_step(&self, from: usize) -> Option<usize> {
        self.state.lock().next_of(from)
    }

    fn current_running_step(&self) -> Option<StepTiming> {
        let state = self.state.lock();
        if !state.running {
            return None;
        }
        let current = state.runner.last()?;
        let step = state.steps.get(current.index)?;
        Some(StepTiming {
            elapsed: state.elapsed(current),
            fade_in: step.fade_in,
            duration: step.duration(),
        })
    }

    fn set_action(&self, action: StepChangeAction) {
        let mut pending = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.running {
                if action.action == StepAction::SetStepIndex {
                    state.start_action = Some(action);
                }
                return;
            }

            let target = match action.action {
                StepAction::SetStepIndex => action.step_index.filter(|i| *i < state.steps.len()),
                StepAction::NextStep => match state.current() {
                    Some(current) => state.next_of(current),
                    None => state.first_index(),
                },
                StepAction::PreviousStep => match state.current() {
                    Some(current) => state.previous_of(current),
                    None => state.first_index(),
                },
                StepAction::StopStep => {
                    let Some(index) = action.step_index else {
                        return;
                    };
                    let was_current = state.current() == Some(index);
                    state.runner.retain(|step| step.index != index);

                    if state.runner.is_empty() {
                        state.running = false;
                        state.paused_at = None;
                        pending.push(SequenceNotification::Stopped(self.id));
                    } else if was_current {
                        if let Some(current) = state.current() {
                            pending.push(SequenceNotification::CurrentStepChanged {
                                sequence: self.id,
                                step: current,
                            });
                        }
                    }
                    None
                }
            };

            if let Some(target) = target {
                if state.jump(target, &action) {
                    pending.push(SequenceNotification::CurrentStepChanged {
                        sequence: self.id,
                        step: target,
                    });
                }
            }
        }
        self.notify(pending);
    }

    fn adjust_step_intensity(&self, fraction: f64, step_index: Option<usize>, mode: FadeControlMode) {
        let Some(index) = step_index else {
            return;
        };
        let mut state = self.state.lock();
        if !state.running || index >= state.steps.len() {
            return;
        }

        let fraction = fraction.clamp(0.0, 1.0);
        if let Some(step) = state.runner.iter_mut().find(|step| step.index == index) {
            step.intensity = fraction;
        } else if mode == FadeControlMode::BlendedCrossfade && state.runner.len() < MAX_RUNNING_STEPS {
            // Incoming side of a manual crossfade; the current step stays current
            let started_at = state.clock;
            state.runner.insert(
                0,
                RunnerStep {
                    index,
                    started_at,
                    intensity: fraction,
                },
            );
        }
    }

    fn adjust_intensity(&self, master: f64) {
        self.state.lock().master_intensity = master.clamp(0.0, 1.0);
    }

    fn start(&self) {
        let mut pending = Vec::new();
        {
            let mut state = self.state.lock();
            if state.running {
                return;
            }
            let action = state.start_action.take();
            let index = action
                .as_ref()
                .and_then(|a| a.step_index)
                .filter(|i| *i < state.steps.len())
                .or_else(|| state.first_index());

            let Some(index) = index else {
                log::warn!("Sequence {} has no steps to start", self.id);
                return;
            };

            let action = action.unwrap_or_else(|| StepChangeAction::set_step_index(index));
            state.running = true;
            state.paused_at = None;
            state.runner.clear();
            state.jump(index, &action);

            pending.push(SequenceNotification::Running(self.id));
            pending.push(SequenceNotification::CurrentStepChanged {
                sequence: self.id,
                step: index,
            });
        }
        log::info!("Sequence '{}' started", self.name);
        self.notify(pending);
    }

    fn stop(&self) {
        {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.paused_at = None;
            state.runner.clear();
            state.start_action = None;
        }
        log::info!("Sequence '{}' stopped", self.name);
        self.notify(vec![SequenceNotification::Stopped(self.id)]);
    }

    fn set_pause(&self, paused: bool) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }
        match (paused, state.paused_at) {
            (true, None) => state.paused_at = Some(state.clock),
            (false, Some(at)) => {
                let paused_for = state.clock.saturating_duration_since(at);
                for step in state.runner.iter_mut() {
                    step.started_at += paused_for;
                }
                state.paused_at = None;
            }
            _ => {}
        }
    }
}

/// The show's sequences, shared between the engine tick task and the
/// controller.
pub struct MemoryRegistry {
    sequences: RwLock<HashMap<SequenceId, Arc<MemorySequence>>>,
    notifier: Option<NotificationSender>,
}

impl MemoryRegistry {
    pub fn new(notifier: Option<NotificationSender>) -> Self {
        Self {
            sequences: RwLock::new(HashMap::new()),
            notifier,
        }
    }

    pub fn insert(&self, sequence: MemorySequence) -> Arc<MemorySequence> {
        let sequence = Arc::new(sequence);
        self.sequences
            .write()
            .insert(sequence.id(), Arc::clone(&sequence));
        sequence
    }

    pub fn get(&self, id: SequenceId) -> Option<Arc<MemorySequence>> {
        self.sequences.read().get(&id).cloned()
    }

    /// Remove a sequence from the show, stopping it first.
    pub fn remove(&self, id: SequenceId) -> Option<Arc<MemorySequence>> {
        let removed = self.sequences.write().remove(&id)?;
        removed.stop();
        if let Some(notifier) = &self.notifier {
            let _ = notifier.send(SequenceNotification::Removed(id));
        }
        Some(removed)
    }

    pub fn tick(&self, now: Instant) {
        let sequences: Vec<_> = self.sequences.read().values().cloned().collect();
        for sequence in sequences {
            sequence.tick(now);
        }
    }
}

impl SequenceRegistry for MemoryRegistry {
    fn sequence(&self, id: SequenceId) -> Option<Arc<dyn SequenceEngine>> {
        self.get(id).map(|sequence| sequence as Arc<dyn SequenceEngine>)
    }
}
