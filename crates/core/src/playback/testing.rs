//! Recording sequence engine for controller unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::sequence::{
    Direction, FadeControlMode, SequenceEngine, SequenceId, SequenceRegistry, StepAction,
    StepChangeAction, StepTiming,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub fraction: f64,
    pub step_index: Option<usize>,
    pub mode: FadeControlMode,
}

#[derive(Debug, Default)]
pub struct RecordedState {
    pub step_count: usize,
    pub direction: Direction,
    pub running: bool,
    pub paused: bool,
    pub current: Option<usize>,
    pub running_steps: usize,
    pub timing: Option<StepTiming>,
    pub actions: Vec<StepChangeAction>,
    pub adjustments: Vec<Adjustment>,
    pub master: Vec<f64>,
    pub starts: usize,
    pub stops: usize,
}

/// Records every call and follows the controller's commands just enough to
/// report a plausible run state.
pub struct RecordingSequence {
    pub state: Mutex<RecordedState>,
}

impl RecordingSequence {
    pub fn new(step_count: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RecordedState {
                step_count,
                ..Default::default()
            }),
        })
    }

    pub fn backward(step_count: usize) -> Arc<Self> {
        let sequence = Self::new(step_count);
        sequence.state.lock().direction = Direction::Backward;
        sequence
    }

    pub fn set_running(&self, current: usize) {
        let mut state = self.state.lock();
        state.running = true;
        state.current = Some(current);
        state.running_steps = 1;
    }

    pub fn actions(&self) -> Vec<StepChangeAction> {
        self.state.lock().actions.clone()
    }

    pub fn last_action(&self) -> Option<StepChangeAction> {
        self.state.lock().actions.last().cloned()
    }

    pub fn adjustments(&self) -> Vec<Adjustment> {
        self.state.lock().adjustments.clone()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.actions.clear();
        state.adjustments.clear();
        state.master.clear();
    }
}

impl SequenceEngine for RecordingSequence {
    fn step_count(&self) -> usize {
        self.state.lock().step_count
    }

    fn direction(&self) -> Direction {
        self.state.lock().direction
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.running && state.paused
    }

    fn current_step_index(&self) -> Option<usize> {
        self.state.lock().current
    }

    fn running_steps(&self) -> usize {
        self.state.lock().running_steps
    }

    fn compute_next_step(&self, from: usize) -> Option<usize> {
        let state = self.state.lock();
        if state.step_count == 0 {
            return None;
        }
        match state.direction {
            Direction::Forward => Some((from + 1) % state.step_count),
            Direction::Backward => Some(if from == 0 { state.step_count - 1 } else { from - 1 }),
        }
    }

    fn current_running_step(&self) -> Option<StepTiming> {
        self.state.lock().timing
    }

    fn set_action(&self, action: StepChangeAction) {
        let mut state = self.state.lock();
        if state.running && action.action == StepAction::SetStepIndex {
            state.current = action.step_index;
        }
        state.actions.push(action);
    }

    fn adjust_step_intensity(&self, fraction: f64, step_index: Option<usize>, mode: FadeControlMode) {
        self.state.lock().adjustments.push(Adjustment {
            fraction,
            step_index,
            mode,
        });
    }

    fn adjust_intensity(&self, master: f64) {
        self.state.lock().master.push(master);
    }

    fn start(&self) {
        let mut state = self.state.lock();
        state.running = true;
        state.paused = false;
        state.starts += 1;
        state.running_steps = 1;
        state.current = state
            .actions
            .last()
            .filter(|action| action.action == StepAction::SetStepIndex)
            .and_then(|action| action.step_index);
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.paused = false;
        state.stops += 1;
        state.running_steps = 0;
        state.current = None;
    }

    fn set_pause(&self, paused: bool) {
        self.state.lock().paused = paused;
    }
}

#[derive(Default)]
pub struct RecordingRegistry {
    sequences: Mutex<HashMap<SequenceId, Arc<RecordingSequence>>>,
}

impl RecordingRegistry {
    pub fn with(id: SequenceId, sequence: Arc<RecordingSequence>) -> Arc<Self> {
        let registry = Arc::new(Self::default());
        registry.insert(id, sequence);
        registry
    }

    pub fn insert(&self, id: SequenceId, sequence: Arc<RecordingSequence>) {
        self.sequences.lock().insert(id, sequence);
    }

    pub fn remove(&self, id: SequenceId) {
        self.sequences.lock().remove(&id);
    }
}

impl SequenceRegistry for RecordingRegistry {
    fn sequence(&self, id: SequenceId) -> Option<Arc<dyn SequenceEngine>> {
        self.sequences
            .lock()
            .get(&id)
            .cloned()
            .map(|sequence| sequence as Arc<dyn SequenceEngine>)
    }
}
