//! Contract between the cue list controller and the sequence engine that owns
//! the step list and the per-step timers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::speed::{speed_to_string, Speed};

/// Identifier of a sequence in the show.
pub type SequenceId = u32;

/// Playback direction of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// What a [`StepChangeAction`] asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    SetStepIndex,
    NextStep,
    PreviousStep,
    StopStep,
}

/// How the engine should treat step fade timing when applying an action or
/// an intensity adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FadeControlMode {
    /// Use the fade times authored on the step.
    FromFunction,
    /// Blend at the given weight, fader at rest.
    Blended,
    /// Mid-crossfade: apply only the instantaneous blend weight.
    BlendedCrossfade,
}

/// A single command for the sequence engine. Built fresh for every dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct StepChangeAction {
    pub action: StepAction,
    pub step_index: Option<usize>,
    pub master_intensity: f64,
    pub step_intensity: f64,
    pub fade_mode: FadeControlMode,
}

impl StepChangeAction {
    fn new(action: StepAction, step_index: Option<usize>) -> Self {
        Self {
            action,
            step_index,
            master_intensity: 1.0,
            step_intensity: 1.0,
            fade_mode: FadeControlMode::FromFunction,
        }
    }

    pub fn set_step_index(index: usize) -> Self {
        Self::new(StepAction::SetStepIndex, Some(index))
    }

    pub fn stop_step(index: Option<usize>) -> Self {
        Self::new(StepAction::StopStep, index)
    }

    pub fn with_fade_mode(mut self, fade_mode: FadeControlMode) -> Self {
        self.fade_mode = fade_mode;
        self
    }
}

/// Timing snapshot of the step the engine currently reports as running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTiming {
    pub elapsed: Duration,
    pub fade_in: Speed,
    pub duration: Speed,
}

/// The sequencer that actually runs steps. Implementations are shared with
/// a real-time thread, so every method takes `&self`.
pub trait SequenceEngine: Send + Sync {
    fn step_count(&self) -> usize;

    fn direction(&self) -> Direction;

    fn is_running(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Index of the step announced as current, if any.
    fn current_step_index(&self) -> Option<usize>;

    /// Number of steps playing at once: 0, 1, or 2 during a crossfade.
    fn running_steps(&self) -> usize;

    /// The engine's own successor of `from`, honouring direction and run order.
    fn compute_next_step(&self, from: usize) -> Option<usize>;

    fn current_running_step(&self) -> Option<StepTiming>;

    fn set_action(&self, action: StepChangeAction);

    fn adjust_step_intensity(&self, fraction: f64, step_index: Option<usize>, mode: FadeControlMode);

    fn adjust_intensity(&self, master: f64);

    fn start(&self);

    fn stop(&self);

    fn set_pause(&self, paused: bool);

    fn format_speed(&self, duration: Duration) -> String {
        speed_to_string(duration)
    }
}

/// Looks sequences up by id. The answer may change between two calls: a
/// sequence can be removed from the show at any time.
pub trait SequenceRegistry: Send + Sync {
    fn sequence(&self, id: SequenceId) -> Option<Arc<dyn SequenceEngine>>;
}

/// Notifications pushed by the engine. They may be produced on the engine
/// thread and are delivered to the controller's task in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceNotification {
    Running(SequenceId),
    Stopped(SequenceId),
    CurrentStepChanged { sequence: SequenceId, step: usize },
    Removed(SequenceId),
}

impl SequenceNotification {
    pub fn sequence_id(&self) -> SequenceId {
        match self {
            SequenceNotification::Running(id)
            | SequenceNotification::Stopped(id)
            | SequenceNotification::Removed(id) => *id,
            SequenceNotification::CurrentStepChanged { sequence, .. } => *sequence,
        }
    }
}

pub type NotificationSender = mpsc::UnboundedSender<SequenceNotification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<SequenceNotification>;

pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}
