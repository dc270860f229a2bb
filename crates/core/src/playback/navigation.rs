//! Resolves Play/Stop/Next/Previous gestures into what the controller has to
//! do, given the run state of the sequence and the configured behavior.

use crate::messages::{NavigationPolicy, PlaybackLayout};
use crate::sequence::{Direction, StepAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Paused,
}

impl RunState {
    pub fn new(running: bool, paused: bool) -> Self {
        match (running, paused) {
            (false, _) => RunState::Idle,
            (true, false) => RunState::Running,
            (true, true) => RunState::Paused,
        }
    }

    pub fn is_running(self) -> bool {
        self != RunState::Idle
    }
}

/// What a gesture asks of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Let the engine move relative to its current step.
    Relative(StepAction),
    /// Move the cached playback index without touching the engine.
    Relocate(usize),
    /// Start the sequence at this step.
    Start(usize),
    /// Toggle pause. With `reannounce` the current step is sent again first
    /// so its fade values are applied on resume.
    TogglePause { reannounce: bool },
    Stop,
    Nothing,
}

/// Shape of the attached sequence as seen by the navigation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceShape {
    pub step_count: usize,
    pub direction: Direction,
}

impl SequenceShape {
    pub fn first_index(&self) -> Option<usize> {
        if self.step_count == 0 {
            return None;
        }
        match self.direction {
            Direction::Forward => Some(0),
            Direction::Backward => Some(self.step_count - 1),
        }
    }

    pub fn last_index(&self) -> Option<usize> {
        if self.step_count == 0 {
            return None;
        }
        match self.direction {
            Direction::Forward => Some(self.step_count - 1),
            Direction::Backward => Some(0),
        }
    }

    /// Step after `from` in playback order. With nothing selected yet that is
    /// the first step.
    pub fn next_index(&self, from: Option<usize>) -> Option<usize> {
        let Some(from) = from.filter(|i| *i < self.step_count) else {
            return self.first_index();
        };
        match self.direction {
            Direction::Forward => Some(wrap_forward(from, self.step_count)),
            Direction::Backward => Some(wrap_backward(from, self.step_count)),
        }
    }

    pub fn previous_index(&self, from: Option<usize>) -> Option<usize> {
        let Some(from) = from.filter(|i| *i < self.step_count) else {
            return self.last_index();
        };
        match self.direction {
            Direction::Forward => Some(wrap_backward(from, self.step_count)),
            Direction::Backward => Some(wrap_forward(from, self.step_count)),
        }
    }
}

fn wrap_forward(from: usize, count: usize) -> usize {
    if from + 1 == count {
        0
    } else {
        from + 1
    }
}

fn wrap_backward(from: usize, count: usize) -> usize {
    if from == 0 {
        count - 1
    } else {
        from - 1
    }
}

pub fn resolve_play(state: RunState, layout: PlaybackLayout, playback_index: Option<usize>) -> Navigation {
    match (state, layout) {
        (RunState::Idle, _) => Navigation::Start(playback_index.unwrap_or(0)),
        (_, PlaybackLayout::PlayPauseStop) => Navigation::TogglePause { reannounce: true },
        (_, PlaybackLayout::PlayStopPause) => Navigation::Stop,
    }
}

pub fn resolve_stop(state: RunState, layout: PlaybackLayout) -> Navigation {
    match (state, layout) {
        (RunState::Idle, _) => Navigation::Nothing,
        (_, PlaybackLayout::PlayPauseStop) => Navigation::Stop,
        (_, PlaybackLayout::PlayStopPause) => Navigation::TogglePause { reannounce: false },
    }
}

pub fn resolve_next(
    state: RunState,
    policy: NavigationPolicy,
    shape: SequenceShape,
    playback_index: Option<usize>,
) -> Navigation {
    resolve_step(
        state,
        policy,
        StepAction::NextStep,
        shape.first_index(),
        shape.next_index(playback_index),
    )
}

pub fn resolve_previous(
    state: RunState,
    policy: NavigationPolicy,
    shape: SequenceShape,
    playback_index: Option<usize>,
) -> Navigation {
    resolve_step(
        state,
        policy,
        StepAction::PreviousStep,
        shape.last_index(),
        shape.previous_index(playback_index),
    )
}

fn resolve_step(
    state: RunState,
    policy: NavigationPolicy,
    relative: StepAction,
    edge: Option<usize>,
    neighbor: Option<usize>,
) -> Navigation {
    match state {
        RunState::Running => Navigation::Relative(relative),
        RunState::Paused => neighbor.map_or(Navigation::Nothing, Navigation::Relocate),
        RunState::Idle => {
            let target = match policy {
                NavigationPolicy::RunFirstOnIdle => edge.map(Navigation::Start),
                NavigationPolicy::RunNextOnIdle => neighbor.map(Navigation::Start),
                NavigationPolicy::SelectOnIdle => neighbor.map(Navigation::Relocate),
                NavigationPolicy::DoNothingOnIdle => None,
            };
            target.unwrap_or(Navigation::Nothing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(step_count: usize, direction: Direction) -> SequenceShape {
        SequenceShape {
            step_count,
            direction,
        }
    }

    #[test]
    fn test_run_first_on_idle() {
        let forward = shape(5, Direction::Forward);
        assert_eq!(
            resolve_next(RunState::Idle, NavigationPolicy::RunFirstOnIdle, forward, Some(2)),
            Navigation::Start(0)
        );
        assert_eq!(
            resolve_previous(RunState::Idle, NavigationPolicy::RunFirstOnIdle, forward, Some(2)),
            Navigation::Start(4)
        );

        let backward = shape(5, Direction::Backward);
        assert_eq!(
            resolve_next(RunState::Idle, NavigationPolicy::RunFirstOnIdle, backward, None),
            Navigation::Start(4)
        );
        assert_eq!(
            resolve_previous(RunState::Idle, NavigationPolicy::RunFirstOnIdle, backward, None),
            Navigation::Start(0)
        );
    }

    #[test]
    fn test_other_idle_policies() {
        let forward = shape(5, Direction::Forward);
        assert_eq!(
            resolve_next(RunState::Idle, NavigationPolicy::RunNextOnIdle, forward, Some(4)),
            Navigation::Start(0)
        );
        assert_eq!(
            resolve_previous(RunState::Idle, NavigationPolicy::RunNextOnIdle, forward, Some(0)),
            Navigation::Start(4)
        );
        assert_eq!(
            resolve_next(RunState::Idle, NavigationPolicy::SelectOnIdle, forward, Some(1)),
            Navigation::Relocate(2)
        );
        assert_eq!(
            resolve_next(RunState::Idle, NavigationPolicy::DoNothingOnIdle, forward, Some(1)),
            Navigation::Nothing
        );
    }

    #[test]
    fn test_running_and_paused() {
        let backward = shape(3, Direction::Backward);
        assert_eq!(
            resolve_next(RunState::Running, NavigationPolicy::DoNothingOnIdle, backward, Some(1)),
            Navigation::Relative(StepAction::NextStep)
        );
        assert_eq!(
            resolve_next(RunState::Paused, NavigationPolicy::RunFirstOnIdle, backward, Some(0)),
            Navigation::Relocate(2)
        );
        assert_eq!(
            resolve_previous(RunState::Paused, NavigationPolicy::RunFirstOnIdle, backward, Some(2)),
            Navigation::Relocate(0)
        );
    }

    #[test]
    fn test_neighbors_without_selection() {
        let forward = shape(3, Direction::Forward);
        assert_eq!(forward.next_index(None), Some(0));
        assert_eq!(forward.previous_index(None), Some(2));
        assert_eq!(forward.next_index(Some(7)), Some(0));

        let empty = shape(0, Direction::Forward);
        assert_eq!(empty.next_index(Some(0)), None);
        assert_eq!(
            resolve_next(RunState::Idle, NavigationPolicy::RunFirstOnIdle, empty, None),
            Navigation::Nothing
        );
    }

    #[test]
    fn test_play_and_stop_layouts() {
        assert_eq!(
            resolve_play(RunState::Idle, PlaybackLayout::PlayPauseStop, None),
            Navigation::Start(0)
        );
        assert_eq!(
            resolve_play(RunState::Idle, PlaybackLayout::PlayStopPause, Some(3)),
            Navigation::Start(3)
        );
        assert_eq!(
            resolve_play(RunState::Running, PlaybackLayout::PlayPauseStop, Some(3)),
            Navigation::TogglePause { reannounce: true }
        );
        assert_eq!(
            resolve_play(RunState::Paused, PlaybackLayout::PlayStopPause, Some(3)),
            Navigation::Stop
        );

        assert_eq!(
            resolve_stop(RunState::Running, PlaybackLayout::PlayPauseStop),
            Navigation::Stop
        );
        assert_eq!(
            resolve_stop(RunState::Paused, PlaybackLayout::PlayStopPause),
            Navigation::TogglePause { reannounce: false }
        );
        assert_eq!(
            resolve_stop(RunState::Idle, PlaybackLayout::PlayPauseStop),
            Navigation::Nothing
        );
    }
}
