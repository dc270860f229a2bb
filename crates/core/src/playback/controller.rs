use std::sync::Arc;
use std::time::{Duration, Instant};

use super::crossfade::{steps_target, AutoStop, Crossfade};
use super::navigation::{self, Navigation, RunState, SequenceShape};
use super::progress::ProgressReporter;
use crate::messages::{
    CueListEvent, CueListSettings, CurrentState, FaderMode, InputId, MidiStepSettings,
    NavigationPolicy, PlaybackLayout, PlaybackStatus, ProgressInfo,
};
use crate::midi::decoder::MidiStepDecoder;
use crate::midi::rate_limiter::StepRateLimiter;
use crate::sequence::{
    FadeControlMode, SequenceEngine, SequenceId, SequenceNotification, SequenceRegistry,
    StepAction, StepChangeAction,
};
use crate::timer::{Scheduler, TimerKind};

/// Minimum spacing between two writes of the cached playback index.
pub const MIN_INDEX_CHANGE_INTERVAL: Duration = Duration::from_millis(20);

/// Playback controller for one cue list.
///
/// Owns the navigation, crossfade and MIDI step-selection state for at most
/// one attached sequence. The sequence itself belongs to the registry and is
/// looked up again on every access, so it may disappear at any time.
///
/// All methods must be called from a single task. Time is always passed in
/// explicitly; deferred work runs when [`CueListController::advance`] is
/// called past its deadline.
pub struct CueListController {
    registry: Arc<dyn SequenceRegistry>,
    sequence: Option<SequenceId>,

    navigation_policy: NavigationPolicy,
    playback_layout: PlaybackLayout,
    crossfade: Crossfade,
    intensity: f64,

    playback_index: Option<usize>,
    next_step_index: Option<usize>,
    last_index_change: Option<Instant>,

    decoder: MidiStepDecoder,
    limiter: StepRateLimiter,
    progress: ProgressReporter,
    scheduler: Scheduler,

    events: Vec<CueListEvent>,
}

impl CueListController {
    pub fn new(registry: Arc<dyn SequenceRegistry>) -> Self {
        Self {
            registry,
            sequence: None,
            navigation_policy: NavigationPolicy::default(),
            playback_layout: PlaybackLayout::default(),
            crossfade: Crossfade::default(),
            intensity: 1.0,
            playback_index: None,
            next_step_index: None,
            last_index_change: None,
            decoder: MidiStepDecoder::new(),
            limiter: StepRateLimiter::new(),
            progress: ProgressReporter::new(),
            scheduler: Scheduler::new(),
            events: Vec::new(),
        }
    }

    pub fn with_settings(registry: Arc<dyn SequenceRegistry>, settings: &CueListSettings, now: Instant) -> Self {
        let mut controller = Self::new(registry);
        controller.apply_settings(settings, now);
        controller
    }

    // ---------------------------------------------------------------------
    // State accessors
    // ---------------------------------------------------------------------

    pub fn sequence_id(&self) -> Option<SequenceId> {
        self.sequence
    }

    pub fn playback_index(&self) -> Option<usize> {
        self.playback_index
    }

    pub fn next_step_index(&self) -> Option<usize> {
        self.next_step_index
    }

    pub fn primary_top(&self) -> bool {
        self.crossfade.primary_top()
    }

    pub fn fader_mode(&self) -> FaderMode {
        self.crossfade.mode()
    }

    pub fn fader_level(&self) -> u8 {
        self.crossfade.level()
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn navigation_policy(&self) -> NavigationPolicy {
        self.navigation_policy
    }

    pub fn playback_layout(&self) -> PlaybackLayout {
        self.playback_layout
    }

    pub fn progress(&self) -> &ProgressInfo {
        self.progress.current()
    }

    pub fn primary_intensity(&self) -> f64 {
        self.crossfade.primary_intensity()
    }

    pub fn fade_mode(&self) -> FadeControlMode {
        self.crossfade.fade_mode()
    }

    pub fn midi_step_settings(&self) -> MidiStepSettings {
        MidiStepSettings {
            enabled: self.decoder.is_enabled(),
            two_note_mode: self.decoder.two_note_mode(),
            timeout_ms: self.decoder.timeout().as_millis() as u64,
            debounce_ms: self.limiter.interval().as_millis() as u64,
        }
    }

    pub fn awaiting_second_note(&self) -> bool {
        self.decoder.awaiting_second_note()
    }

    pub fn has_pending_step_change(&self) -> bool {
        self.limiter.has_pending()
    }

    pub fn settings(&self) -> CueListSettings {
        CueListSettings {
            sequence: self.sequence,
            navigation_policy: self.navigation_policy,
            playback_layout: self.playback_layout,
            fader_mode: self.crossfade.mode(),
            midi_step: self.midi_step_settings(),
        }
    }

    pub fn playback_status(&self) -> PlaybackStatus {
        match self.engine() {
            None => PlaybackStatus::Stopped,
            Some(engine) if engine.is_paused() => PlaybackStatus::Paused,
            Some(engine) if engine.is_running() => PlaybackStatus::Playing,
            Some(_) => PlaybackStatus::Stopped,
        }
    }

    pub fn current_state(&self) -> CurrentState {
        CurrentState {
            sequence: self.sequence,
            playback_status: self.playback_status(),
            playback_index: self.playback_index,
            next_step_index: self.next_step_index,
            primary_top: self.crossfade.primary_top(),
            fader_mode: self.crossfade.mode(),
            fader_level: self.crossfade.level(),
            intensity: self.intensity,
            progress: self.progress.current().clone(),
            settings: self.settings(),
        }
    }

    /// Publish a full snapshot as a [`CueListEvent::CurrentState`].
    pub fn query_state(&mut self) {
        let state = Box::new(self.current_state());
        self.emit(CueListEvent::CurrentState { state });
    }

    /// Earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Drain the events produced since the last call.
    pub fn take_events(&mut self) -> Vec<CueListEvent> {
        std::mem::take(&mut self.events)
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    pub fn apply_settings(&mut self, settings: &CueListSettings, now: Instant) {
        self.set_navigation_policy(settings.navigation_policy);
        self.set_playback_layout(settings.playback_layout);
        self.set_midi_timeout(settings.midi_step.timeout_ms);
        self.set_midi_debounce(settings.midi_step.debounce_ms);
        self.set_midi_two_note_mode(settings.midi_step.two_note_mode, now);
        self.set_midi_step_selection_enabled(settings.midi_step.enabled, now);
        self.attach_sequence(settings.sequence, now);
        self.set_fader_mode(settings.fader_mode);
    }

    pub fn set_navigation_policy(&mut self, policy: NavigationPolicy) {
        if self.navigation_policy == policy {
            return;
        }
        self.navigation_policy = policy;
        self.emit(CueListEvent::NavigationPolicyChanged { policy });
    }

    pub fn set_playback_layout(&mut self, layout: PlaybackLayout) {
        if self.playback_layout == layout {
            return;
        }
        self.playback_layout = layout;
        self.emit(CueListEvent::PlaybackLayoutChanged { layout });
    }

    /// Switching to steps mode moves the fader to 255, crossfade mode to 100.
    pub fn set_fader_mode(&mut self, mode: FaderMode) {
        if self.crossfade.mode() == mode {
            return;
        }
        let reset_level = self.crossfade.set_mode(mode);
        self.emit(CueListEvent::FaderModeChanged { mode });

        if let Some(level) = reset_level {
            self.set_fader_level(level);
        }
    }

    pub fn set_midi_step_selection_enabled(&mut self, enabled: bool, now: Instant) {
        if !self.decoder.set_enabled(enabled, &mut self.scheduler) {
            return;
        }
        self.limiter.reset(now, &mut self.scheduler);
        log::info!(
            "MIDI step selection {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.emit_midi_settings();
    }

    pub fn set_midi_two_note_mode(&mut self, enabled: bool, now: Instant) {
        if !self.decoder.set_two_note_mode(enabled, &mut self.scheduler) {
            return;
        }
        self.limiter.reset(now, &mut self.scheduler);
        self.emit_midi_settings();
    }

    pub fn set_midi_timeout(&mut self, timeout_ms: u64) {
        let before = self.decoder.timeout();
        self.decoder.set_timeout_ms(timeout_ms);
        if self.decoder.timeout() != before {
            self.emit_midi_settings();
        }
    }

    pub fn set_midi_debounce(&mut self, debounce_ms: u64) {
        let before = self.limiter.interval();
        self.limiter.set_interval_ms(debounce_ms);
        if self.limiter.interval() != before {
            self.emit_midi_settings();
        }
    }

    fn emit_midi_settings(&mut self) {
        let settings = self.midi_step_settings();
        self.emit(CueListEvent::MidiStepSettingsChanged { settings });
    }

    // ---------------------------------------------------------------------
    // Sequence attachment
    // ---------------------------------------------------------------------

    /// Attach another sequence, or detach with `None`. A running sequence is
    /// stopped and the newly attached one started in its place.
    pub fn attach_sequence(&mut self, sequence: Option<SequenceId>, now: Instant) {
        if self.sequence == sequence {
            return;
        }

        let mut was_running = false;
        if let Some(current) = self.engine() {
            if current.is_running() {
                was_running = true;
                current.stop();
            }
        }
        self.reset_transient(now, was_running);

        let engine = sequence.and_then(|id| self.registry.sequence(id));
        if sequence.is_some() && engine.is_none() {
            log::warn!("Sequence {:?} not found, cue list detached", sequence);
        }
        self.sequence = engine.as_ref().and(sequence);
        log::info!("Cue list attached to sequence {:?}", self.sequence);
        self.emit(CueListEvent::SequenceAttached {
            sequence: self.sequence,
        });

        match engine {
            Some(engine) if was_running => self.start_sequence(engine.as_ref(), None),
            _ => self.emit(CueListEvent::PlaybackStatusChanged {
                status: self.playback_status(),
            }),
        }
    }

    /// Stop the attached sequence if it runs and detach from it.
    pub fn shutdown(&mut self, now: Instant) {
        if let Some(engine) = self.engine() {
            if engine.is_running() {
                engine.stop();
            }
        }
        self.reset_transient(now, false);
        self.sequence = None;
        log::info!("Cue list shut down");
    }

    fn engine(&self) -> Option<Arc<dyn SequenceEngine>> {
        self.sequence.and_then(|id| self.registry.sequence(id))
    }

    // Clears everything tied to the attached sequence. Pending step changes
    // must never reach a different or vanished sequence.
    fn reset_transient(&mut self, now: Instant, was_running: bool) {
        self.decoder.reset(&mut self.scheduler);
        self.limiter.reset(now, &mut self.scheduler);
        if self.progress.stop(&mut self.scheduler) {
            self.emit(CueListEvent::ProgressChanged {
                progress: ProgressInfo::default(),
            });
        }
        if was_running {
            self.emit(CueListEvent::Feedback {
                input: InputId::PlayPause,
                value: 0,
            });
        }
        self.last_index_change = None;
        if self.playback_index.take().is_some() {
            self.emit(CueListEvent::PlaybackIndexChanged { index: None });
        }
        if self.next_step_index.take().is_some() {
            self.emit(CueListEvent::NextStepIndexChanged { index: None });
        }
    }

    // ---------------------------------------------------------------------
    // External input
    // ---------------------------------------------------------------------

    /// Single dispatch point for routed external controls. Buttons act on
    /// the press only (value 255).
    pub fn handle_input(&mut self, input: InputId, value: u8, now: Instant) {
        if input.is_edge_triggered() && value != u8::MAX {
            return;
        }

        match input {
            InputId::NextStep => self.next(now),
            InputId::PreviousStep => self.previous(now),
            InputId::PlayPause => self.play(now),
            InputId::StopPause => self.stop(now),
            InputId::SideFader => {
                if self.crossfade.mode() == FaderMode::None {
                    return;
                }
                let level = self.crossfade.scale_input(value);
                self.set_fader_level(level);
            }
            InputId::MidiStepFirst => {
                if self.engine().is_none() {
                    return;
                }
                if let Some(index) = self.decoder.handle_first_note(value, now, &mut self.scheduler) {
                    self.queue_step_change(index, now);
                }
            }
            InputId::MidiStepSecond => {
                if self.engine().is_none() {
                    return;
                }
                if let Some(index) = self.decoder.handle_second_note(value, &mut self.scheduler) {
                    self.queue_step_change(index, now);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------------

    pub fn play(&mut self, now: Instant) {
        let Some(engine) = self.engine() else {
            return;
        };
        let state = run_state(engine.as_ref());
        let plan = navigation::resolve_play(state, self.playback_layout, self.playback_index);
        self.execute(engine.as_ref(), plan, now);
    }

    pub fn stop(&mut self, now: Instant) {
        let Some(engine) = self.engine() else {
            return;
        };
        let state = run_state(engine.as_ref());
        let plan = navigation::resolve_stop(state, self.playback_layout);
        self.execute(engine.as_ref(), plan, now);
    }

    pub fn next(&mut self, now: Instant) {
        let Some(engine) = self.engine() else {
            return;
        };
        let plan = navigation::resolve_next(
            run_state(engine.as_ref()),
            self.navigation_policy,
            shape(engine.as_ref()),
            self.playback_index,
        );
        self.execute(engine.as_ref(), plan, now);
    }

    pub fn previous(&mut self, now: Instant) {
        let Some(engine) = self.engine() else {
            return;
        };
        let plan = navigation::resolve_previous(
            run_state(engine.as_ref()),
            self.navigation_policy,
            shape(engine.as_ref()),
            self.playback_index,
        );
        self.execute(engine.as_ref(), plan, now);
    }

    /// Announce the cached step again while running, otherwise start there.
    pub fn play_current_step(&mut self, now: Instant) {
        let Some(engine) = self.engine() else {
            return;
        };
        if !engine.is_running() {
            let index = self.playback_index.unwrap_or(0);
            self.execute(engine.as_ref(), Navigation::Start(index), now);
        } else if let Some(index) = self.playback_index {
            engine.set_action(self.step_action(StepAction::SetStepIndex, Some(index)));
        }
    }

    /// Jump straight to a step, starting the sequence if needed.
    pub fn select_step(&mut self, index: usize, now: Instant) {
        let Some(engine) = self.engine() else {
            return;
        };
        let step_count = engine.step_count();
        if index >= step_count {
            log::warn!(
                "Invalid step index {} for sequence with {} steps",
                index,
                step_count
            );
            return;
        }

        if engine.is_running() {
            engine.set_action(self.step_action(StepAction::SetStepIndex, Some(index)));
        } else {
            self.start_sequence(engine.as_ref(), Some(index));
        }
        self.set_playback_index(Some(index), now);
    }

    fn execute(&mut self, engine: &dyn SequenceEngine, plan: Navigation, now: Instant) {
        log::debug!("Cue list navigation: {:?}", plan);
        match plan {
            Navigation::Relative(action) => {
                engine.set_action(self.step_action(action, None));
            }
            Navigation::Relocate(index) => self.set_playback_index(Some(index), now),
            Navigation::Start(index) => {
                if index >= engine.step_count() {
                    log::warn!("Cannot start at step {}: out of range", index);
                    return;
                }
                self.start_sequence(engine, Some(index));
            }
            Navigation::TogglePause { reannounce } => {
                if reannounce {
                    engine.set_action(self.step_action(StepAction::SetStepIndex, self.playback_index));
                }
                engine.set_pause(!engine.is_paused());
                self.emit(CueListEvent::PlaybackStatusChanged {
                    status: self.playback_status(),
                });
            }
            Navigation::Stop => {
                engine.stop();
                self.emit(CueListEvent::PlaybackStatusChanged {
                    status: self.playback_status(),
                });
            }
            Navigation::Nothing => {}
        }
    }

    fn step_action(&self, action: StepAction, step_index: Option<usize>) -> StepChangeAction {
        StepChangeAction {
            action,
            step_index,
            master_intensity: self.intensity,
            step_intensity: self.crossfade.primary_intensity(),
            fade_mode: self.crossfade.fade_mode(),
        }
    }

    fn start_sequence(&mut self, engine: &dyn SequenceEngine, index: Option<usize>) {
        engine.adjust_intensity(self.intensity);
        if let Some(index) = index {
            engine.set_action(self.step_action(StepAction::SetStepIndex, Some(index)));
        }
        engine.start();
        self.emit(CueListEvent::PlaybackStatusChanged {
            status: self.playback_status(),
        });
    }

    // ---------------------------------------------------------------------
    // Side fader and intensity
    // ---------------------------------------------------------------------

    pub fn set_fader_level(&mut self, level: u8) {
        if !self.crossfade.set_level(level) {
            return;
        }
        let level = self.crossfade.level();
        self.emit(CueListEvent::FaderLevelChanged { level });

        if let Some(engine) = self.engine().filter(|engine| engine.is_running()) {
            match self.crossfade.mode() {
                FaderMode::Steps => {
                    let Some(target) = steps_target(level, engine.step_count()) else {
                        return;
                    };
                    if Some(target) == engine.current_step_index() {
                        return;
                    }
                    engine.set_action(self.step_action(StepAction::SetStepIndex, Some(target)));
                }
                FaderMode::Crossfade => {
                    self.crossfade
                        .apply_blend(engine.as_ref(), self.playback_index, self.next_step_index);
                    let stop = self.crossfade.stop_step_if_needed(
                        engine.as_ref(),
                        self.playback_index,
                        self.next_step_index,
                    );
                    if let Some(AutoStop::Primary { .. }) = stop {
                        self.emit(CueListEvent::PrimaryTopChanged {
                            top: self.crossfade.primary_top(),
                        });
                    }
                }
                FaderMode::None => {}
            }
        }

        self.emit(CueListEvent::Feedback {
            input: InputId::SideFader,
            value: self.crossfade.feedback_value(),
        });
    }

    /// Master intensity, clamped to 0.0 - 1.0.
    pub fn set_intensity(&mut self, intensity: f64) {
        self.intensity = intensity.clamp(0.0, 1.0);
        let Some(engine) = self.engine() else {
            return;
        };
        engine.adjust_intensity(self.intensity);

        if engine.is_running()
            && self.crossfade.mode() == FaderMode::Crossfade
            && self.crossfade.level() != 100
        {
            self.crossfade
                .apply_blend(engine.as_ref(), self.playback_index, self.next_step_index);
        }
    }

    // ---------------------------------------------------------------------
    // MIDI step selection
    // ---------------------------------------------------------------------

    fn valid_step(&self, index: usize) -> Option<Arc<dyn SequenceEngine>> {
        let engine = self.engine()?;
        let step_count = engine.step_count();
        if index >= step_count {
            log::warn!(
                "MIDI step selection: step {} out of range for {} steps",
                index + 1,
                step_count
            );
            return None;
        }
        Some(engine)
    }

    fn queue_step_change(&mut self, index: usize, now: Instant) {
        if !self.decoder.is_enabled() || self.valid_step(index).is_none() {
            return;
        }
        if let Some(index) = self.limiter.submit(index, now, &mut self.scheduler) {
            self.execute_step_change(index, now);
        }
    }

    fn execute_step_change(&mut self, index: usize, now: Instant) {
        if !self.decoder.is_enabled() {
            return;
        }
        // The sequence may have changed since the change was queued
        let Some(engine) = self.valid_step(index) else {
            return;
        };

        if engine.is_running() {
            let action = self
                .step_action(StepAction::SetStepIndex, Some(index))
                .with_fade_mode(FadeControlMode::FromFunction);
            engine.set_action(action);
        } else {
            self.start_sequence(engine.as_ref(), Some(index));
        }
        log::debug!("MIDI step selection: step {} dispatched", index + 1);
        self.limiter.mark_dispatched(now);
    }

    // ---------------------------------------------------------------------
    // Engine notifications and timers
    // ---------------------------------------------------------------------

    pub fn handle_notification(&mut self, notification: SequenceNotification, now: Instant) {
        if Some(notification.sequence_id()) != self.sequence {
            return;
        }

        match notification {
            SequenceNotification::Running(_) => {
                self.emit(CueListEvent::PlaybackStatusChanged {
                    status: self.playback_status(),
                });
                self.emit(CueListEvent::Feedback {
                    input: InputId::PlayPause,
                    value: u8::MAX,
                });
                self.progress.start(now, &mut self.scheduler);
            }
            SequenceNotification::Stopped(_) => {
                self.emit(CueListEvent::PlaybackStatusChanged {
                    status: self.playback_status(),
                });
                self.set_playback_index(None, now);
                self.emit(CueListEvent::Feedback {
                    input: InputId::PlayPause,
                    value: 0,
                });
                if self.progress.stop(&mut self.scheduler) {
                    self.emit(CueListEvent::ProgressChanged {
                        progress: ProgressInfo::default(),
                    });
                }
            }
            SequenceNotification::CurrentStepChanged { step, .. } => {
                self.set_playback_index(Some(step), now);
            }
            SequenceNotification::Removed(id) => {
                log::info!("Sequence {} removed, cue list detached", id);
                self.reset_transient(now, false);
                self.sequence = None;
                self.emit(CueListEvent::SequenceAttached { sequence: None });
                self.emit(CueListEvent::PlaybackStatusChanged {
                    status: PlaybackStatus::Stopped,
                });
            }
        }
    }

    /// Run every timer due at `now`. Each one acts at its own deadline.
    pub fn advance(&mut self, now: Instant) {
        while let Some(due) = self.scheduler.pop_due(now) {
            match due.kind {
                TimerKind::TwoNoteTimeout => {
                    if let Some(index) = self.decoder.handle_timeout(due.token) {
                        self.queue_step_change(index, due.deadline);
                    }
                }
                TimerKind::Debounce => {
                    if let Some(index) = self.limiter.fire(due.token) {
                        self.execute_step_change(index, due.deadline);
                    }
                }
                TimerKind::Progress => {
                    let engine = self.engine();
                    let progress = self.progress.on_tick(
                        due.token,
                        due.deadline,
                        now,
                        engine.as_deref(),
                        &mut self.scheduler,
                    );
                    if let Some(progress) = progress {
                        self.emit(CueListEvent::ProgressChanged { progress });
                    }
                }
            }
        }
    }

    // Writes are throttled to keep bursts of engine notifications from
    // flooding the display. Clearing the index is never throttled.
    fn set_playback_index(&mut self, index: Option<usize>, now: Instant) {
        if index.is_some() {
            if let Some(last) = self.last_index_change {
                if now.saturating_duration_since(last) < MIN_INDEX_CHANGE_INTERVAL {
                    log::debug!("Playback index change to {:?} throttled", index);
                    return;
                }
            }
            self.last_index_change = Some(now);
        }

        let Some(engine) = self.engine() else {
            return;
        };
        if let Some(step) = index.filter(|step| *step >= engine.step_count()) {
            log::warn!(
                "Ignoring playback index {} for sequence with {} steps",
                step,
                engine.step_count()
            );
            return;
        }

        if self.playback_index == index {
            return;
        }
        self.playback_index = index;
        self.emit(CueListEvent::PlaybackIndexChanged { index });

        let next = index.and_then(|step| engine.compute_next_step(step));
        if self.next_step_index != next {
            self.next_step_index = next;
            self.emit(CueListEvent::NextStepIndexChanged { index: next });
        }
    }

    fn emit(&mut self, event: CueListEvent) {
        self.events.push(event);
    }
}

impl Drop for CueListController {
    fn drop(&mut self) {
        if let Some(engine) = self.engine() {
            if engine.is_running() {
                log::debug!("Cue list dropped, stopping sequence {:?}", self.sequence);
                engine.stop();
            }
        }
    }
}

fn run_state(engine: &dyn SequenceEngine) -> RunState {
    RunState::new(engine.is_running(), engine.is_paused())
}

fn shape(engine: &dyn SequenceEngine) -> SequenceShape {
    SequenceShape {
        step_count: engine.step_count(),
        direction: engine.direction(),
    }
}
