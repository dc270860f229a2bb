use std::sync::Arc;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use cuelist_core::{
    notification_channel, CueListController, CueListEvent, CueListSettings, FaderMode, InputId,
    InputMapping, MemoryRegistry, MemorySequence, MidiMessage, MidiStepSettings, NavigationPolicy,
    NotificationReceiver, PlaybackStatus, ProgressStatus, SequenceEngine, Step,
};

const SEQUENCE: u32 = 1;

struct Rig {
    registry: Arc<MemoryRegistry>,
    sequence: Arc<MemorySequence>,
    notifications: NotificationReceiver,
    controller: CueListController,
}

impl Rig {
    fn new(steps: Vec<Step>, midi_step: MidiStepSettings, t0: Instant) -> Self {
        let (notifier, notifications) = notification_channel();
        let registry = Arc::new(MemoryRegistry::new(Some(notifier.clone())));
        let sequence = registry.insert(MemorySequence::new(SEQUENCE, "Main", steps).with_notifier(notifier));
        sequence.tick(t0);

        let settings = CueListSettings {
            sequence: Some(SEQUENCE),
            midi_step,
            ..Default::default()
        };
        let controller = CueListController::with_settings(registry.clone(), &settings, t0);

        Self {
            registry,
            sequence,
            notifications,
            controller,
        }
    }

    fn manual(step_count: usize, midi_step: MidiStepSettings, t0: Instant) -> Self {
        let steps = (0..step_count)
            .map(|i| Step::manual(format!("Cue {}", i + 1), Duration::from_millis(500)))
            .collect();
        Self::new(steps, midi_step, t0)
    }

    /// Deliver queued engine notifications, then run due timers.
    fn settle(&mut self, now: Instant) {
        while let Ok(notification) = self.notifications.try_recv() {
            self.controller.handle_notification(notification, now);
        }
        self.controller.advance(now);
        while let Ok(notification) = self.notifications.try_recv() {
            self.controller.handle_notification(notification, now);
        }
    }

    fn midi(&mut self, input: InputId, velocity: u8, now: Instant) {
        self.controller.handle_input(input, velocity, now);
        self.settle(now);
    }

    /// Feed raw MIDI bytes through the default note bindings.
    fn midi_bytes(&mut self, bytes: &[u8], now: Instant) {
        let message = MidiMessage::parse(bytes).unwrap();
        if let Some((input, value)) = InputMapping::default().translate(&message) {
            self.midi(input, value, now);
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn midi_enabled(two_note_mode: bool) -> MidiStepSettings {
    MidiStepSettings {
        enabled: true,
        two_note_mode,
        ..Default::default()
    }
}

#[test]
fn two_note_pair_selects_high_step() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(300, midi_enabled(true), t0);

    rig.midi(InputId::MidiStepFirst, 2, t0);
    assert!(!rig.sequence.is_running());

    rig.midi(InputId::MidiStepSecond, 3, t0 + ms(100));
    assert!(rig.sequence.is_running());
    assert_eq!(rig.sequence.current_step_index(), Some(258));
    assert_eq!(rig.controller.playback_index(), Some(258));
    assert_eq!(rig.controller.next_step_index(), Some(259));

    // Nothing left to fire: the timeout was cancelled by the second note
    rig.settle(t0 + ms(1000));
    assert_eq!(rig.sequence.current_step_index(), Some(258));
}

#[test]
fn two_note_pair_from_raw_bytes_accepts_zero_first_velocity() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(16, midi_enabled(true), t0);

    rig.midi_bytes(&[0x90, InputMapping::STEP_FIRST, 0], t0);
    assert!(rig.controller.awaiting_second_note());

    // A real Note Off on the step note is not a value
    rig.midi_bytes(&[0x80, InputMapping::STEP_FIRST, 0], t0 + ms(10));
    assert!(rig.controller.awaiting_second_note());

    rig.midi_bytes(&[0x90, InputMapping::STEP_SECOND, 5], t0 + ms(100));
    assert!(rig.sequence.is_running());
    assert_eq!(rig.sequence.current_step_index(), Some(4));
    assert_eq!(rig.controller.playback_index(), Some(4));
}

#[test]
fn two_note_timeout_uses_first_value() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(16, midi_enabled(true), t0);

    rig.midi(InputId::MidiStepFirst, 7, t0 + ms(50));
    rig.settle(t0 + ms(549));
    assert!(!rig.sequence.is_running());

    rig.settle(t0 + ms(550));
    assert_eq!(rig.sequence.current_step_index(), Some(6));
}

#[test]
fn repeated_note_burst_dispatches_once() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(8, midi_enabled(false), t0);

    for offset in [0, 15, 30] {
        rig.midi(InputId::MidiStepFirst, 1, t0 + ms(offset));
    }
    rig.settle(t0 + ms(99));
    assert!(!rig.sequence.is_running());

    rig.settle(t0 + ms(100));
    assert!(rig.sequence.is_running());
    assert_eq!(rig.sequence.current_step_index(), Some(0));
    assert!(!rig.controller.has_pending_step_change());

    rig.settle(t0 + ms(1000));
    assert_eq!(rig.controller.playback_index(), Some(0));
}

#[test]
fn burst_while_running_keeps_last_value() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(8, midi_enabled(false), t0);

    rig.midi(InputId::MidiStepFirst, 2, t0 + ms(200));
    assert_eq!(rig.sequence.current_step_index(), Some(1));

    for (offset, velocity) in [(210, 4), (230, 5), (260, 6)] {
        rig.midi(InputId::MidiStepFirst, velocity, t0 + ms(offset));
    }
    assert_eq!(rig.sequence.current_step_index(), Some(1));

    rig.settle(t0 + ms(300));
    assert_eq!(rig.sequence.current_step_index(), Some(5));
    assert_eq!(rig.controller.playback_index(), Some(5));
}

#[test]
fn reserved_velocity_is_ignored() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(8, midi_enabled(false), t0);

    rig.midi(InputId::MidiStepFirst, 0, t0 + ms(200));
    rig.settle(t0 + ms(1000));
    assert!(!rig.sequence.is_running());
}

#[test]
fn run_first_on_idle_navigation() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(5, MidiStepSettings::default(), t0);
    assert_eq!(rig.controller.navigation_policy(), NavigationPolicy::RunFirstOnIdle);

    rig.controller.next(t0);
    rig.settle(t0);
    assert_eq!(rig.sequence.current_step_index(), Some(0));
    assert_eq!(rig.controller.playback_status(), PlaybackStatus::Playing);

    rig.controller.next(t0 + ms(50));
    rig.settle(t0 + ms(50));
    assert_eq!(rig.controller.playback_index(), Some(1));

    rig.controller.stop(t0 + ms(100));
    rig.settle(t0 + ms(100));
    assert!(!rig.sequence.is_running());
    assert_eq!(rig.controller.playback_index(), None);

    rig.controller.previous(t0 + ms(150));
    rig.settle(t0 + ms(150));
    assert_eq!(rig.sequence.current_step_index(), Some(4));

    rig.controller.set_intensity(0.25);
    assert_relative_eq!(rig.sequence.master_intensity(), 0.25);
}

#[test]
fn crossfade_sweeps_chain_through_steps() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(4, MidiStepSettings::default(), t0);
    rig.controller.set_fader_mode(FaderMode::Crossfade);
    rig.controller.next(t0);
    rig.settle(t0);
    assert_eq!(rig.controller.next_step_index(), Some(1));

    rig.controller.set_fader_level(50);
    assert_eq!(rig.sequence.running_steps(), 2);
    assert_relative_eq!(rig.sequence.step_intensity(0).unwrap(), 0.5);
    assert_relative_eq!(rig.sequence.step_intensity(1).unwrap(), 0.5);

    rig.controller.set_fader_level(0);
    rig.settle(t0 + ms(100));
    assert!(!rig.controller.primary_top());
    assert_eq!(rig.sequence.running_step_indices(), vec![1]);
    assert_eq!(rig.controller.playback_index(), Some(1));
    assert_eq!(rig.controller.next_step_index(), Some(2));

    // The flipped fader now brings the next step in on the way back up
    rig.controller.set_fader_level(50);
    assert_relative_eq!(rig.sequence.step_intensity(2).unwrap(), 0.5);

    rig.controller.set_fader_level(100);
    rig.settle(t0 + ms(200));
    assert!(rig.controller.primary_top());
    assert_eq!(rig.sequence.running_step_indices(), vec![2]);
    assert_eq!(rig.controller.playback_index(), Some(2));

    let events = rig.controller.take_events();
    assert!(events.contains(&CueListEvent::PrimaryTopChanged { top: false }));
    assert!(events.contains(&CueListEvent::PrimaryTopChanged { top: true }));
}

#[test]
fn steps_mode_fader_picks_step() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(4, MidiStepSettings::default(), t0);
    rig.controller.set_fader_mode(FaderMode::Steps);
    assert_eq!(rig.controller.fader_level(), 255);

    rig.controller.play(t0);
    rig.settle(t0);

    rig.controller.handle_input(InputId::SideFader, 0, t0 + ms(50));
    assert_eq!(rig.sequence.current_step_index(), Some(3));

    rig.controller.handle_input(InputId::SideFader, 130, t0 + ms(100));
    assert_eq!(rig.sequence.current_step_index(), Some(1));
}

#[test]
fn progress_follows_running_step() {
    let t0 = Instant::now();
    let steps = vec![
        Step::new("Fade", ms(1000), ms(3000)),
        Step::new("Hold", ms(0), ms(3000)),
    ];
    let mut rig = Rig::new(steps, MidiStepSettings::default(), t0);

    rig.controller.play(t0);
    rig.settle(t0);
    assert_eq!(rig.controller.next_deadline(), Some(t0 + ms(200)));

    rig.sequence.tick(t0 + ms(200));
    rig.settle(t0 + ms(200));
    let progress = rig.controller.progress().clone();
    assert_eq!(progress.status, ProgressStatus::FadeIn);
    assert_relative_eq!(progress.value, 0.05);
    assert!(progress.text.starts_with('-'));

    rig.sequence.tick(t0 + ms(2000));
    rig.settle(t0 + ms(2000));
    assert_eq!(rig.controller.progress().status, ProgressStatus::Hold);

    rig.controller.stop(t0 + ms(2100));
    rig.settle(t0 + ms(2100));
    assert_eq!(rig.controller.progress().status, ProgressStatus::Idle);
    assert_eq!(rig.controller.next_deadline(), None);
}

#[test]
fn removed_sequence_detaches_controller() {
    let t0 = Instant::now();
    let mut rig = Rig::manual(8, midi_enabled(false), t0);

    rig.midi(InputId::MidiStepFirst, 3, t0 + ms(10));
    assert!(rig.controller.has_pending_step_change());

    rig.registry.remove(SEQUENCE);
    rig.settle(t0 + ms(20));
    assert_eq!(rig.controller.sequence_id(), None);
    assert!(!rig.controller.has_pending_step_change());

    rig.settle(t0 + ms(500));
    assert!(!rig.sequence.is_running());
    rig.controller.play(t0 + ms(600));
    assert_eq!(rig.controller.playback_status(), PlaybackStatus::Stopped);
}
