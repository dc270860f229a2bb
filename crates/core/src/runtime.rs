//! Async shell around [`CueListController`]: one task owns the controller and
//! feeds it commands, engine notifications and timer deadlines.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::messages::{CueListCommand, CueListEvent};
use crate::playback::CueListController;
use crate::sequence::NotificationReceiver;

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Apply one command to the controller. Returns false for `Shutdown`.
pub fn process_command(controller: &mut CueListController, command: CueListCommand, now: Instant) -> bool {
    match command {
        CueListCommand::Shutdown => return false,
        CueListCommand::Input { input, value } => controller.handle_input(input, value, now),
        CueListCommand::Next => controller.next(now),
        CueListCommand::Previous => controller.previous(now),
        CueListCommand::Play => controller.play(now),
        CueListCommand::Stop => controller.stop(now),
        CueListCommand::PlayCurrentStep => controller.play_current_step(now),
        CueListCommand::SelectStep { index } => controller.select_step(index, now),
        CueListCommand::SetFaderLevel { level } => controller.set_fader_level(level),
        CueListCommand::SetIntensity { intensity } => controller.set_intensity(intensity),
        CueListCommand::AttachSequence { sequence } => controller.attach_sequence(sequence, now),
        CueListCommand::SetNavigationPolicy { policy } => controller.set_navigation_policy(policy),
        CueListCommand::SetPlaybackLayout { layout } => controller.set_playback_layout(layout),
        CueListCommand::SetFaderMode { mode } => controller.set_fader_mode(mode),
        CueListCommand::SetMidiStepSelection { enabled } => {
            controller.set_midi_step_selection_enabled(enabled, now)
        }
        CueListCommand::SetMidiTwoNoteMode { enabled } => controller.set_midi_two_note_mode(enabled, now),
        CueListCommand::SetMidiTimeout { timeout_ms } => controller.set_midi_timeout(timeout_ms),
        CueListCommand::SetMidiDebounce { debounce_ms } => controller.set_midi_debounce(debounce_ms),
        CueListCommand::ApplySettings { settings } => controller.apply_settings(&settings, now),
        CueListCommand::QueryState => controller.query_state(),
    }
    true
}

fn forward_events(controller: &mut CueListController, event_tx: &mpsc::UnboundedSender<CueListEvent>) {
    for event in controller.take_events() {
        if event_tx.send(event).is_err() {
            log::debug!("No listener for cue list events");
            return;
        }
    }
}

/// Run the controller until a `Shutdown` command arrives or the command
/// channel closes. The attached sequence is stopped on the way out.
pub async fn run_with_channels(
    mut controller: CueListController,
    mut command_rx: mpsc::UnboundedReceiver<CueListCommand>,
    mut notification_rx: NotificationReceiver,
    event_tx: mpsc::UnboundedSender<CueListEvent>,
) -> Result<(), anyhow::Error> {
    log::info!("Cue list task starting...");

    loop {
        let deadline = controller.next_deadline();

        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    log::info!("Command channel closed");
                    break;
                };
                log::debug!("Received command: {:?}", command);
                if !process_command(&mut controller, command, now()) {
                    log::info!("Received shutdown command");
                    break;
                }
            }

            Some(notification) = notification_rx.recv() => {
                log::trace!("Sequence notification: {:?}", notification);
                controller.handle_notification(notification, now());
            }

            _ = wait_until(deadline) => {
                controller.advance(now());
            }
        }

        forward_events(&mut controller, &event_tx);
    }

    controller.shutdown(now());
    forward_events(&mut controller, &event_tx);
    let _ = event_tx.send(CueListEvent::ShutdownComplete);

    log::info!("Cue list task completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::messages::{InputId, PlaybackStatus};
    use crate::sequence::{notification_channel, MemoryRegistry, MemorySequence, SequenceEngine, Step};

    struct Harness {
        sequence: Arc<MemorySequence>,
        command_tx: mpsc::UnboundedSender<CueListCommand>,
        event_rx: mpsc::UnboundedReceiver<CueListEvent>,
        handle: tokio::task::JoinHandle<Result<(), anyhow::Error>>,
    }

    fn spawn(step_count: usize) -> Harness {
        let (notifier, notification_rx) = notification_channel();
        let registry = Arc::new(MemoryRegistry::new(Some(notifier.clone())));
        let steps = (0..step_count)
            .map(|i| Step::manual(format!("Step {}", i + 1), Duration::from_millis(500)))
            .collect();
        let sequence = registry.insert(MemorySequence::new(1, "Main", steps).with_notifier(notifier));

        let mut controller = CueListController::new(registry);
        controller.attach_sequence(Some(1), now());

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_with_channels(controller, command_rx, notification_rx, event_tx));

        Harness {
            sequence,
            command_tx,
            event_rx,
            handle,
        }
    }

    fn drain(event_rx: &mut mpsc::UnboundedReceiver<CueListEvent>) -> Vec<CueListEvent> {
        let mut events = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_follows_engine_notifications() {
        let mut harness = spawn(4);
        harness.command_tx.send(CueListCommand::Play).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(harness.sequence.is_running());
        let events = drain(&mut harness.event_rx);
        assert!(events.contains(&CueListEvent::PlaybackStatusChanged {
            status: PlaybackStatus::Playing
        }));
        assert!(events.contains(&CueListEvent::PlaybackIndexChanged { index: Some(0) }));
        assert!(events.contains(&CueListEvent::NextStepIndexChanged { index: Some(1) }));

        harness.command_tx.send(CueListCommand::QueryState).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = drain(&mut harness.event_rx)
            .into_iter()
            .find_map(|event| match event {
                CueListEvent::CurrentState { state } => Some(state),
                _ => None,
            })
            .unwrap();
        assert_eq!(state.playback_index, Some(0));
        assert_eq!(state.playback_status, PlaybackStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_midi_burst_dispatched_after_debounce() {
        let mut harness = spawn(8);
        harness
            .command_tx
            .send(CueListCommand::SetMidiStepSelection { enabled: true })
            .unwrap();
        for value in [1, 2, 3] {
            harness
                .command_tx
                .send(CueListCommand::Input {
                    input: InputId::MidiStepFirst,
                    value,
                })
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!harness.sequence.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.sequence.is_running());
        assert_eq!(harness.sequence.current_step_index(), Some(2));
        assert!(drain(&mut harness.event_rx).contains(&CueListEvent::PlaybackIndexChanged { index: Some(2) }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sequence() {
        let mut harness = spawn(4);
        harness.command_tx.send(CueListCommand::Play).unwrap();
        harness.command_tx.send(CueListCommand::Shutdown).unwrap();

        harness.handle.await.unwrap().unwrap();
        assert!(!harness.sequence.is_running());
        let events = drain(&mut harness.event_rx);
        assert_eq!(events.last(), Some(&CueListEvent::ShutdownComplete));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_command_channel_ends_task() {
        let harness = spawn(2);
        drop(harness.command_tx);
        harness.handle.await.unwrap().unwrap();
    }
}
