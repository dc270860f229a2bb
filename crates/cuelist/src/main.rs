use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use cuelist_core::{
    notification_channel, run_with_channels, ConfigManager, CueListCommand, CueListController,
    CueListEvent, EngineClockModule, InputMapping, MemoryRegistry, MemorySequence, MidiModule,
    ModuleEvent, ModuleId, ModuleManager, ModuleMessage, Step,
};
use tokio::sync::mpsc;

/// Cue list playback controller for live shows: console buttons, a side
/// fader and MIDI step selection drive a looping sequence.
#[derive(Parser, Debug)]
#[command(name = "cuelist")]
#[command(about = "Cue list playback controller")]
struct Args {
    /// Path to the configuration file (default: config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MIDI device name, matched as a substring of the port name. Overrides
    /// the configured device.
    #[arg(long)]
    midi_device: Option<String>,

    /// Number of steps in the demo sequence
    #[arg(long, default_value = "8")]
    steps: usize,

    /// Hold time of each demo step in milliseconds. Without it every step
    /// waits for the operator.
    #[arg(long)]
    step_hold_ms: Option<u64>,

    /// Run without MIDI even if the configuration enables it
    #[arg(long, default_value = "false")]
    no_midi: bool,
}

const DEMO_SEQUENCE: u32 = 1;
const DEMO_FADE_IN: Duration = Duration::from_millis(1000);

fn demo_steps(count: usize, hold_ms: Option<u64>) -> Vec<Step> {
    (0..count)
        .map(|i| {
            let name = format!("Cue {}", i + 1);
            match hold_ms {
                Some(hold_ms) => Step::new(name, DEMO_FADE_IN, Duration::from_millis(hold_ms)),
                None => Step::manual(name, DEMO_FADE_IN),
            }
        })
        .collect()
}

fn log_event(event: &CueListEvent) {
    match event {
        CueListEvent::ProgressChanged { progress } => {
            log::debug!("Progress {:?} {:.2} {}", progress.status, progress.value, progress.text)
        }
        CueListEvent::Feedback { .. } => {}
        CueListEvent::CurrentState { state } => log::info!("State: {:?}", state),
        other => log::info!("{:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ConfigManager::new(args.config.clone());
    let mut settings = config.load()?;
    log::info!("Loaded configuration from {}", config.config_path().display());

    let (notifier, notification_rx) = notification_channel();
    let registry = Arc::new(MemoryRegistry::new(Some(notifier.clone())));
    let sequence_id = settings.cue_list.sequence.unwrap_or(DEMO_SEQUENCE);
    registry.insert(
        MemorySequence::new(
            sequence_id,
            "Demo",
            demo_steps(args.steps, args.step_hold_ms),
        )
        .with_notifier(notifier),
    );
    settings.cue_list.sequence = Some(sequence_id);

    let controller = CueListController::with_settings(registry.clone(), &settings.cue_list, Instant::now());

    // MIDI is optional; the cue list still runs from commands alone
    let midi_device = args.midi_device.clone().or_else(|| {
        (settings.midi.enabled && settings.midi.device != "None").then(|| settings.midi.device.clone())
    });
    let midi_device = midi_device.filter(|_| !args.no_midi);
    let mapping: InputMapping = settings.midi.mapping.clone();

    let mut modules = ModuleManager::new();
    modules.register_module(Box::new(EngineClockModule::new(registry.clone())));
    if let Some(device) = &midi_device {
        match MidiModule::list_input_ports() {
            Ok(ports) => log::info!("Available MIDI inputs: {:?}", ports),
            Err(e) => log::warn!("Unable to list MIDI inputs: {}", e),
        }
        modules.register_module(Box::new(MidiModule::new(device.clone())));
    }
    modules
        .initialize()
        .await
        .map_err(|e| anyhow::anyhow!("Module initialization failed: {}", e))?;
    modules
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Module start failed: {}", e))?;

    let mut module_rx = modules
        .take_message_receiver()
        .ok_or_else(|| anyhow::anyhow!("Module message receiver already taken"))?;
    let midi_tx = modules.module_sender(&ModuleId::Midi);

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let cue_list = tokio::spawn(run_with_channels(controller, command_rx, notification_rx, event_tx));

    log::info!("Cue list ready: sequence {} with {} steps", sequence_id, args.steps);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut shutting_down = false;

    loop {
        tokio::select! {
            result = &mut shutdown, if !shutting_down => {
                if let Err(e) = result {
                    log::error!("Unable to listen for Ctrl-C: {}", e);
                }
                log::info!("Shutting down...");
                shutting_down = true;
                let _ = command_tx.send(CueListCommand::Shutdown);
            }

            Some(message) = module_rx.recv() => match message {
                ModuleMessage::Event(ModuleEvent::MidiInput(midi)) => {
                    if let Some((input, value)) = mapping.translate(&midi) {
                        log::trace!("MIDI {:?} -> {} = {}", midi, input.name(), value);
                        let _ = command_tx.send(CueListCommand::Input { input, value });
                    }
                }
                ModuleMessage::Event(_) => {}
                ModuleMessage::Status(status) => log::info!("{}", status),
                ModuleMessage::Error(error) => log::error!("{}", error),
            },

            event = event_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                if event == CueListEvent::ShutdownComplete {
                    break;
                }
                log_event(&event);

                if let CueListEvent::Feedback { input, value } = event {
                    let bytes = mapping.feedback(input, value);
                    if let (Some(midi_tx), Some(bytes)) = (&midi_tx, bytes) {
                        if let Err(e) = midi_tx.try_send(ModuleEvent::MidiOutput(bytes)) {
                            log::warn!("Dropping MIDI feedback: {}", e);
                        }
                    }
                }
            }
        }
    }

    cue_list.await??;
    modules
        .shutdown()
        .await
        .map_err(|e| anyhow::anyhow!("Module shutdown failed: {}", e))?;
    log::info!("Cue list stopped");
    Ok(())
}
