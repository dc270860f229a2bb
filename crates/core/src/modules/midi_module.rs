use std::collections::HashMap;

use async_trait::async_trait;
use midir::{MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection, MidiOutputPort};
use tokio::sync::mpsc;

use super::traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage, ModuleResult};
use crate::midi::MidiMessage;

const CLIENT_NAME: &str = "cuelist_controller";

/// Bridges one MIDI device to the module bus: incoming messages become
/// [`ModuleEvent::MidiInput`], [`ModuleEvent::MidiOutput`] bytes go out.
pub struct MidiModule {
    device_name: String,
    input_connection: Option<MidiInputConnection<()>>,
    output_connection: Option<MidiOutputConnection>,
    status: HashMap<String, String>,
}

impl MidiModule {
    pub fn new(device_name: String) -> Self {
        Self {
            device_name,
            input_connection: None,
            output_connection: None,
            status: HashMap::new(),
        }
    }

    /// Names of the MIDI input ports currently visible to the system.
    pub fn list_input_ports() -> ModuleResult<Vec<String>> {
        let midi_in = MidiInput::new(CLIENT_NAME)?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    fn find_input_port(&self, midi_in: &MidiInput) -> Option<MidiInputPort> {
        midi_in.ports().into_iter().find(|port| {
            midi_in
                .port_name(port)
                .map(|name| name.contains(&self.device_name))
                .unwrap_or(false)
        })
    }

    fn find_output_port(&self, midi_out: &MidiOutput) -> Option<MidiOutputPort> {
        midi_out.ports().into_iter().find(|port| {
            midi_out
                .port_name(port)
                .map(|name| name.contains(&self.device_name))
                .unwrap_or(false)
        })
    }

    fn connect_midi(&mut self, tx: mpsc::Sender<ModuleMessage>) -> ModuleResult<()> {
        let midi_in = MidiInput::new(CLIENT_NAME)?;
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let in_port = self
            .find_input_port(&midi_in)
            .ok_or_else(|| format!("{} input not found", self.device_name))?;

        let connection = midi_in
            .connect(
                &in_port,
                "cuelist-midi-input",
                move |_timestamp, bytes, _| {
                    let Some(message) = MidiMessage::parse(bytes) else {
                        return;
                    };
                    if message == MidiMessage::Clock {
                        return;
                    }
                    // Runs on the driver thread, so never block here
                    let event = ModuleEvent::MidiInput(message);
                    if let Err(e) = tx.try_send(ModuleMessage::Event(event)) {
                        log::warn!("Failed to forward MIDI message: {}", e);
                    }
                },
                (),
            )
            .map_err(|_| "Failed to connect MIDI input")?;
        self.input_connection = Some(connection);
        self.status
            .insert("input_connected".to_string(), "true".to_string());

        // Feedback is optional: plenty of controllers have no output port
        match self.find_output_port(&midi_out) {
            Some(out_port) => {
                let output_connection = midi_out
                    .connect(&out_port, "cuelist-midi-output")
                    .map_err(|_| "Failed to connect MIDI output")?;
                self.output_connection = Some(output_connection);
                self.status
                    .insert("output_connected".to_string(), "true".to_string());
            }
            None => log::warn!("{} has no MIDI output, feedback disabled", self.device_name),
        }

        self.status
            .insert("device".to_string(), self.device_name.clone());
        Ok(())
    }

    pub fn send_midi_message(&mut self, data: &[u8]) -> Result<(), String> {
        let Some(output) = &mut self.output_connection else {
            return Err("MIDI output not connected".to_string());
        };
        output
            .send(data)
            .map_err(|e| format!("Failed to send MIDI: {}", e))
    }
}

#[async_trait]
impl AsyncModule for MidiModule {
    fn id(&self) -> ModuleId {
        ModuleId::Midi
    }

    async fn initialize(&mut self) -> ModuleResult<()> {
        log::info!("Initializing MIDI module for device: {}", self.device_name);

        self.status
            .insert("device_name".to_string(), self.device_name.clone());
        self.status
            .insert("status".to_string(), "initialized".to_string());
        self.status
            .insert("input_connected".to_string(), "false".to_string());
        self.status
            .insert("output_connected".to_string(), "false".to_string());

        Ok(())
    }

    async fn run(
        &mut self,
        mut rx: mpsc::Receiver<ModuleEvent>,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> ModuleResult<()> {
        log::info!("MIDI module starting for device: {}", self.device_name);

        match self.connect_midi(tx.clone()) {
            Ok(_) => {
                log::info!("MIDI device '{}' connected", self.device_name);
                let _ = tx
                    .send(ModuleMessage::Status(format!(
                        "MIDI device '{}' connected",
                        self.device_name
                    )))
                    .await;
            }
            Err(e) => {
                // Keep running so the cue list stays usable without hardware
                let error_msg = format!(
                    "Failed to connect MIDI device '{}': {}",
                    self.device_name, e
                );
                log::error!("{}", error_msg);
                let _ = tx.send(ModuleMessage::Error(error_msg)).await;
            }
        }

        while let Some(event) = rx.recv().await {
            match event {
                ModuleEvent::Shutdown => {
                    log::info!("MIDI module received shutdown signal");
                    break;
                }
                ModuleEvent::MidiOutput(bytes) => {
                    if self.output_connection.is_none() {
                        continue;
                    }
                    if let Err(e) = self.send_midi_message(&bytes) {
                        log::warn!("{}", e);
                    }
                }
                ModuleEvent::MidiInput(_) => {}
            }
        }

        log::info!("MIDI module shutting down");
        Ok(())
    }

    async fn shutdown(&mut self) -> ModuleResult<()> {
        // Dropping the connections closes the ports
        self.input_connection = None;
        self.output_connection = None;

        self.status
            .insert("status".to_string(), "shutdown".to_string());
        self.status
            .insert("input_connected".to_string(), "false".to_string());
        self.status
            .insert("output_connected".to_string(), "false".to_string());

        log::info!("MIDI module shutdown complete");
        Ok(())
    }

    fn status(&self) -> HashMap<String, String> {
        self.status.clone()
    }
}
