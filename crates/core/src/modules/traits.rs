use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::midi::MidiMessage;

/// Unique identifier for each module type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleId {
    Midi,
    EngineClock,
}

/// Events that can be sent between modules
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleEvent {
    /// MIDI input events
    MidiInput(MidiMessage),
    /// Raw bytes for the MIDI output port, e.g. control feedback
    MidiOutput(Vec<u8>),
    /// System events
    Shutdown,
}

/// Messages passed between modules and the module manager
#[derive(Debug)]
pub enum ModuleMessage {
    Event(ModuleEvent),
    Status(String),
    Error(String),
}

pub type ModuleResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Trait that all async modules must implement
#[async_trait]
pub trait AsyncModule: Send + Sync {
    /// Get the unique identifier for this module
    fn id(&self) -> ModuleId;

    /// Initialize the module (called once at startup)
    async fn initialize(&mut self) -> ModuleResult<()>;

    /// Start the module's main loop
    async fn run(
        &mut self,
        rx: mpsc::Receiver<ModuleEvent>,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> ModuleResult<()>;

    /// Shutdown the module gracefully
    async fn shutdown(&mut self) -> ModuleResult<()>;

    /// Get the module's status
    fn status(&self) -> HashMap<String, String>;
}
