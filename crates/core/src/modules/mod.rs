pub mod engine_clock_module;
pub mod midi_module;
pub mod module_manager;
pub mod traits;

pub use engine_clock_module::EngineClockModule;
pub use midi_module::MidiModule;
pub use module_manager::ModuleManager;
pub use traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage, ModuleResult};
