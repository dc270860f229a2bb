//! Cue list playback control: a hardware-facing controller that turns
//! button presses, a side fader and MIDI step-selection notes into commands
//! for a sequence engine, and reports playback state back.

pub use config::{ConfigError, ConfigManager, ConfigSchema};
pub use messages::{
    CueListCommand, CueListEvent, CueListSettings, CurrentState, FaderMode, InputId,
    MidiInputSettings, MidiStepSettings, NavigationPolicy, PlaybackLayout, PlaybackStatus,
    ProgressInfo, ProgressStatus, Settings,
};
pub use midi::{InputBinding, InputMapping, MidiMessage, MidiSource, MidiStepDecoder, StepRateLimiter};
// Async module system exports
pub use modules::{
    AsyncModule, EngineClockModule, MidiModule, ModuleEvent, ModuleId, ModuleManager, ModuleMessage,
};
pub use playback::CueListController;
pub use runtime::{process_command, run_with_channels};
pub use sequence::{
    notification_channel, Direction, FadeControlMode, MemoryRegistry, MemorySequence,
    NotificationReceiver, NotificationSender, SequenceEngine, SequenceId, SequenceNotification,
    SequenceRegistry, Speed, Step, StepAction, StepChangeAction, StepTiming,
};
pub use timer::{Scheduler, TimerKind, TimerToken};

mod config;
pub mod messages;
pub mod midi;
mod modules;
pub mod playback;
mod runtime;
pub mod sequence;
pub mod timer;
