use serde::{Deserialize, Serialize};

use crate::midi::decoder::DEFAULT_TIMEOUT_MS;
use crate::midi::mapping::InputMapping;
use crate::midi::rate_limiter::DEFAULT_DEBOUNCE_MS;
use crate::sequence::SequenceId;

/// Logical inputs of the cue list. The numeric ids are stable and used by
/// external input routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputId {
    NextStep,
    PreviousStep,
    PlayPause,
    StopPause,
    SideFader,
    MidiStepFirst,
    MidiStepSecond,
}

impl InputId {
    pub const ALL: [InputId; 7] = [
        InputId::NextStep,
        InputId::PreviousStep,
        InputId::PlayPause,
        InputId::StopPause,
        InputId::SideFader,
        InputId::MidiStepFirst,
        InputId::MidiStepSecond,
    ];

    pub fn id(self) -> u8 {
        match self {
            InputId::NextStep => 0,
            InputId::PreviousStep => 1,
            InputId::PlayPause => 2,
            InputId::StopPause => 3,
            InputId::SideFader => 4,
            InputId::MidiStepFirst => 5,
            InputId::MidiStepSecond => 6,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|input| input.id() == id)
    }

    /// Buttons act on the press (value 255) only. Everything else acts on
    /// every value change.
    pub fn is_edge_triggered(self) -> bool {
        matches!(
            self,
            InputId::NextStep | InputId::PreviousStep | InputId::PlayPause | InputId::StopPause
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            InputId::NextStep => "Next Cue",
            InputId::PreviousStep => "Previous Cue",
            InputId::PlayPause => "Play/Stop/Pause",
            InputId::StopPause => "Stop/Pause",
            InputId::SideFader => "Side Fader",
            InputId::MidiStepFirst => "MIDI Step Selection (First Note)",
            InputId::MidiStepSecond => "MIDI Step Selection (Second Note)",
        }
    }
}

/// What Next/Previous do while the sequence is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NavigationPolicy {
    #[default]
    RunFirstOnIdle,
    RunNextOnIdle,
    SelectOnIdle,
    DoNothingOnIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackLayout {
    /// Play toggles pause, Stop stops.
    #[default]
    PlayPauseStop,
    /// Play stops, Stop toggles pause.
    PlayStopPause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FaderMode {
    #[default]
    None,
    Crossfade,
    Steps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProgressStatus {
    #[default]
    Idle,
    Infinite,
    FadeIn,
    Hold,
}

/// Progress of the running step as shown next to the cue list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgressInfo {
    pub status: ProgressStatus,
    /// 0.0 - 1.0
    pub value: f64,
    /// Remaining time, empty when there is nothing to count down
    pub text: String,
}

/// Snapshot of the controller returned by `CueListCommand::QueryState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub sequence: Option<SequenceId>,
    pub playback_status: PlaybackStatus,
    pub playback_index: Option<usize>,
    pub next_step_index: Option<usize>,
    pub primary_top: bool,
    pub fader_mode: FaderMode,
    pub fader_level: u8,
    pub intensity: f64,
    pub progress: ProgressInfo,
    pub settings: CueListSettings,
}

/// Commands sent to the cue list controller task
#[derive(Debug, Clone)]
pub enum CueListCommand {
    Shutdown,

    // Raw external input, as routed from a physical or MIDI control
    Input { input: InputId, value: u8 },

    // Gestures
    Next,
    Previous,
    Play,
    Stop,
    PlayCurrentStep,
    SelectStep { index: usize },
    SetFaderLevel { level: u8 },
    SetIntensity { intensity: f64 },

    // Configuration
    AttachSequence { sequence: Option<SequenceId> },
    SetNavigationPolicy { policy: NavigationPolicy },
    SetPlaybackLayout { layout: PlaybackLayout },
    SetFaderMode { mode: FaderMode },
    SetMidiStepSelection { enabled: bool },
    SetMidiTwoNoteMode { enabled: bool },
    SetMidiTimeout { timeout_ms: u64 },
    SetMidiDebounce { debounce_ms: u64 },
    ApplySettings { settings: CueListSettings },

    QueryState,
}

/// Events sent from the cue list controller to the display layer
#[derive(Debug, Clone, PartialEq)]
pub enum CueListEvent {
    ShutdownComplete,

    SequenceAttached { sequence: Option<SequenceId> },
    PlaybackIndexChanged { index: Option<usize> },
    NextStepIndexChanged { index: Option<usize> },
    PrimaryTopChanged { top: bool },
    PlaybackStatusChanged { status: PlaybackStatus },
    ProgressChanged { progress: ProgressInfo },

    FaderLevelChanged { level: u8 },
    FaderModeChanged { mode: FaderMode },
    NavigationPolicyChanged { policy: NavigationPolicy },
    PlaybackLayoutChanged { layout: PlaybackLayout },
    MidiStepSettingsChanged { settings: MidiStepSettings },

    /// Value to reflect on the control bound to `input`
    Feedback { input: InputId, value: u8 },

    CurrentState { state: Box<CurrentState> },
}

/// MIDI step selection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiStepSettings {
    pub enabled: bool,
    pub two_note_mode: bool,
    pub timeout_ms: u64,
    pub debounce_ms: u64,
}

impl Default for MidiStepSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            two_note_mode: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Cue list behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CueListSettings {
    pub sequence: Option<SequenceId>,
    pub navigation_policy: NavigationPolicy,
    pub playback_layout: PlaybackLayout,
    pub fader_mode: FaderMode,
    pub midi_step: MidiStepSettings,
}

/// MIDI input device and bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiInputSettings {
    pub enabled: bool,
    pub device: String,
    pub mapping: InputMapping,
}

impl Default for MidiInputSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            device: "None".to_string(),
            mapping: InputMapping::default(),
        }
    }
}

/// Settings configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub cue_list: CueListSettings,
    pub midi: MidiInputSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_ids_are_stable() {
        for (expected, input) in InputId::ALL.iter().enumerate() {
            assert_eq!(input.id() as usize, expected);
            assert_eq!(InputId::from_id(input.id()), Some(*input));
        }
        assert_eq!(InputId::from_id(7), None);
    }

    #[test]
    fn test_edge_triggered_inputs() {
        assert!(InputId::NextStep.is_edge_triggered());
        assert!(InputId::StopPause.is_edge_triggered());
        assert!(!InputId::SideFader.is_edge_triggered());
        assert!(!InputId::MidiStepFirst.is_edge_triggered());
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"cue_list": {"fader_mode": "Crossfade"}}"#).unwrap();
        assert_eq!(settings.cue_list.fader_mode, FaderMode::Crossfade);
        assert_eq!(settings.cue_list.midi_step, MidiStepSettings::default());
        assert_eq!(settings.midi, MidiInputSettings::default());
    }
}
