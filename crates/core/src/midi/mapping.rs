//! MIDI bindings for the cue list inputs.
//!
//! # Default layout (channel 1)
//!
//! ```text
//! Note 40: Play/Pause      Note 41: Stop/Pause
//! Note 42: Previous        Note 43: Next
//! Note 36: MIDI step (first velocity)
//! Note 37: MIDI step (second velocity)
//! CC 7:    Side fader
//! ```

use serde::{Deserialize, Serialize};

use super::midi::MidiMessage;
use crate::messages::InputId;

/// Where a binding listens. Channels are 1-16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiSource {
    Note { channel: u8, note: u8 },
    Control { channel: u8, controller: u8 },
}

impl MidiSource {
    fn wire_channel(channel: u8) -> u8 {
        channel.clamp(1, 16) - 1
    }

    fn matches(&self, message: &MidiMessage) -> bool {
        match (*self, *message) {
            (
                MidiSource::Note { channel, note },
                MidiMessage::NoteOn {
                    channel: c, note: n, ..
                },
            )
            | (
                MidiSource::Note { channel, note },
                MidiMessage::NoteOff { channel: c, note: n },
            ) => Self::wire_channel(channel) == c && note == n,
            (
                MidiSource::Control {
                    channel,
                    controller,
                },
                MidiMessage::ControlChange {
                    channel: c,
                    controller: n,
                    ..
                },
            ) => Self::wire_channel(channel) == c && controller == n,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    pub input: InputId,
    pub source: MidiSource,
}

impl InputBinding {
    pub const fn note(input: InputId, channel: u8, note: u8) -> Self {
        Self {
            input,
            source: MidiSource::Note { channel, note },
        }
    }

    pub const fn control(input: InputId, channel: u8, controller: u8) -> Self {
        Self {
            input,
            source: MidiSource::Control {
                channel,
                controller,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMapping {
    pub bindings: Vec<InputBinding>,
}

impl InputMapping {
    pub const PLAY_PAUSE: u8 = 40;
    pub const STOP_PAUSE: u8 = 41;
    pub const PREVIOUS: u8 = 42;
    pub const NEXT: u8 = 43;
    pub const STEP_FIRST: u8 = 36;
    pub const STEP_SECOND: u8 = 37;
    pub const SIDE_FADER: u8 = 7;

    pub fn new(bindings: Vec<InputBinding>) -> Self {
        Self { bindings }
    }

    /// Translate an incoming message into a logical input and its 8-bit
    /// value. Step-selection inputs keep the raw 7-bit value, including a
    /// zero-velocity Note On; a 0x80 Note Off on them is ignored. Buttons
    /// treat a zero-velocity Note On as a release.
    pub fn translate(&self, message: &MidiMessage) -> Option<(InputId, u8)> {
        let binding = self
            .bindings
            .iter()
            .find(|binding| binding.source.matches(message))?;
        let input = binding.input;

        let value = match (input, *message) {
            (InputId::MidiStepFirst | InputId::MidiStepSecond, MidiMessage::NoteOn { velocity, .. }) => {
                velocity
            }
            (InputId::MidiStepFirst | InputId::MidiStepSecond, MidiMessage::NoteOff { .. }) => {
                return None
            }
            (InputId::MidiStepFirst | InputId::MidiStepSecond, MidiMessage::ControlChange { value, .. }) => {
                value
            }
            (InputId::SideFader, MidiMessage::NoteOn { velocity, .. }) => scale_to_u8(velocity),
            (_, MidiMessage::NoteOn { velocity: 0, .. }) => 0,
            (_, MidiMessage::NoteOn { .. }) => u8::MAX,
            (_, MidiMessage::NoteOff { .. }) => 0,
            (_, MidiMessage::ControlChange { value, .. }) => scale_to_u8(value),
            (_, MidiMessage::Clock) => return None,
        };
        Some((input, value))
    }

    /// Bytes that reflect `value` on the control bound to `input`.
    pub fn feedback(&self, input: InputId, value: u8) -> Option<Vec<u8>> {
        let binding = self.bindings.iter().find(|binding| binding.input == input)?;
        let message = match binding.source {
            MidiSource::Note { channel, note } if value > 0 => MidiMessage::NoteOn {
                channel: MidiSource::wire_channel(channel),
                note,
                velocity: scale_to_u7(value).max(1),
            },
            MidiSource::Note { channel, note } => MidiMessage::NoteOff {
                channel: MidiSource::wire_channel(channel),
                note,
            },
            MidiSource::Control {
                channel,
                controller,
            } => MidiMessage::ControlChange {
                channel: MidiSource::wire_channel(channel),
                controller,
                value: scale_to_u7(value),
            },
        };
        Some(message.to_bytes())
    }
}

impl Default for InputMapping {
    fn default() -> Self {
        Self::new(vec![
            InputBinding::note(InputId::PlayPause, 1, Self::PLAY_PAUSE),
            InputBinding::note(InputId::StopPause, 1, Self::STOP_PAUSE),
            InputBinding::note(InputId::PreviousStep, 1, Self::PREVIOUS),
            InputBinding::note(InputId::NextStep, 1, Self::NEXT),
            InputBinding::note(InputId::MidiStepFirst, 1, Self::STEP_FIRST),
            InputBinding::note(InputId::MidiStepSecond, 1, Self::STEP_SECOND),
            InputBinding::control(InputId::SideFader, 1, Self::SIDE_FADER),
        ])
    }
}

fn scale_to_u8(value: u8) -> u8 {
    ((u16::from(value.min(127)) * 255) / 127) as u8
}

fn scale_to_u7(value: u8) -> u8 {
    ((u16::from(value) * 127) / 255) as u8
}
