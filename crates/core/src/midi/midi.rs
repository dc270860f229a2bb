// MIDI message types we care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    Clock,
}

impl MidiMessage {
    /// Parse a raw message as delivered by the MIDI input callback.
    /// Channels are zero-based, as on the wire.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        if status == 0xF8 {
            return Some(MidiMessage::Clock);
        }
        if bytes.len() < 3 {
            return None;
        }

        let channel = status & 0x0F;
        let data1 = bytes[1] & 0x7F;
        let data2 = bytes[2] & 0x7F;
        match status & 0xF0 {
            // Zero velocity stays a Note On; bindings decide whether it is a release
            0x90 => Some(MidiMessage::NoteOn {
                channel,
                note: data1,
                velocity: data2,
            }),
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: data1,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                controller: data1,
                value: data2,
            }),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff { channel, note } => vec![0x80 | (channel & 0x0F), note & 0x7F, 0],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MidiMessage::Clock => vec![0xF8],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_and_cc() {
        assert_eq!(
            MidiMessage::parse(&[0x91, 36, 100]),
            Some(MidiMessage::NoteOn {
                channel: 1,
                note: 36,
                velocity: 100
            })
        );
        assert_eq!(
            MidiMessage::parse(&[0x90, 36, 0]),
            Some(MidiMessage::NoteOn {
                channel: 0,
                note: 36,
                velocity: 0
            })
        );
        assert_eq!(
            MidiMessage::parse(&[0x80, 36, 64]),
            Some(MidiMessage::NoteOff { channel: 0, note: 36 })
        );
        assert_eq!(
            MidiMessage::parse(&[0xB0, 7, 64]),
            Some(MidiMessage::ControlChange {
                channel: 0,
                controller: 7,
                value: 64
            })
        );
        assert_eq!(MidiMessage::parse(&[0xF8]), Some(MidiMessage::Clock));
        assert_eq!(MidiMessage::parse(&[0xE0, 0, 64]), None);
        assert_eq!(MidiMessage::parse(&[0x90, 36]), None);
    }

    #[test]
    fn test_to_bytes_matches_parse() {
        let message = MidiMessage::ControlChange {
            channel: 3,
            controller: 1,
            value: 127,
        };
        assert_eq!(message.to_bytes(), vec![0xB3, 1, 127]);
        assert_eq!(MidiMessage::parse(&message.to_bytes()), Some(message));
    }
}
