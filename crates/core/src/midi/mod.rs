pub mod decoder;
pub mod mapping;
#[allow(clippy::module_inception)]
pub mod midi;
pub mod rate_limiter;

pub use decoder::MidiStepDecoder;
pub use mapping::{InputBinding, InputMapping, MidiSource};
pub use midi::MidiMessage;
pub use rate_limiter::StepRateLimiter;
