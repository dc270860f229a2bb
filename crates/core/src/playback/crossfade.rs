//! Side fader interpretation.
//!
//! In crossfade mode the fader (0-100) splits intensity between the primary
//! step (the one announced as current) and the secondary step (its computed
//! successor). Whichever of the two is "on top" receives `level / 100`, the
//! other the complement. In steps mode the fader (0-255) picks a step index.

use crate::messages::FaderMode;
use crate::sequence::{FadeControlMode, SequenceEngine, StepChangeAction};

pub const CROSSFADE_MAX_LEVEL: u8 = 100;
pub const STEPS_MAX_LEVEL: u8 = u8::MAX;

/// Result of the auto-stop check after a crossfade adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStop {
    /// The top side faded out. It was stopped and the other side is on top.
    Primary { stopped: Option<usize> },
    /// The bottom side faded out and was stopped.
    Secondary { stopped: Option<usize> },
}

#[derive(Debug, Clone)]
pub struct Crossfade {
    mode: FaderMode,
    level: u8,
    primary_top: bool,
}

impl Default for Crossfade {
    fn default() -> Self {
        Self {
            mode: FaderMode::None,
            level: CROSSFADE_MAX_LEVEL,
            primary_top: true,
        }
    }
}

impl Crossfade {
    pub fn mode(&self) -> FaderMode {
        self.mode
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn primary_top(&self) -> bool {
        self.primary_top
    }

    /// Switch mode. Returns the level the fader is reset to, if any.
    pub fn set_mode(&mut self, mode: FaderMode) -> Option<u8> {
        self.mode = mode;
        match mode {
            FaderMode::Steps => Some(STEPS_MAX_LEVEL),
            FaderMode::Crossfade => Some(CROSSFADE_MAX_LEVEL),
            FaderMode::None => None,
        }
    }

    /// Map a raw 0-255 input value onto this mode's fader range.
    pub fn scale_input(&self, value: u8) -> u8 {
        match self.mode {
            FaderMode::Crossfade => {
                ((u16::from(value) * u16::from(CROSSFADE_MAX_LEVEL)) / u16::from(u8::MAX)) as u8
            }
            _ => value,
        }
    }

    pub fn clamp_level(&self, level: u8) -> u8 {
        match self.mode {
            FaderMode::Crossfade => level.min(CROSSFADE_MAX_LEVEL),
            _ => level,
        }
    }

    /// Store a level already clamped to the mode's range.
    pub fn set_level(&mut self, level: u8) -> bool {
        let level = self.clamp_level(level);
        if self.level == level {
            return false;
        }
        self.level = level;
        true
    }

    /// Level expressed on the 0-255 input scale, for control feedback.
    pub fn feedback_value(&self) -> u8 {
        match self.mode {
            FaderMode::Crossfade => {
                ((u16::from(self.level.min(CROSSFADE_MAX_LEVEL)) * u16::from(u8::MAX))
                    / u16::from(CROSSFADE_MAX_LEVEL)) as u8
            }
            _ => self.level,
        }
    }

    fn top_weight(&self) -> f64 {
        f64::from(self.level.min(CROSSFADE_MAX_LEVEL)) / 100.0
    }

    /// Intensity of the step announced as current.
    pub fn primary_intensity(&self) -> f64 {
        match self.mode {
            FaderMode::None | FaderMode::Steps => 1.0,
            FaderMode::Crossfade if self.primary_top => self.top_weight(),
            FaderMode::Crossfade => 1.0 - self.top_weight(),
        }
    }

    pub fn fade_mode(&self) -> FadeControlMode {
        if self.mode == FaderMode::Steps {
            return FadeControlMode::FromFunction;
        }
        if self.level != 0 && self.level != CROSSFADE_MAX_LEVEL {
            FadeControlMode::BlendedCrossfade
        } else {
            FadeControlMode::Blended
        }
    }

    /// Send both blend weights to the engine.
    pub fn apply_blend(&self, engine: &dyn SequenceEngine, primary: Option<usize>, secondary: Option<usize>) {
        let (top, bottom) = if self.primary_top {
            (primary, secondary)
        } else {
            (secondary, primary)
        };
        let fade_mode = self.fade_mode();
        let weight = self.top_weight();

        engine.adjust_step_intensity(weight, top, fade_mode);
        engine.adjust_step_intensity(1.0 - weight, bottom, fade_mode);
    }

    /// Stop whichever of two running steps has faded out completely. When the
    /// top side is the one that reached zero the top flag flips, so the fader
    /// can be swept the same way again to chain the next step.
    pub fn stop_step_if_needed(
        &mut self,
        engine: &dyn SequenceEngine,
        primary: Option<usize>,
        secondary: Option<usize>,
    ) -> Option<AutoStop> {
        if engine.running_steps() != 2 {
            return None;
        }

        let level = self.level.min(CROSSFADE_MAX_LEVEL);
        let (primary_value, secondary_value) = if self.primary_top {
            (level, CROSSFADE_MAX_LEVEL - level)
        } else {
            (CROSSFADE_MAX_LEVEL - level, level)
        };

        if primary_value == 0 {
            self.primary_top = !self.primary_top;
            engine.set_action(StepChangeAction::stop_step(primary));
            log::debug!("Crossfade: primary step {:?} faded out", primary);
            Some(AutoStop::Primary { stopped: primary })
        } else if secondary_value == 0 {
            engine.set_action(StepChangeAction::stop_step(secondary));
            log::debug!("Crossfade: secondary step {:?} faded out", secondary);
            Some(AutoStop::Secondary { stopped: secondary })
        } else {
            None
        }
    }
}

/// Step picked by the fader in steps mode. The level is inverted so the
/// fader at its top (255) selects the first step.
pub fn steps_target(level: u8, step_count: usize) -> Option<usize> {
    if step_count == 0 {
        return None;
    }
    let inverted = usize::from(u8::MAX - level);
    if step_count >= 256 {
        return Some(inverted);
    }

    let step_size = 255.0 / step_count as f32;
    if inverted as f32 >= 255.0 - step_size {
        Some(step_count - 1)
    } else {
        Some((inverted as f32 / step_size).floor() as usize)
    }
}
