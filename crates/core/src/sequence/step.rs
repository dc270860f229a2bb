use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::speed::Speed;

/// One entry of a sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    // Time the step takes to reach full intensity once it has been triggered.
    pub fade_in: Speed,
    // Time the step stays at full intensity before the sequence moves on.
    // An infinite hold waits for the operator.
    pub hold: Speed,
    pub fade_out: Speed,
    pub note: String,
}

impl Step {
    pub fn new(name: impl Into<String>, fade_in: Duration, hold: Duration) -> Self {
        Self {
            name: name.into(),
            fade_in: Speed::Finite(fade_in),
            hold: Speed::Finite(hold),
            ..Default::default()
        }
    }

    /// A step that holds until the operator moves on.
    pub fn manual(name: impl Into<String>, fade_in: Duration) -> Self {
        Self {
            name: name.into(),
            fade_in: Speed::Finite(fade_in),
            hold: Speed::Infinite,
            ..Default::default()
        }
    }

    pub fn duration(&self) -> Speed {
        self.fade_in.saturating_add(self.hold)
    }
}

impl Default for Step {
    fn default() -> Self {
        Self {
            name: "".to_string(),
            fade_in: Speed::default(),
            hold: Speed::default(),
            fade_out: Speed::default(),
            note: "".to_string(),
        }
    }
}
