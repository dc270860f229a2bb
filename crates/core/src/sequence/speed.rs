use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A step timing value. Fade and hold times are either a finite duration or
/// the "infinite" sentinel used for steps that wait for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speed {
    Finite(Duration),
    Infinite,
}

impl Speed {
    pub fn from_millis(ms: u64) -> Self {
        Speed::Finite(Duration::from_millis(ms))
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Speed::Infinite)
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Speed::Finite(d) => Some(*d),
            Speed::Infinite => None,
        }
    }

    /// Sum of two speeds; anything plus infinite stays infinite.
    pub fn saturating_add(self, other: Speed) -> Speed {
        match (self, other) {
            (Speed::Finite(a), Speed::Finite(b)) => Speed::Finite(a.saturating_add(b)),
            _ => Speed::Infinite,
        }
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed::Finite(Duration::ZERO)
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speed::Finite(d) => write!(f, "{}", speed_to_string(*d)),
            Speed::Infinite => write!(f, "∞"),
        }
    }
}

/// Render a duration the way the cue list shows remaining time, e.g.
/// `1m05s.50`. Zero components are left out and hundredths of a second
/// follow a dot.
pub fn speed_to_string(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms == 0 {
        return "0".to_string();
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let hundredths = (total_ms % 1000) / 10;

    let mut text = String::new();
    if hours > 0 {
        text.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        text.push_str(&format!("{:02}m", minutes));
    }
    if seconds > 0 {
        text.push_str(&format!("{:02}s", seconds));
    }
    if hundredths > 0 {
        text.push_str(&format!(".{:02}", hundredths));
    }
    if text.is_empty() {
        // Sub-10ms remainders
        text.push_str(".00");
    }
    text
}
