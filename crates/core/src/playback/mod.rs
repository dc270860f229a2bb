pub mod controller;
pub mod crossfade;
pub mod navigation;
pub mod progress;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{CueListController, MIN_INDEX_CHANGE_INTERVAL};
pub use crossfade::{steps_target, AutoStop, Crossfade, CROSSFADE_MAX_LEVEL, STEPS_MAX_LEVEL};
pub use navigation::{Navigation, RunState, SequenceShape};
pub use progress::{compute_progress, ProgressReporter, PROGRESS_INTERVAL};
