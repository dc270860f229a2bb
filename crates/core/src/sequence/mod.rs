pub mod engine;
pub mod memory;
pub mod speed;
pub mod step;

pub use engine::{
    notification_channel, Direction, FadeControlMode, NotificationReceiver, NotificationSender,
    SequenceEngine, SequenceId, SequenceNotification, SequenceRegistry, StepAction,
    StepChangeAction, StepTiming,
};
pub use memory::{MemoryRegistry, MemorySequence};
pub use speed::{speed_to_string, Speed};
pub use step::Step;
