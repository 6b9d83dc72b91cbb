//! Domain model (ids, tasks, status, outcomes, events, stats).

pub mod events;
pub mod ids;
pub mod lane;
pub mod outcome;
pub mod state;
pub mod stats;
pub mod task;

pub use self::events::{TASK_EVENTS_CHANNEL, TaskEvent, TaskEventKind};
pub use self::ids::TaskId;
pub use self::lane::Lane;
pub use self::outcome::{ConversationMemory, ExecutionResult, ExecutionStatus, Message};
pub use self::state::{ParseStatusError, TaskStatus};
pub use self::stats::{Counter, TaskStats};
pub use self::task::{Task, TaskType};
