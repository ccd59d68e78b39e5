pub mod clock;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod model;
pub mod queue;
pub mod runtime;
pub mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SchedulerError, TaskError};
pub use handler::{handler_fn, TaskHandler, TaskHandlerRegistry};
pub use model::{offset_by_millis, Lane, ScheduleRequest, ScheduledTask, Task, TaskAction};
pub use runtime::{Scheduler, DEFAULT_TICK_INTERVAL};
pub use snapshot::{KvSnapshotStore, SchedulerSnapshot, SnapshotStore, DEFAULT_SNAPSHOT_KEY};
