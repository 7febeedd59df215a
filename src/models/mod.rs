pub mod events;
pub mod group;
pub mod history;
pub mod process;

pub use events::{ClientCommand, ServerEvent};
pub use group::{GroupAssignment, NewTaskGroup, TaskGroup, TaskGroupPatch};
pub use history::{LogKind, LogLine, LogQuery, MetricQuery, MetricSample, StreamKind};
pub use process::{MergedProcess, ProcessConfig, ProcessSnapshot, ProcessStatus, RestartPolicy};
