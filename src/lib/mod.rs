//! Lifecycle of a single containerised task.
//!
//! A [`Task`](tasks::types::Task) pairs an immutable [`TaskSpec`](tasks::types::TaskSpec)
//! with the [`TaskStatus`](tasks::types::TaskStatus) observed from a container runtime.
//! The [`Lifecycle`](tasks::lifecycle::Lifecycle) controller drives it from `Pending`
//! to `Running` and on to `Completed`, or into `Failed` when a step of the start
//! sequence is rejected by the runtime.

pub mod config;
pub mod runtime;
pub mod tasks;

pub use config::{Config, ConfigError};
pub use runtime::types::{Connector, ContainerRuntime, ContainerSummary, RuntimeError};
pub use tasks::error::{ErrorKind, TaskError};
pub use tasks::lifecycle::Lifecycle;
pub use tasks::types::{Failure, State, Task, TaskSpec, TaskStatus};
