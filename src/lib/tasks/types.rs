use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, TaskError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Pending,
    Running,
    Completed,
    Failed,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Pending => "Pending",
            State::Running => "Running",
            State::Completed => "Completed",
            State::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Desired work: what to pull and what to run in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    image: String,
    #[serde(default)]
    cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl TaskSpec {
    pub fn new<I, S>(image: impl Into<String>, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TaskSpec {
            image: image.into(),
            cmd: cmd.into_iter().map(Into::into).collect(),
            name: None,
        }
    }

    /// Names the container created for this task. Without a name the runtime picks one.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Entrypoint arguments. Empty means the image default.
    pub fn cmd(&self) -> &[String] {
        &self.cmd
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Retained cause of the last error seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TaskError> for Failure {
    fn from(err: &TaskError) -> Self {
        Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    container_id: String,
    state: State,
    failure: Option<Failure>,
    start_time: Option<SystemTime>,
    finish_time: Option<SystemTime>,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus {
            container_id: String::new(),
            state: State::Pending,
            failure: None,
            start_time: None,
            finish_time: None,
        }
    }
}

impl TaskStatus {
    /// Empty until the runtime has created a container for the task.
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.start_time
    }

    pub fn finish_time(&self) -> Option<SystemTime> {
        self.finish_time
    }

    pub(crate) fn set_container_id(&mut self, container_id: String) {
        self.container_id = container_id;
    }

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
        match state {
            State::Running => self.start_time = Some(SystemTime::now()),
            State::Completed | State::Failed => self.finish_time = Some(SystemTime::now()),
            State::Pending => {}
        }
    }

    pub(crate) fn record_failure(&mut self, err: &TaskError) {
        self.failure = Some(Failure::from(err));
    }

    pub(crate) fn clear_failure(&mut self) {
        self.failure = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: uuid::Uuid,
    spec: TaskSpec,
    status: TaskStatus,
}

impl Task {
    /// A fresh task in `Pending` with no container.
    pub fn new(spec: TaskSpec) -> Self {
        Task {
            id: uuid::Uuid::new_v4(),
            spec,
            status: TaskStatus::default(),
        }
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    pub fn state(&self) -> State {
        self.status.state
    }

    pub fn container_id(&self) -> &str {
        &self.status.container_id
    }

    pub(crate) fn status_mut(&mut self) -> &mut TaskStatus {
        &mut self.status
    }
}
