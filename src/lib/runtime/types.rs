use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tasks::types::TaskSpec;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("docker engine error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("no such container: {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// What the runtime needs to create a container: image, command, optional name.
/// No network, port or volume configuration is ever attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    pub name: Option<String>,
    pub image: String,
    pub cmd: Option<Vec<String>>,
}

pub fn new_config(spec: &TaskSpec) -> ContainerConfig {
    ContainerConfig {
        name: spec.name().map(str::to_string),
        image: spec.image().to_string(),
        cmd: if spec.cmd().is_empty() {
            None
        } else {
            Some(spec.cmd().to_vec())
        },
    }
}

/// One progress message emitted while an image is pulled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullProgress {
    pub id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
}

impl PullProgress {
    pub fn status(status: impl Into<String>) -> Self {
        PullProgress {
            status: Some(status.into()),
            ..Default::default()
        }
    }

    /// Single line rendering, e.g. `3f4ca61aafcd: Downloading [==>   ] 1.2MB/3.4MB`.
    pub fn line(&self) -> String {
        let mut line = String::new();
        if let Some(id) = &self.id {
            line.push_str(id);
            line.push_str(": ");
        }
        if let Some(status) = &self.status {
            line.push_str(status);
        }
        if let Some(progress) = &self.progress {
            line.push(' ');
            line.push_str(progress);
        }
        line
    }
}

pub type ProgressStream = BoxStream<'static, RuntimeResult<PullProgress>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    /// Engine state string: "created", "running", "exited", ...
    pub state: String,
}

/// Container engine capabilities the lifecycle controller relies on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Requests an image pull. An `Err` means the request itself was rejected; the
    /// returned stream must be drained for the pull to complete.
    async fn pull_image(&self, image: &str) -> RuntimeResult<ProgressStream>;

    async fn create_container(&self, config: &ContainerConfig) -> RuntimeResult<String>;

    async fn start_container(&self, container_id: &str) -> RuntimeResult<()>;

    /// Stops a container. `None` leaves the grace period to the engine.
    /// Stopping a container that has already exited is not an error.
    async fn stop_container(&self, container_id: &str, grace: Option<Duration>)
    -> RuntimeResult<()>;

    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerSummary>>;

    async fn remove_container(&self, container_id: &str) -> RuntimeResult<()>;
}

/// Hands out runtime handles. Called once per lifecycle operation.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> RuntimeResult<Box<dyn ContainerRuntime>>;
}
