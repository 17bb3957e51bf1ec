use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::State;
use crate::runtime::types::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    RuntimeConnect,
    ImagePull,
    ImagePullStream,
    ContainerCreate,
    ContainerStart,
    ContainerStop,
    ContainerRemove,
    ContainerList,
    InvalidTransition,
    NoContainer,
    StillRunning,
}

/// Failure of a lifecycle step. Runtime-backed variants keep the runtime cause.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to connect to container runtime: {source}")]
    RuntimeConnect {
        #[source]
        source: RuntimeError,
    },

    #[error("failed to pull image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("image pull for {image} broke off while draining progress: {source}")]
    ImagePullStream {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to create container from {image}: {source}")]
    ContainerCreate {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to start container {container_id}: {source}")]
    ContainerStart {
        container_id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to stop container {container_id}: {source}")]
    ContainerStop {
        container_id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to remove container {container_id}: {source}")]
    ContainerRemove {
        container_id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to list containers: {source}")]
    ContainerList {
        #[source]
        source: RuntimeError,
    },

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: State, to: State },

    #[error("task has no container")]
    NoContainer,

    #[error("container {container_id} belongs to a running task; stop it first")]
    StillRunning { container_id: String },
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::RuntimeConnect { .. } => ErrorKind::RuntimeConnect,
            TaskError::ImagePull { .. } => ErrorKind::ImagePull,
            TaskError::ImagePullStream { .. } => ErrorKind::ImagePullStream,
            TaskError::ContainerCreate { .. } => ErrorKind::ContainerCreate,
            TaskError::ContainerStart { .. } => ErrorKind::ContainerStart,
            TaskError::ContainerStop { .. } => ErrorKind::ContainerStop,
            TaskError::ContainerRemove { .. } => ErrorKind::ContainerRemove,
            TaskError::ContainerList { .. } => ErrorKind::ContainerList,
            TaskError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            TaskError::NoContainer => ErrorKind::NoContainer,
            TaskError::StillRunning { .. } => ErrorKind::StillRunning,
        }
    }

    /// The runtime cause behind this error, if it came from a runtime call.
    pub fn runtime_error(&self) -> Option<&RuntimeError> {
        match self {
            TaskError::RuntimeConnect { source }
            | TaskError::ImagePull { source, .. }
            | TaskError::ImagePullStream { source, .. }
            | TaskError::ContainerCreate { source, .. }
            | TaskError::ContainerStart { source, .. }
            | TaskError::ContainerStop { source, .. }
            | TaskError::ContainerRemove { source, .. }
            | TaskError::ContainerList { source } => Some(source),
            TaskError::InvalidTransition { .. }
            | TaskError::NoContainer
            | TaskError::StillRunning { .. } => None,
        }
    }
}
