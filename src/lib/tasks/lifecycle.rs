use std::{future::Future, time::Duration};

use futures_util::stream::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    error::TaskError,
    state::valid_state_transition,
    types::{State, Task},
};
use crate::config::Config;
use crate::runtime::types::{Connector, ContainerRuntime, RuntimeError, RuntimeResult, new_config};

/// Drives tasks through the container runtime handed out by `C`.
///
/// Holds no per-task state, so one controller can serve many tasks from
/// different tokio tasks; each `Task` is still driven through `&mut`.
#[derive(Debug, Clone)]
pub struct Lifecycle<C> {
    connector: C,
    config: Config,
}

impl<C: Connector> Lifecycle<C> {
    pub fn new(connector: C, config: Config) -> Self {
        Lifecycle { connector, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts a `Pending` task, writing pull progress to stdout.
    pub async fn start(&self, task: &mut Task, cancel: &CancellationToken) -> Result<(), TaskError> {
        let mut stdout = tokio::io::stdout();
        self.start_with_progress(task, cancel, &mut stdout).await
    }

    /// Pulls the image, creates and starts the container.
    ///
    /// Any failing step moves the task to `Failed` and is returned. The container id
    /// is recorded as soon as the runtime hands it out, so a container that was
    /// created but failed to start stays traceable.
    #[tracing::instrument(
        skip_all,
        fields(task_id = %task.id, image = %task.spec().image())
    )]
    pub async fn start_with_progress<W>(
        &self,
        task: &mut Task,
        cancel: &CancellationToken,
        progress: &mut W,
    ) -> Result<(), TaskError>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let from = task.state();
        if !valid_state_transition(&from, &State::Running) {
            warn!(state = %from, "refusing to start task that is not pending");
            return Err(TaskError::InvalidTransition {
                from,
                to: State::Running,
            });
        }

        match self.run_start(task, cancel, progress).await {
            Ok(()) => {
                let status = task.status_mut();
                status.clear_failure();
                status.set_state(State::Running);
                info!(container_id = %task.container_id(), "task running");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, container_id = %task.container_id(), "task failed to start");
                let status = task.status_mut();
                status.record_failure(&err);
                status.set_state(State::Failed);
                Err(err)
            }
        }
    }

    async fn run_start<W>(
        &self,
        task: &mut Task,
        cancel: &CancellationToken,
        progress: &mut W,
    ) -> Result<(), TaskError>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let runtime = self.connect(cancel).await?;

        let image = task.spec().image().to_string();
        self.pull(runtime.as_ref(), &image, cancel, progress).await?;

        let config = new_config(task.spec());
        let container_id = self
            .call(cancel, runtime.create_container(&config))
            .await
            .map_err(|source| TaskError::ContainerCreate {
                image: image.clone(),
                source,
            })?;
        task.status_mut().set_container_id(container_id.clone());
        debug!(container_id = %container_id, "container created");

        if let Err(source) = self.call(cancel, runtime.start_container(&container_id)).await {
            if self.config.remove_on_start_failure {
                self.discard(runtime.as_ref(), &container_id).await;
            }
            return Err(TaskError::ContainerStart {
                container_id,
                source,
            });
        }

        Ok(())
    }

    async fn pull<W>(
        &self,
        runtime: &dyn ContainerRuntime,
        image: &str,
        cancel: &CancellationToken,
        progress: &mut W,
    ) -> Result<(), TaskError>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut stream = self
            .call(cancel, runtime.pull_image(image))
            .await
            .map_err(|source| TaskError::ImagePull {
                image: image.to_string(),
                source,
            })?;

        let drain = async {
            while let Some(item) = stream.next().await {
                let mut line = item?.line();
                line.push('\n');
                progress.write_all(line.as_bytes()).await?;
            }
            progress.flush().await?;
            Ok::<(), RuntimeError>(())
        };

        self.call(cancel, drain)
            .await
            .map_err(|source| TaskError::ImagePullStream {
                image: image.to_string(),
                source,
            })?;
        debug!("image pulled");
        Ok(())
    }

    /// Best-effort removal of a container that never started. Runs even when the
    /// start was cancelled, bounded only by the call timeout.
    async fn discard(&self, runtime: &dyn ContainerRuntime, container_id: &str) {
        let never = CancellationToken::new();
        match self.call(&never, runtime.remove_container(container_id)).await {
            Ok(()) => info!(container_id = %container_id, "removed container that failed to start"),
            Err(err) => warn!(
                container_id = %container_id,
                error = %err,
                "could not remove container that failed to start"
            ),
        }
    }

    /// Stops a `Running` task.
    ///
    /// Stopping a `Completed` task is a no-op. A failed stop is returned and recorded
    /// on the status, but the task stays `Running` so the stop can be retried.
    #[tracing::instrument(
        skip_all,
        fields(task_id = %task.id, container_id = %task.container_id())
    )]
    pub async fn stop(&self, task: &mut Task, cancel: &CancellationToken) -> Result<(), TaskError> {
        match task.state() {
            State::Running => {}
            State::Completed => {
                debug!("task already completed");
                return Ok(());
            }
            from => {
                warn!(state = %from, "refusing to stop task that is not running");
                return Err(TaskError::InvalidTransition {
                    from,
                    to: State::Completed,
                });
            }
        }
        if task.container_id().is_empty() {
            return Err(TaskError::NoContainer);
        }

        let container_id = task.container_id().to_string();
        let result = async {
            let runtime = self.connect(cancel).await?;
            self.call(
                cancel,
                runtime.stop_container(&container_id, self.config.stop_grace()),
            )
            .await
            .map_err(|source| TaskError::ContainerStop {
                container_id: container_id.clone(),
                source,
            })
        }
        .await;

        let status = task.status_mut();
        match result {
            Ok(()) => {
                status.clear_failure();
                status.set_state(State::Completed);
                info!("task completed");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "task failed to stop");
                status.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Force-removes the task's container. The task state is left as is; a task
    /// that is still `Running` must be stopped first.
    #[tracing::instrument(
        skip_all,
        fields(task_id = %task.id, container_id = %task.container_id())
    )]
    pub async fn remove(&self, task: &Task, cancel: &CancellationToken) -> Result<(), TaskError> {
        if task.container_id().is_empty() {
            return Err(TaskError::NoContainer);
        }
        if task.state() == State::Running {
            return Err(TaskError::StillRunning {
                container_id: task.container_id().to_string(),
            });
        }

        let runtime = self.connect(cancel).await?;
        self.call(cancel, runtime.remove_container(task.container_id()))
            .await
            .map_err(|source| TaskError::ContainerRemove {
                container_id: task.container_id().to_string(),
                source,
            })?;
        info!("container removed");
        Ok(())
    }

    /// The runtime's own view of the task's container: `Some("running")`,
    /// `Some("exited")`, ... or `None` when the runtime does not know it.
    pub async fn observe(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, TaskError> {
        if task.container_id().is_empty() {
            return Ok(None);
        }

        let runtime = self.connect(cancel).await?;
        let containers = self
            .call(cancel, runtime.list_containers(true))
            .await
            .map_err(|source| TaskError::ContainerList { source })?;

        Ok(containers
            .into_iter()
            .find(|c| c.id == task.container_id())
            .map(|c| c.state))
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<Box<dyn ContainerRuntime>, TaskError> {
        self.call(cancel, self.connector.connect())
            .await
            .map_err(|source| TaskError::RuntimeConnect { source })
    }

    async fn call<T, F>(&self, cancel: &CancellationToken, fut: F) -> RuntimeResult<T>
    where
        F: Future<Output = RuntimeResult<T>>,
    {
        guarded(cancel, self.config.call_timeout(), fut).await
    }
}

/// Races a runtime call against cancellation and an optional deadline.
async fn guarded<T, F>(
    cancel: &CancellationToken,
    deadline: Option<Duration>,
    fut: F,
) -> RuntimeResult<T>
where
    F: Future<Output = RuntimeResult<T>>,
{
    let bounded = async {
        match deadline {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(res) => res,
                Err(_) => Err(RuntimeError::TimedOut(limit)),
            },
            None => fut.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RuntimeError::Cancelled),
        res = bounded => res,
    }
}

impl Task {
    pub async fn start<C: Connector>(
        &mut self,
        lifecycle: &Lifecycle<C>,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        lifecycle.start(self, cancel).await
    }

    pub async fn stop<C: Connector>(
        &mut self,
        lifecycle: &Lifecycle<C>,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        lifecycle.stop(self, cancel).await
    }

    pub async fn remove<C: Connector>(
        &self,
        lifecycle: &Lifecycle<C>,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        lifecycle.remove(self, cancel).await
    }
}
