use std::time::Duration;

use async_trait::async_trait;
use bollard::{
    API_DEFAULT_VERSION, Docker,
    container::{
        Config as ContainerCreateConfig, CreateContainerOptions, ListContainersOptions,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    errors::Error as BollardError,
    image::CreateImageOptions,
    models::CreateImageInfo,
};
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::types::{
    Connector, ContainerConfig, ContainerRuntime, ContainerSummary, ProgressStream, PullProgress,
    RuntimeError, RuntimeResult,
};
use crate::config::Config;

const PULL_BUFFER: usize = 64;

/// Connects to a Docker engine as described by [`Config`].
#[derive(Debug, Clone)]
pub struct DockerConnector {
    config: Config,
}

impl DockerConnector {
    pub fn new(config: Config) -> Self {
        DockerConnector { config }
    }
}

#[async_trait]
impl Connector for DockerConnector {
    async fn connect(&self) -> RuntimeResult<Box<dyn ContainerRuntime>> {
        let runtime = DockerRuntime::connect(&self.config).await?;
        Ok(Box::new(runtime))
    }
}

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Opens a client and negotiates the API version with the engine, so an
    /// unreachable engine fails here rather than on the first real call.
    pub async fn connect(config: &Config) -> RuntimeResult<Self> {
        let client = match &config.docker_socket {
            Some(socket) => {
                debug!(socket = %socket, "connecting to docker over unix socket");
                Docker::connect_with_unix(socket, config.connect_timeout_secs, API_DEFAULT_VERSION)?
            }
            None => {
                debug!("connecting to docker with local defaults");
                Docker::connect_with_local_defaults()?
                    .with_timeout(Duration::from_secs(config.connect_timeout_secs))
            }
        };
        let client = client.negotiate_version().await?;

        Ok(DockerRuntime { client })
    }
}

fn from_bollard(err: BollardError, container_id: &str) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(container_id.to_string()),
        err => RuntimeError::Docker(err),
    }
}

/// 304 on stop means the container was not running, which counts as stopped.
fn stop_outcome(res: Result<(), BollardError>, container_id: &str) -> RuntimeResult<()> {
    match res {
        Ok(()) => Ok(()),
        Err(BollardError::DockerResponseServerError {
            status_code: 304, ..
        }) => {
            debug!(container_id = %container_id, "container already stopped");
            Ok(())
        }
        Err(e) => Err(from_bollard(e, container_id)),
    }
}

fn stop_options(grace: Option<Duration>) -> Option<StopContainerOptions> {
    grace.map(|grace| StopContainerOptions {
        t: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
    })
}

/// The engine reports some pull failures inside a successful response, as a
/// progress message carrying `error`/`errorDetail`.
fn progress_item(msg: Result<CreateImageInfo, BollardError>) -> RuntimeResult<PullProgress> {
    let info = msg?;
    let error = info
        .error
        .or_else(|| info.error_detail.and_then(|detail| detail.message));
    if let Some(error) = error {
        return Err(RuntimeError::Other(error));
    }
    Ok(PullProgress {
        id: info.id,
        status: info.status,
        progress: info.progress,
    })
}

/// Waits for the first progress message: an error there is a rejected pull and is
/// returned as such; the remaining messages are handed back as a stream.
async fn split_first<S>(mut pull: S) -> RuntimeResult<ProgressStream>
where
    S: Stream<Item = RuntimeResult<PullProgress>> + Unpin + Send + 'static,
{
    let first = match pull.next().await {
        Some(Ok(first)) => first,
        Some(Err(e)) => return Err(e),
        None => return Ok(stream::empty().boxed()),
    };
    Ok(stream::once(async move { Ok(first) }).chain(pull).boxed())
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, image: &str) -> RuntimeResult<ProgressStream> {
        info!(image = %image, "pulling image");

        // The engine stream borrows the client, so it is pumped from its own task and
        // handed back as an owned stream.
        let (tx, mut rx) = mpsc::channel(PULL_BUFFER);
        let client = self.client.clone();
        let from_image = image.to_string();
        tokio::spawn(async move {
            let mut stream = client.create_image(
                Some(CreateImageOptions {
                    from_image,
                    ..Default::default()
                }),
                None,
                None,
            );
            while let Some(msg) = stream.next().await {
                let item = progress_item(msg);
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        let received = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        split_first(received.boxed()).await
    }

    async fn create_container(&self, config: &ContainerConfig) -> RuntimeResult<String> {
        let options = config.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            ..Default::default()
        });
        let container_config = ContainerCreateConfig {
            image: Some(config.image.clone()),
            cmd: config.cmd.clone(),
            ..Default::default()
        };

        let resp = self
            .client
            .create_container(options, container_config)
            .await?;
        debug!(container_id = %resp.id, "container created");
        Ok(resp.id)
    }

    async fn start_container(&self, container_id: &str) -> RuntimeResult<()> {
        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| from_bollard(e, container_id))
    }

    async fn stop_container(
        &self,
        container_id: &str,
        grace: Option<Duration>,
    ) -> RuntimeResult<()> {
        let res = self
            .client
            .stop_container(container_id, stop_options(grace))
            .await;
        stop_outcome(res, container_id)
    }

    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerSummary>> {
        let containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    state: c.state.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn remove_container(&self, container_id: &str) -> RuntimeResult<()> {
        self.client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| from_bollard(e, container_id))
    }
}
