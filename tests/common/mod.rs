#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cube_task::runtime::types::{
    Connector, ContainerConfig, ContainerRuntime, ContainerSummary, ProgressStream, PullProgress,
    RuntimeError, RuntimeResult,
};
use cube_task::{Config, Lifecycle};
use futures_util::stream::{self, StreamExt};

// ─── Fake Engine ───

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Connect,
    PullRejected,
    PullBreaks,
    PullHangs,
    Create,
    Start,
    StartHangs,
    Stop,
    StopHangs,
    Remove,
    List,
}

#[derive(Debug, Clone)]
struct Container {
    id: String,
    name: Option<String>,
    image: String,
    cmd: Option<Vec<String>>,
    state: String,
}

#[derive(Debug, Default)]
struct Inner {
    images: HashSet<String>,
    containers: Vec<Container>,
    faults: HashSet<Fault>,
    calls: Vec<String>,
    created: u64,
}

/// In-memory container engine. Clones share state, so a test keeps one handle
/// while the lifecycle controller connects through another.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    inner: Arc<Mutex<Inner>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_images(["alpine:latest", "busybox:1.36"])
    }

    pub fn with_images<I, S>(images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engine = FakeEngine::default();
        engine.inner.lock().unwrap().images = images.into_iter().map(Into::into).collect();
        engine
    }

    pub fn fail(&self, fault: Fault) {
        self.inner.lock().unwrap().faults.insert(fault);
    }

    pub fn heal(&self, fault: Fault) {
        self.inner.lock().unwrap().faults.remove(&fault);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn state_of(&self, id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.state.clone())
    }

    pub fn cmd_of(&self, id: &str) -> Option<Option<Vec<String>>> {
        let inner = self.inner.lock().unwrap();
        inner.containers.iter().find(|c| c.id == id).map(|c| c.cmd.clone())
    }

    pub fn name_of(&self, id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.containers.iter().find(|c| c.id == id).and_then(|c| c.name.clone())
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().unwrap().containers.len()
    }

    /// The container's process finished by itself.
    pub fn exit(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(c) = inner.containers.iter_mut().find(|c| c.id == id) {
            c.state = "exited".to_string();
        }
    }

    fn enter(&self, call: String) -> HashSet<Fault> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        inner.faults.clone()
    }
}

#[async_trait]
impl Connector for FakeEngine {
    async fn connect(&self) -> RuntimeResult<Box<dyn ContainerRuntime>> {
        let faults = self.enter("connect".to_string());
        if faults.contains(&Fault::Connect) {
            return Err(RuntimeError::Other(
                "Cannot connect to the Docker daemon at unix:///var/run/docker.sock".to_string(),
            ));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl ContainerRuntime for FakeEngine {
    async fn pull_image(&self, image: &str) -> RuntimeResult<ProgressStream> {
        let faults = self.enter(format!("pull {image}"));
        let known = self.inner.lock().unwrap().images.contains(image);
        if faults.contains(&Fault::PullRejected) || !known {
            return Err(RuntimeError::Other(format!(
                "pull access denied for {image}, repository does not exist"
            )));
        }
        if faults.contains(&Fault::PullHangs) {
            return Ok(stream::pending().boxed());
        }

        let mut items = vec![
            Ok(PullProgress::status(format!("Pulling from {image}"))),
            Ok(PullProgress {
                id: Some("43c4264eed91".to_string()),
                status: Some("Downloading".to_string()),
                progress: Some("[=====>    ] 1.8MB/3.6MB".to_string()),
            }),
        ];
        if faults.contains(&Fault::PullBreaks) {
            items.push(Err(RuntimeError::Other("unexpected EOF".to_string())));
        } else {
            items.push(Ok(PullProgress {
                id: Some("43c4264eed91".to_string()),
                status: Some("Pull complete".to_string()),
                progress: None,
            }));
        }
        Ok(stream::iter(items).boxed())
    }

    async fn create_container(&self, config: &ContainerConfig) -> RuntimeResult<String> {
        let faults = self.enter(format!("create {}", config.image));
        if faults.contains(&Fault::Create) {
            return Err(RuntimeError::Other("No such image".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.created += 1;
        let id = format!("{:012x}", 0xc0ffee_u64 + inner.created);
        inner.containers.push(Container {
            id: id.clone(),
            name: config.name.clone(),
            image: config.image.clone(),
            cmd: config.cmd.clone(),
            state: "created".to_string(),
        });
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> RuntimeResult<()> {
        let faults = self.enter(format!("start {container_id}"));
        if faults.contains(&Fault::Start) {
            return Err(RuntimeError::Other("OCI runtime create failed".to_string()));
        }
        if faults.contains(&Fault::StartHangs) {
            std::future::pending::<()>().await;
        }
        self.set_state(container_id, "running")
    }

    async fn stop_container(
        &self,
        container_id: &str,
        grace: Option<Duration>,
    ) -> RuntimeResult<()> {
        let call = match grace {
            Some(grace) => format!("stop {container_id} t={}", grace.as_secs()),
            None => format!("stop {container_id}"),
        };
        let faults = self.enter(call);
        if faults.contains(&Fault::Stop) {
            return Err(RuntimeError::Other("tried to kill container, but did not receive an exit event".to_string()));
        }
        if faults.contains(&Fault::StopHangs) {
            std::future::pending::<()>().await;
        }
        self.set_state(container_id, "exited")
    }

    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerSummary>> {
        let faults = self.enter(format!("list all={all}"));
        if faults.contains(&Fault::List) {
            return Err(RuntimeError::Other("list failed".to_string()));
        }
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .containers
            .iter()
            .filter(|c| all || c.state == "running")
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                state: c.state.clone(),
            })
            .collect())
    }

    async fn remove_container(&self, container_id: &str) -> RuntimeResult<()> {
        let faults = self.enter(format!("remove {container_id}"));
        if faults.contains(&Fault::Remove) {
            return Err(RuntimeError::Other("removal already in progress".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        let before = inner.containers.len();
        inner.containers.retain(|c| c.id != container_id);
        if inner.containers.len() == before {
            return Err(RuntimeError::NotFound(container_id.to_string()));
        }
        Ok(())
    }
}

impl FakeEngine {
    fn set_state(&self, container_id: &str, state: &str) -> RuntimeResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.containers.iter_mut().find(|c| c.id == container_id) {
            Some(c) => {
                c.state = state.to_string();
                Ok(())
            }
            None => Err(RuntimeError::NotFound(container_id.to_string())),
        }
    }
}

pub fn lifecycle(engine: &FakeEngine) -> Lifecycle<FakeEngine> {
    Lifecycle::new(engine.clone(), Config::default())
}

pub fn lifecycle_with(engine: &FakeEngine, config: Config) -> Lifecycle<FakeEngine> {
    Lifecycle::new(engine.clone(), config)
}
