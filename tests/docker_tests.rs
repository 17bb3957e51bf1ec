//! Runs against a live Docker engine: `cargo test -- --ignored`.

use std::time::Duration;

use cube_task::runtime::DockerConnector;
use cube_task::{Config, ErrorKind, Lifecycle, State, Task, TaskSpec};
use tokio_util::sync::CancellationToken;

fn lifecycle() -> Lifecycle<DockerConnector> {
    let config = Config::from_env().unwrap();
    Lifecycle::new(DockerConnector::new(config.clone()), config)
}

#[tokio::test]
#[ignore = "needs a docker engine"]
async fn start_stop_task() {
    let lifecycle = lifecycle();
    let cancel = CancellationToken::new();
    let mut task = Task::new(TaskSpec::new("alpine:latest", ["sleep", "5"]));

    task.start(&lifecycle, &cancel).await.unwrap();
    assert_eq!(task.state(), State::Running);
    assert_ne!(task.container_id(), "");
    assert_eq!(
        lifecycle.observe(&task, &cancel).await.unwrap().as_deref(),
        Some("running")
    );

    task.stop(&lifecycle, &cancel).await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(task.state(), State::Completed);
    assert_eq!(
        lifecycle.observe(&task, &cancel).await.unwrap().as_deref(),
        Some("exited")
    );

    task.remove(&lifecycle, &cancel).await.unwrap();
    assert_eq!(lifecycle.observe(&task, &cancel).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "needs a docker engine"]
async fn stop_after_container_exited_on_its_own() {
    let lifecycle = lifecycle();
    let cancel = CancellationToken::new();
    let mut task = Task::new(TaskSpec::new("alpine:latest", ["true"]));

    task.start(&lifecycle, &cancel).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        lifecycle.observe(&task, &cancel).await.unwrap().as_deref(),
        Some("exited")
    );

    task.stop(&lifecycle, &cancel).await.unwrap();
    assert_eq!(task.state(), State::Completed);

    task.remove(&lifecycle, &cancel).await.unwrap();
}

#[tokio::test]
#[ignore = "needs a docker engine"]
async fn missing_image_fails_task() {
    let lifecycle = lifecycle();
    let mut task = Task::new(TaskSpec::new(
        "localhost:1/cube-task/does-not-exist:latest",
        ["true"],
    ));

    let err = lifecycle
        .start_with_progress(&mut task, &CancellationToken::new(), &mut tokio::io::sink())
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind(),
        ErrorKind::ImagePull | ErrorKind::ImagePullStream
    ));
    assert_eq!(task.state(), State::Failed);
    assert_eq!(task.container_id(), "");
}
