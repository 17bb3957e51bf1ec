use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cube_task::{
    Config, Lifecycle, Task, TaskSpec,
    runtime::{DockerConnector, DockerRuntime, types::ContainerRuntime},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cube-task", version, about = "Run a single task as a container")]
struct Cli {
    /// Docker engine unix socket (defaults to DOCKER_HOST / the local socket)
    #[arg(long, env = "CUBE_DOCKER_SOCKET", global = true)]
    docker_socket: Option<String>,

    /// Deadline in seconds for each engine call
    #[arg(long, global = true)]
    call_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a task, wait, then stop it
    Run {
        #[arg(long)]
        image: String,

        /// Container name
        #[arg(long)]
        name: Option<String>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        stop_after: Option<u64>,

        /// Grace period in seconds before the engine kills the container
        #[arg(long)]
        stop_grace: Option<u64>,

        /// Remove the container once the task is over
        #[arg(long)]
        remove: bool,

        /// Command to run instead of the image default
        #[arg(last = true)]
        cmd: Vec<String>,
    },
    /// List containers known to the engine
    Ps {
        /// Include containers that are not running
        #[arg(short, long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cube_task=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if cli.docker_socket.is_some() {
        config.docker_socket = cli.docker_socket.clone();
    }
    if cli.call_timeout.is_some() {
        config.call_timeout_secs = cli.call_timeout;
    }

    match cli.command {
        Command::Run {
            image,
            name,
            stop_after,
            stop_grace,
            remove,
            cmd,
        } => {
            if stop_grace.is_some() {
                config.stop_grace_secs = stop_grace;
            }
            let mut spec = TaskSpec::new(image, cmd);
            if let Some(name) = name {
                spec = spec.with_name(name);
            }
            run(config, Task::new(spec), stop_after, remove).await
        }
        Command::Ps { all } => ps(config, all).await,
    }
}

async fn run(config: Config, mut task: Task, stop_after: Option<u64>, remove: bool) -> Result<()> {
    let lifecycle = Lifecycle::new(DockerConnector::new(config.clone()), config);

    let cancel = cancel_on_ctrl_c();
    let started = lifecycle
        .start_with_progress(&mut task, &cancel, &mut tokio::io::stderr())
        .await;
    print_snapshot(&task)?;
    if let Err(err) = started {
        if remove && leftover_container(&task, lifecycle.config()) {
            if let Err(remove_err) = lifecycle.remove(&task, &CancellationToken::new()).await {
                warn!(error = %remove_err, "failed to remove container");
            }
        }
        return Err(err).context("task failed to start");
    }

    match stop_after {
        Some(secs) => {
            info!(secs, "stopping task after delay");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = cancel.cancelled() => {}
            }
        }
        None => {
            info!("task running, press Ctrl-C to stop");
            cancel.cancelled().await;
        }
    }

    // The start token is spent by now; a second Ctrl-C interrupts the stop.
    let stop = cancel_on_ctrl_c();
    lifecycle
        .stop(&mut task, &stop)
        .await
        .context("task failed to stop")?;
    print_snapshot(&task)?;

    if remove {
        lifecycle.remove(&task, &stop).await?;
    }
    Ok(())
}

/// Whether a failed start left a container behind. With `remove_on_start_failure`
/// the controller has already removed it.
fn leftover_container(task: &Task, config: &Config) -> bool {
    !config.remove_on_start_failure && !task.container_id().is_empty()
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

async fn ps(config: Config, all: bool) -> Result<()> {
    let runtime = DockerRuntime::connect(&config)
        .await
        .context("failed to connect to docker")?;
    let containers = runtime.list_containers(all).await?;

    println!("{:<12}  STATE", "CONTAINER ID");
    for container in containers {
        let short = container.id.get(..12).unwrap_or(&container.id);
        println!("{:<12}  {}", short, container.state);
    }
    Ok(())
}

fn print_snapshot(task: &Task) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(task)?);
    Ok(())
}
