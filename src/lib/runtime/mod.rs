pub mod docker;
pub mod types;

pub use docker::{DockerConnector, DockerRuntime};
