use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::path::PathBuf;
use tokio::sync::oneshot;

use crate::Error;

mod dummy;
mod from_addr;
#[cfg(unix)]
mod local;

pub use dummy::DummyExecutor;
pub use from_addr::from_addr;
#[cfg(unix)]
pub use local::LocalExecutor;

/// Everything needed to start a build command.
#[derive(Clone, Debug)]
pub struct ExecRequest {
    /// The shell command to run.
    pub command: String,
    /// Directory the command runs in. Created if it doesn't exist yet.
    pub work_dir: PathBuf,
    /// Additional environment variables.
    pub env: Vec<(String, String)>,
}

/// Combined stdout and stderr of a build, in the order it was written.
pub type OutputStream = BoxStream<'static, std::io::Result<Bytes>>;

/// How a build process ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The process exited. `code` is None if it was killed by a signal.
    Exited { code: Option<i32> },
    /// Waiting for the process failed.
    Failed(String),
}

impl Completion {
    pub fn success(&self) -> bool {
        matches!(self, Completion::Exited { code: Some(0) })
    }
}

/// A started build command.
pub struct RunningBuild {
    /// Output is only read from the process as this stream is polled.
    pub output: OutputStream,
    /// Fires exactly once, after the process exited.
    pub exit: oneshot::Receiver<Completion>,
}

#[async_trait]
pub trait BuildExecutor: Send + Sync {
    /// Starts the command described by the request and returns immediately.
    /// If the command can't be started, [Error::SpawnFailed] is returned.
    async fn run(&self, request: ExecRequest) -> Result<RunningBuild, Error>;
}

#[async_trait]
impl<A> BuildExecutor for A
where
    A: AsRef<dyn BuildExecutor> + Send + Sync,
{
    async fn run(&self, request: ExecRequest) -> Result<RunningBuild, Error> {
        self.as_ref().run(request).await
    }
}
