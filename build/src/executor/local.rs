use async_trait::async_trait;
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::net::unix::pipe;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn, Instrument};

use super::{BuildExecutor, Completion, ExecRequest, RunningBuild};
use crate::Error;

const DEFAULT_SHELL: &str = "/bin/sh";

/// Runs build commands as child processes on this machine, through a shell.
///
/// Both stdout and stderr of the child are connected to the write end of a
/// single pipe, so whatever the command prints arrives in the order it was
/// written, regardless of the stream it was written to.
pub struct LocalExecutor {
    shell: PathBuf,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl LocalExecutor {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

fn spawn_failed(e: std::io::Error) -> Error {
    Error::SpawnFailed(e.to_string())
}

#[async_trait]
impl BuildExecutor for LocalExecutor {
    #[instrument(skip_all, fields(work_dir=?request.work_dir, shell=?self.shell), err)]
    async fn run(&self, request: ExecRequest) -> Result<RunningBuild, Error> {
        tokio::fs::create_dir_all(&request.work_dir)
            .await
            .map_err(|e| Error::SpawnFailed(format!("unable to create work dir: {}", e)))?;

        let (tx, rx) = pipe::pipe().map_err(spawn_failed)?;
        // the child gets blocking file descriptors, only our end is async.
        let stdout = tx.into_blocking_fd().map_err(spawn_failed)?;
        let stderr = stdout.try_clone().map_err(spawn_failed)?;

        let mut child = {
            let mut command = Command::new(&self.shell);
            command
                .arg("-c")
                .arg(&request.command)
                .current_dir(&request.work_dir)
                .envs(request.env.iter().map(|(k, v)| (k, v)))
                .stdin(Stdio::null())
                .stdout(Stdio::from(stdout))
                .stderr(Stdio::from(stderr));

            // Dropping `command` at the end of this block closes our copies of
            // the write end, so the reader sees EOF once the child is done.
            command
                .spawn()
                .map_err(|e| Error::SpawnFailed(format!("{}: {}", self.shell.display(), e)))?
        };

        debug!(pid = ?child.id(), "spawned build command");

        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(
            async move {
                let completion = match child.wait().await {
                    Ok(status) => Completion::Exited {
                        code: status.code(),
                    },
                    Err(e) => {
                        warn!(err=%e, "failed to wait for build command");
                        Completion::Failed(e.to_string())
                    }
                };
                debug!(?completion, "build command exited");

                // the receiver might be gone already, that's fine.
                let _ = exit_tx.send(completion);
            }
            .in_current_span(),
        );

        Ok(RunningBuild {
            output: ReaderStream::new(rx).boxed(),
            exit: exit_rx,
        })
    }
}
