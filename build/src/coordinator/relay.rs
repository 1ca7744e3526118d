use bytes::Bytes;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use remake_store::artifactstore::{ArtifactStore, AttachmentReader};
use remake_store::{BuildId, BuildStatus, Revision, OCTET_STREAM, OUTPUT_ATTACHMENT};

use super::OUTPUT_FILE;
use crate::executor::{Completion, OutputStream, RunningBuild};
use crate::Error;

/// How long to wait for more output once the process exited.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Upper bound of output forwarded once the process exited.
const DRAIN_LIMIT: usize = 1024 * 1024;

fn lost_exit(completion: Result<Completion, oneshot::error::RecvError>) -> Completion {
    completion.unwrap_or_else(|_| Completion::Failed("exit status got lost".to_string()))
}

/// Forwards the output of one running build to its caller, and records the
/// outcome once the process is done.
pub(super) struct Relay {
    store: Arc<dyn ArtifactStore>,
    id: BuildId,
    rev: Revision,
    work_dir: PathBuf,
    /// Set once something went wrong. The build can't succeed anymore.
    failure: Option<Error>,
}

impl Relay {
    pub(super) fn new(
        store: Arc<dyn ArtifactStore>,
        id: BuildId,
        rev: Revision,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            id,
            rev,
            work_dir,
            failure: None,
        }
    }

    /// Moves the record to running. If that fails, the build keeps going, but
    /// will end up failed.
    pub(super) async fn mark_running(&mut self) {
        match self
            .store
            .update_status(&self.id, &self.rev, BuildStatus::Running)
            .await
        {
            Ok(rev) => self.rev = rev,
            Err(e) => {
                warn!(err=%e, "unable to mark build as running");
                self.failure = Some(e.into());
            }
        }
    }

    pub(super) async fn run(mut self, running: RunningBuild, tx: mpsc::Sender<Bytes>) {
        let RunningBuild { mut output, mut exit } = running;
        let mut caller = Caller(Some(tx));

        if let Some(e) = &self.failure {
            caller.send(Bytes::from(e.diagnostic())).await;
        }

        // The process exiting ends the build, not the pipe closing. Anything
        // it left behind in the background may hold the pipe open for longer.
        // None means the pipe ended first, and exit is still to be awaited.
        let completion = loop {
            tokio::select! {
                chunk = output.next() => match chunk {
                    Some(Ok(chunk)) => caller.send(chunk).await,
                    Some(Err(e)) => {
                        self.stream_failed(e, &mut caller).await;
                        break None;
                    }
                    None => break None,
                },
                completion = &mut exit => {
                    self.drain(&mut output, &mut caller).await;
                    break Some(lost_exit(completion));
                }
            }
        };
        // Close our end. If something is still writing, it'll notice.
        drop(output);

        let completion = match completion {
            Some(completion) => completion,
            None => lost_exit(exit.await),
        };

        let status = match self.finish(completion).await {
            Ok(status) => status,
            Err(e) => {
                caller.send(Bytes::from(e.diagnostic())).await;
                self.failure.get_or_insert(e);
                BuildStatus::Failed
            }
        };

        match self
            .store
            .update_status(&self.id, &self.rev, status)
            .await
        {
            Ok(_) => info!(build.status=%status, "build finished"),
            Err(e) => {
                warn!(err=%e, build.status=%status, "unable to record final status");
                caller.send(Bytes::from(Error::from(e).diagnostic())).await;
            }
        }

        // `caller` is dropped here, which ends the live output.
    }

    /// Forwards what the exited process left in the pipe. Stops at EOF, once
    /// nothing arrived for [DRAIN_GRACE], or after [DRAIN_LIMIT] bytes.
    async fn drain(&mut self, output: &mut OutputStream, caller: &mut Caller) {
        let mut drained = 0;
        while drained < DRAIN_LIMIT {
            match tokio::time::timeout(DRAIN_GRACE, output.next()).await {
                Ok(Some(Ok(chunk))) => {
                    drained += chunk.len();
                    caller.send(chunk).await;
                }
                Ok(Some(Err(e))) => return self.stream_failed(e, caller).await,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        debug!(drained, "output still open after exit, detaching");
    }

    async fn stream_failed(&mut self, e: std::io::Error, caller: &mut Caller) {
        warn!(err=%e, "output stream broke");
        let e = Error::StreamError(e.to_string());
        caller.send(Bytes::from(e.diagnostic())).await;
        self.failure.get_or_insert(e);
    }

    /// Determines the final status, uploading the artifact if the command
    /// succeeded.
    async fn finish(&mut self, completion: Completion) -> Result<BuildStatus, Error> {
        if self.failure.is_some() {
            return Ok(BuildStatus::Failed);
        }

        match completion {
            Completion::Exited { code: Some(0) } => {
                self.store_output().await.inspect_err(|e| {
                    warn!(err=%e, "unable to store output");
                })?;
                Ok(BuildStatus::Succeeded)
            }
            Completion::Exited { code } => {
                debug!(?code, "build command failed");
                Ok(BuildStatus::Failed)
            }
            Completion::Failed(msg) => Err(Error::StreamError(msg)),
        }
    }

    /// Uploads the artifact the command left in the work dir. If it didn't
    /// leave one, an empty one is stored.
    async fn store_output(&mut self) -> Result<(), Error> {
        let path = self.work_dir.join(OUTPUT_FILE);

        let reader: AttachmentReader = match tokio::fs::File::open(&path).await {
            Ok(f) => Box::new(f),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no output produced");
                Box::new(std::io::Cursor::new(Vec::new()))
            }
            Err(e) => {
                return Err(Error::StreamError(format!("unable to open output: {}", e)));
            }
        };

        self.rev = self
            .store
            .store_attachment(&self.id, &self.rev, OUTPUT_ATTACHMENT, OCTET_STREAM, reader)
            .await?;

        Ok(())
    }
}

/// The receiving side of the live output. Once the caller is gone, output is
/// discarded, but the build carries on.
struct Caller(Option<mpsc::Sender<Bytes>>);

impl Caller {
    async fn send(&mut self, chunk: Bytes) {
        if let Some(tx) = &self.0 {
            // waits while the caller's buffer is full.
            if tx.send(chunk).await.is_err() {
                debug!("caller went away, continuing build");
                self.0 = None;
            }
        }
    }
}
