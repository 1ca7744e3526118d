use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info_span, instrument, warn, Instrument, Span};

use remake_store::artifactstore::{ArtifactStore, AttachmentReader};
use remake_store::{BuildId, BuildStatus, Revision, INPUT_ATTACHMENT, OCTET_STREAM};

use crate::executor::{BuildExecutor, ExecRequest};
use crate::Error;

mod relay;

use relay::Relay;

/// Name of the file inside the work dir the input bundle is written to.
pub const INPUT_FILE: &str = "input";

/// Name of the file inside the work dir the command writes its artifact to.
pub const OUTPUT_FILE: &str = "output";

/// Number of output chunks buffered for a caller before reading from the
/// build process pauses.
pub const DEFAULT_RELAY_BUFFER: usize = 16;

/// The shared secret clients need to present to submit builds.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub secret: Secret,
    /// Each build gets its own directory below this one.
    pub work_dir_root: PathBuf,
    pub relay_buffer: usize,
}

impl CoordinatorConfig {
    pub fn new(secret: Secret, work_dir_root: impl Into<PathBuf>) -> Self {
        Self {
            secret,
            work_dir_root: work_dir_root.into(),
            relay_buffer: DEFAULT_RELAY_BUFFER,
        }
    }
}

pub struct SubmitRequest {
    pub secret: String,
    pub command: String,
    pub prefix: String,
    /// The source bundle.
    pub input: AttachmentReader,
}

/// An accepted build.
pub struct Submission {
    pub id: BuildId,
    /// Live output of the build. Ends once the build record reached its
    /// final status.
    pub output: ReceiverStream<Bytes>,
}

/// Takes build submissions, and drives them to completion.
///
/// The steps of a submission happen strictly in order: the record is created,
/// the input is stored, and only then the command is started. Its output is
/// relayed by a background task, which also records the outcome.
pub struct BuildCoordinator {
    config: CoordinatorConfig,
    store: Arc<dyn ArtifactStore>,
    executor: Arc<dyn BuildExecutor>,
}

impl BuildCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn ArtifactStore>,
        executor: Arc<dyn BuildExecutor>,
    ) -> Self {
        Self {
            config,
            store,
            executor,
        }
    }

    pub fn work_dir_for(&self, id: &BuildId) -> PathBuf {
        self.config.work_dir_root.join(id.to_string())
    }

    /// Accepts a build.
    ///
    /// Errors before the command got started are returned here, and leave
    /// no running build behind. Once this returned successfully, the build
    /// continues in the background, even if [Submission::output] is dropped.
    #[instrument(skip_all, fields(build.id, build.command=%request.command, build.prefix=%request.prefix), err)]
    pub async fn submit(&self, request: SubmitRequest) -> Result<Submission, Error> {
        if !self.config.secret.matches(&request.secret) {
            warn!("rejecting submission with invalid secret");
            return Err(Error::Unauthorized);
        }

        let id = BuildId::new();
        Span::current().record("build.id", id.to_string());

        let rev = self
            .store
            .create_record(&id, &request.command, &request.prefix)
            .await?;

        let work_dir = self.work_dir_for(&id);
        let rev = self
            .store_input(&id, &rev, &work_dir, request.input)
            .await?;
        debug!("stored input");

        let exec_request = ExecRequest {
            command: request.command,
            work_dir: work_dir.clone(),
            env: vec![
                ("BUILD_ID".to_string(), id.to_string()),
                ("BUILD_PREFIX".to_string(), request.prefix),
                (
                    "BUILD_INPUT".to_string(),
                    work_dir.join(INPUT_FILE).to_string_lossy().into_owned(),
                ),
                (
                    "BUILD_OUTPUT".to_string(),
                    work_dir.join(OUTPUT_FILE).to_string_lossy().into_owned(),
                ),
            ],
        };

        let running = match self.executor.run(exec_request).await {
            Ok(running) => running,
            Err(e) => {
                // nothing ran, but the record must not stay pending.
                if let Err(update_err) = self
                    .store
                    .update_status(&id, &rev, BuildStatus::Failed)
                    .await
                {
                    warn!(err=%update_err, "unable to mark build as failed");
                }
                return Err(e);
            }
        };

        let mut relay = Relay::new(self.store.clone(), id, rev, work_dir);
        relay.mark_running().await;

        let (tx, rx) = mpsc::channel(self.config.relay_buffer.max(1));
        tokio::spawn(
            relay
                .run(running, tx)
                .instrument(info_span!("relay", build.id=%id)),
        );

        Ok(Submission {
            id,
            output: ReceiverStream::new(rx),
        })
    }

    /// Writes the input into the work dir, and then stores it as attachment
    /// from there.
    async fn store_input(
        &self,
        id: &BuildId,
        rev: &Revision,
        work_dir: &Path,
        mut input: AttachmentReader,
    ) -> Result<Revision, Error> {
        let input_path = work_dir.join(INPUT_FILE);

        tokio::fs::create_dir_all(work_dir).await.map_err(|e| {
            Error::StorageUnavailable(format!("unable to create work dir: {}", e))
        })?;

        let mut f = tokio::fs::File::create(&input_path).await.map_err(|e| {
            Error::StorageUnavailable(format!("unable to create input file: {}", e))
        })?;
        let size = tokio::io::copy(&mut input, &mut f)
            .await
            .map_err(|e| Error::MalformedRequest(format!("unable to receive input: {}", e)))?;
        f.flush().await.map_err(|e| {
            Error::StorageUnavailable(format!("unable to write input file: {}", e))
        })?;
        debug!(input.size = size, "received input");

        let f = tokio::fs::File::open(&input_path).await.map_err(|e| {
            Error::StorageUnavailable(format!("unable to open input file: {}", e))
        })?;

        Ok(self
            .store
            .store_attachment(id, rev, INPUT_ATTACHMENT, OCTET_STREAM, Box::new(f))
            .await?)
    }
}
