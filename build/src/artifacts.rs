use std::sync::Arc;
use tracing::{debug, instrument};

use remake_store::artifactstore::{ArtifactStore, AttachmentReader};
use remake_store::{BuildId, BuildStatus, OUTPUT_ATTACHMENT};

use crate::Error;

/// Hands out the artifacts of finished builds.
#[derive(Clone)]
pub struct ArtifactServer {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactServer {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Opens the output of the given build.
    ///
    /// Only builds that succeeded have an output. For unknown, still running
    /// or failed builds, [Error::NotFound] is returned, so a caller never
    /// sees a partially written artifact.
    #[instrument(skip(self), fields(build.id=%id))]
    pub async fn fetch(&self, id: &BuildId) -> Result<AttachmentReader, Error> {
        let record = self
            .store
            .get_record(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no build {}", id)))?;

        if record.status != BuildStatus::Succeeded {
            debug!(build.status=%record.status, "build has no output");
            return Err(Error::NotFound(format!(
                "build {} is {}",
                id, record.status
            )));
        }

        self.store
            .read_attachment(id, OUTPUT_ATTACHMENT)
            .await?
            .ok_or_else(|| Error::NotFound(format!("build {} has no output", id)))
    }
}
