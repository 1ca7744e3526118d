use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::{BuildId, BuildRecord, BuildStatus, Error, Revision};

mod couchdb;
mod from_addr;
mod memory;


pub use self::couchdb::CouchArtifactStore;
pub use self::from_addr::from_addr;
pub use self::memory::MemoryArtifactStore;

/// A readable stream of attachment contents.
pub type AttachmentReader = Box<dyn AsyncRead + Send + Unpin>;

/// The base trait all ArtifactStore services need to implement.
///
/// It stores build records, keyed by their [BuildId], and named binary
/// attachments on them. Every mutation takes the [Revision] the caller last
/// saw, and returns the new one. Writes against a stale revision fail with
/// [Error::Conflict], so concurrent writers can't silently overwrite each
/// other.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Prepare the backend for use (create databases etc.).
    /// Calling this more than once is fine.
    async fn ensure_ready(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Persist a new record with the given command and prefix, in
    /// [BuildStatus::Pending]. Fails with [Error::Conflict] if the id is
    /// already taken.
    async fn create_record(
        &self,
        id: &BuildId,
        command: &str,
        prefix: &str,
    ) -> Result<Revision, Error>;

    /// Retrieve a record, or None if it doesn't exist.
    async fn get_record(&self, id: &BuildId) -> Result<Option<BuildRecord>, Error>;

    /// Attach a named blob to a record. The reader is drained completely
    /// before this returns.
    async fn store_attachment(
        &self,
        id: &BuildId,
        rev: &Revision,
        name: &str,
        content_type: &str,
        reader: AttachmentReader,
    ) -> Result<Revision, Error>;

    /// Move a record to a new status. Backwards transitions are rejected
    /// with [Error::Conflict].
    async fn update_status(
        &self,
        id: &BuildId,
        rev: &Revision,
        status: BuildStatus,
    ) -> Result<Revision, Error>;

    /// Open an attachment for reading. Returns None if either the record or
    /// the attachment doesn't exist.
    async fn read_attachment(
        &self,
        id: &BuildId,
        name: &str,
    ) -> Result<Option<AttachmentReader>, Error>;
}

#[async_trait]
impl<A> ArtifactStore for A
where
    A: AsRef<dyn ArtifactStore> + Send + Sync,
{
    async fn ensure_ready(&self) -> Result<(), Error> {
        self.as_ref().ensure_ready().await
    }

    async fn create_record(
        &self,
        id: &BuildId,
        command: &str,
        prefix: &str,
    ) -> Result<Revision, Error> {
        self.as_ref().create_record(id, command, prefix).await
    }

    async fn get_record(&self, id: &BuildId) -> Result<Option<BuildRecord>, Error> {
        self.as_ref().get_record(id).await
    }

    async fn store_attachment(
        &self,
        id: &BuildId,
        rev: &Revision,
        name: &str,
        content_type: &str,
        reader: AttachmentReader,
    ) -> Result<Revision, Error> {
        self.as_ref()
            .store_attachment(id, rev, name, content_type, reader)
            .await
    }

    async fn update_status(
        &self,
        id: &BuildId,
        rev: &Revision,
        status: BuildStatus,
    ) -> Result<Revision, Error> {
        self.as_ref().update_status(id, rev, status).await
    }

    async fn read_attachment(
        &self,
        id: &BuildId,
        name: &str,
    ) -> Result<Option<AttachmentReader>, Error> {
        self.as_ref().read_attachment(id, name).await
    }
}
