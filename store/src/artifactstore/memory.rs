use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{ArtifactStore, AttachmentReader};
use crate::{BuildId, BuildRecord, BuildStatus, Error, Revision};

/// Keeps all records and attachments in memory.
/// Useful for tests and for running without a document store.
#[derive(Clone, Default)]
pub struct MemoryArtifactStore {
    db: Arc<RwLock<HashMap<BuildId, Entry>>>,
}

struct Entry {
    generation: u64,
    rev: Revision,
    command: String,
    prefix: String,
    status: BuildStatus,
    /// attachment name to (content type, contents)
    attachments: BTreeMap<String, (String, Bytes)>,
}

impl Entry {
    /// Bumps the generation and hands out a fresh revision.
    fn bump(&mut self) -> Revision {
        self.generation += 1;
        self.rev = gen_rev(self.generation);
        self.rev.clone()
    }

    fn check_rev(&self, id: &BuildId, rev: &Revision) -> Result<(), Error> {
        if &self.rev != rev {
            return Err(Error::Conflict(format!(
                "stale revision {} for {}, current is {}",
                rev, id, self.rev
            )));
        }
        Ok(())
    }

    fn to_record(&self, id: &BuildId) -> BuildRecord {
        BuildRecord {
            id: *id,
            rev: self.rev.clone(),
            command: self.command.clone(),
            prefix: self.prefix.clone(),
            status: self.status,
            attachments: self.attachments.keys().cloned().collect(),
        }
    }
}

fn gen_rev(generation: u64) -> Revision {
    format!("{}-{}", generation, Uuid::new_v4().simple()).into()
}

impl MemoryArtifactStore {
    /// Number of records stored.
    pub fn len(&self) -> usize {
        self.db.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.read().is_empty()
    }

    /// All records, in no particular order.
    pub fn records(&self) -> Vec<BuildRecord> {
        self.db
            .read()
            .iter()
            .map(|(id, entry)| entry.to_record(id))
            .collect()
    }

    fn check(&self, id: &BuildId, rev: &Revision) -> Result<(), Error> {
        match self.db.read().get(id) {
            None => Err(Error::NotFound(id.to_string())),
            Some(entry) => entry.check_rev(id, rev),
        }
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    #[instrument(skip(self, command, prefix), fields(build.id=%id), err)]
    async fn create_record(
        &self,
        id: &BuildId,
        command: &str,
        prefix: &str,
    ) -> Result<Revision, Error> {
        let mut db = self.db.write();
        if db.contains_key(id) {
            return Err(Error::Conflict(format!("record {} already exists", id)));
        }

        let rev = gen_rev(1);
        db.insert(
            *id,
            Entry {
                generation: 1,
                rev: rev.clone(),
                command: command.to_string(),
                prefix: prefix.to_string(),
                status: BuildStatus::Pending,
                attachments: BTreeMap::new(),
            },
        );

        Ok(rev)
    }

    #[instrument(skip(self), fields(build.id=%id))]
    async fn get_record(&self, id: &BuildId) -> Result<Option<BuildRecord>, Error> {
        Ok(self.db.read().get(id).map(|entry| entry.to_record(id)))
    }

    #[instrument(skip(self, rev, reader), fields(build.id=%id), err)]
    async fn store_attachment(
        &self,
        id: &BuildId,
        rev: &Revision,
        name: &str,
        content_type: &str,
        mut reader: AttachmentReader,
    ) -> Result<Revision, Error> {
        // fail early, before reading everything.
        self.check(id, rev)?;

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        debug!(attachment.size = buf.len(), "read attachment");

        // someone else might have written in the meantime, check again.
        let mut db = self.db.write();
        let entry = db
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.check_rev(id, rev)?;

        entry
            .attachments
            .insert(name.to_string(), (content_type.to_string(), buf.into()));

        Ok(entry.bump())
    }

    #[instrument(skip(self, rev), fields(build.id=%id), err)]
    async fn update_status(
        &self,
        id: &BuildId,
        rev: &Revision,
        status: BuildStatus,
    ) -> Result<Revision, Error> {
        let mut db = self.db.write();
        let entry = db
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.check_rev(id, rev)?;

        if !entry.status.can_transition_to(status) {
            return Err(Error::Conflict(format!(
                "invalid status transition {} -> {}",
                entry.status, status
            )));
        }
        entry.status = status;

        Ok(entry.bump())
    }

    #[instrument(skip(self), fields(build.id=%id))]
    async fn read_attachment(
        &self,
        id: &BuildId,
        name: &str,
    ) -> Result<Option<AttachmentReader>, Error> {
        let db = self.db.read();

        Ok(db
            .get(id)
            .and_then(|entry| entry.attachments.get(name))
            .map(|(_, contents)| Box::new(Cursor::new(contents.clone())) as AttachmentReader))
    }
}
