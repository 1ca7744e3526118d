use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BuildId;

/// Lifecycle state of a build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Succeeded | BuildStatus::Failed)
    }

    /// Statuses only move forward. A build that never got to spawn its
    /// process goes straight from pending to failed.
    pub fn can_transition_to(&self, next: BuildStatus) -> bool {
        matches!(
            (self, next),
            (BuildStatus::Pending, BuildStatus::Running)
                | (BuildStatus::Pending, BuildStatus::Failed)
                | (BuildStatus::Running, BuildStatus::Succeeded)
                | (BuildStatus::Running, BuildStatus::Failed)
        )
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Running => "running",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
        })
    }
}

/// Opaque token identifying the last committed state of a record.
/// Every mutation needs the current one, and hands out a new one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Revision {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Revision {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildRecord {
    pub id: BuildId,
    pub rev: Revision,
    pub command: String,
    pub prefix: String,
    pub status: BuildStatus,
    /// Names of the attachments present, sorted.
    pub attachments: Vec<String>,
}

impl BuildRecord {
    pub fn has_attachment(&self, name: &str) -> bool {
        self.attachments.iter().any(|a| a == name)
    }
}
