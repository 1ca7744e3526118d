mod errors;

pub mod artifacts;
pub mod coordinator;
pub mod executor;

pub use artifacts::ArtifactServer;
pub use coordinator::{BuildCoordinator, CoordinatorConfig, Secret, SubmitRequest, Submission};
pub use errors::Error;
