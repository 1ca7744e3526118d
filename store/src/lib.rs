mod build_id;
mod errors;
mod record;

pub mod artifactstore;

pub use build_id::BuildId;
pub use errors::Error;
pub use record::{BuildRecord, BuildStatus, Revision};

/// Name of the attachment holding the uploaded source bundle.
pub const INPUT_ATTACHMENT: &str = "input";

/// Name of the attachment holding the artifact a build produced.
pub const OUTPUT_ATTACHMENT: &str = "output";

/// Content type all attachments are stored with.
pub const OCTET_STREAM: &str = "application/octet-stream";
