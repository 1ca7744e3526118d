use async_trait::async_trait;
use tracing::instrument;

use super::{BuildExecutor, ExecRequest, RunningBuild};
use crate::Error;

#[derive(Default)]
pub struct DummyExecutor {}

#[async_trait]
impl BuildExecutor for DummyExecutor {
    #[instrument(skip_all, err)]
    async fn run(&self, _request: ExecRequest) -> Result<RunningBuild, Error> {
        Err(Error::SpawnFailed(
            "builds are not supported with DummyExecutor".to_string(),
        ))
    }
}
