use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;
use tracing::{instrument, warn};

use remake_build::Error;
use remake_store::{BuildId, OCTET_STREAM};

use crate::AppState;

#[instrument(skip(artifacts))]
pub async fn get(
    Path(id_str): Path<String>,
    State(AppState { artifacts, .. }): State<AppState>,
) -> Result<Response, StatusCode> {
    let id: BuildId = id_str.parse().map_err(|e| {
        warn!(err=%e, "invalid build id");
        StatusCode::NOT_FOUND
    })?;

    let reader = artifacts.fetch(&id).await.map_err(|e| match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        e => {
            warn!(err=%e, "failed to fetch output");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    Ok((
        [(header::CONTENT_TYPE, OCTET_STREAM)],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}
