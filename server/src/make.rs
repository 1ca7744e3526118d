use axum::body::Body;
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::convert::Infallible;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

use remake_build::{Error, SubmitRequest};

use crate::AppState;

/// Header carrying the id of an accepted build.
const MAKE_ID_HEADER: HeaderName = HeaderName::from_static("x-make-id");

/// Name of the file field carrying the input bundle.
const CODE_FIELD: &str = "code";

#[derive(Default)]
struct Form {
    secret: Option<String>,
    command: Option<String>,
    prefix: Option<String>,
    code: Option<tokio::fs::File>,
}

#[instrument(skip_all)]
pub async fn post(
    State(AppState { coordinator, .. }): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            warn!(err=%e, "request is not multipart");
            return error_response(
                "did not find form data",
                Error::MalformedRequest(e.body_text()),
            );
        }
    };

    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => return error_response("error parsing form", e),
    };

    let request = match to_submit_request(form) {
        Ok(request) => request,
        Err(e @ Error::Unauthorized) => return error_response("invalid secret", e),
        Err(e) => return error_response("incomplete form", e),
    };

    match coordinator.submit(request).await {
        Ok(submission) => (
            [(MAKE_ID_HEADER, submission.id.to_string())],
            Body::from_stream(submission.output.map(Ok::<_, Infallible>)),
        )
            .into_response(),
        Err(e) => {
            let context = match &e {
                Error::Unauthorized => "invalid secret",
                Error::SpawnFailed(_) => "could not spawn",
                Error::StorageUnavailable(_) | Error::Conflict(_) => "error saving build",
                _ => "error starting build",
            };
            error_response(context, e)
        }
    }
}

fn error_response(context: &str, e: Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("{}\n{}", context, e.diagnostic()),
    )
        .into_response()
}

/// Reads all fields. File fields are spooled to disk, so the text fields may
/// come before or after them.
async fn read_form(mut multipart: Multipart) -> Result<Form, Error> {
    let mut form = Form::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::MalformedRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            CODE_FIELD => form.code = Some(spool(field).await?),
            "secret" => form.secret = Some(text(field).await?),
            "command" => form.command = Some(text(field).await?),
            "prefix" => form.prefix = Some(text(field).await?),
            _ => debug!(field.name=%name, "ignoring unknown field"),
        }
    }

    Ok(form)
}

async fn text(field: Field<'_>) -> Result<String, Error> {
    field
        .text()
        .await
        .map_err(|e| Error::MalformedRequest(e.body_text()))
}

/// Writes the contents of a field to an anonymous temporary file, and returns
/// it rewound to the start.
async fn spool(mut field: Field<'_>) -> Result<tokio::fs::File, Error> {
    let f = tempfile::tempfile()
        .map_err(|e| Error::StorageUnavailable(format!("unable to create temp file: {}", e)))?;
    let mut f = tokio::fs::File::from_std(f);

    let mut size = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| Error::MalformedRequest(e.body_text()))?
    {
        size += chunk.len();
        f.write_all(&chunk)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("unable to spool upload: {}", e)))?;
    }
    f.flush()
        .await
        .map_err(|e| Error::StorageUnavailable(format!("unable to spool upload: {}", e)))?;
    f.rewind()
        .await
        .map_err(|e| Error::StorageUnavailable(format!("unable to rewind upload: {}", e)))?;
    debug!(upload.size = size, "spooled upload");

    Ok(f)
}

fn to_submit_request(form: Form) -> Result<SubmitRequest, Error> {
    let secret = form.secret.ok_or(Error::Unauthorized)?;
    let command = form
        .command
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::MalformedRequest("missing field: command".to_string()))?;
    let code = form
        .code
        .ok_or_else(|| Error::MalformedRequest(format!("missing field: {}", CODE_FIELD)))?;

    Ok(SubmitRequest {
        secret,
        command,
        prefix: form.prefix.unwrap_or_default(),
        input: Box::new(code),
    })
}
