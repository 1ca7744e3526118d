use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use remake_build::executor::LocalExecutor;
use remake_build::{ArtifactServer, BuildCoordinator, CoordinatorConfig, Secret};
use remake_store::artifactstore::MemoryArtifactStore;
use remake_store::BuildId;

use crate::{gen_router, AppState};

const SECRET: &str = "sesame";
const BOUNDARY: &str = "remake-test-boundary";

fn app(work_root: &TempDir) -> Router {
    let store = Arc::new(MemoryArtifactStore::default());
    let coordinator = BuildCoordinator::new(
        CoordinatorConfig::new(Secret::new(SECRET), work_root.path()),
        store.clone(),
        Arc::new(LocalExecutor::default()),
    );

    gen_router().with_state(AppState::new(
        Arc::new(coordinator),
        ArtifactServer::new(store),
    ))
}

/// Builds a multipart/form-data body. The `code` field is sent as a file.
fn form(fields: &[(&str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        if *name == "code" {
            body.extend_from_slice(
                b"Content-Disposition: form-data; name=\"code\"; filename=\"code.tgz\"\r\n\
                  Content-Type: application/octet-stream\r\n",
            );
        } else {
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes(),
            );
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(value);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/make")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_of(response: axum::response::Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body must be readable")
}

#[tokio::test]
async fn root() {
    let work_root = TempDir::new().unwrap();
    let response = app(&work_root).oneshot(get("/")).await.unwrap();

    assert_eq!(StatusCode::OK, response.status());
    assert_eq!(Bytes::from_static(b"Hello from remake"), body_of(response).await);
}

#[tokio::test]
async fn make_and_fetch() {
    let work_root = TempDir::new().unwrap();
    let app = app(&work_root);

    let response = app
        .clone()
        .oneshot(form(&[
            ("code", b"bundle"),
            ("secret", SECRET.as_bytes()),
            ("prefix", b"x"),
            (
                "command",
                br#"echo building; cat "$BUILD_INPUT" > "$BUILD_OUTPUT""#,
            ),
        ]))
        .await
        .unwrap();

    assert_eq!(StatusCode::OK, response.status());
    let id: BuildId = response
        .headers()
        .get("x-make-id")
        .expect("id header must be set")
        .to_str()
        .unwrap()
        .parse()
        .expect("id must parse");
    assert_eq!(Bytes::from_static(b"building\n"), body_of(response).await);

    // the live output ending means the build is done.
    let response = app
        .oneshot(get(&format!("/output/{}", id)))
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, response.status());
    assert_eq!(
        "application/octet-stream",
        response.headers()[header::CONTENT_TYPE]
    );
    assert_eq!(Bytes::from_static(b"bundle"), body_of(response).await);
}

#[tokio::test]
async fn failed_build_has_no_output() {
    let work_root = TempDir::new().unwrap();
    let app = app(&work_root);

    let response = app
        .clone()
        .oneshot(form(&[
            ("secret", SECRET.as_bytes()),
            ("command", b"echo broken > \"$BUILD_OUTPUT\"; exit 7"),
            ("code", b""),
        ]))
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, response.status());
    let id = response.headers()["x-make-id"].to_str().unwrap().to_string();
    body_of(response).await;

    let response = app
        .oneshot(get(&format!("/output/{}", id)))
        .await
        .unwrap();
    assert_eq!(StatusCode::NOT_FOUND, response.status());
}

#[tokio::test]
async fn wrong_secret() {
    let work_root = TempDir::new().unwrap();
    let response = app(&work_root)
        .oneshot(form(&[
            ("secret", b"wrong"),
            ("command", b"echo hello"),
            ("code", b""),
        ]))
        .await
        .unwrap();

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, response.status());
    assert!(response.headers().get("x-make-id").is_none());
    assert_eq!(
        Bytes::from_static(b"invalid secret\nError occurred: [Unauthorized] invalid secret\n"),
        body_of(response).await
    );
    // nothing ran, so nothing was left in the work dir root either.
    assert_eq!(0, std::fs::read_dir(work_root.path()).unwrap().count());
}

#[tokio::test]
async fn missing_secret() {
    let work_root = TempDir::new().unwrap();
    let response = app(&work_root)
        .oneshot(form(&[("command", b"echo hello"), ("code", b"")]))
        .await
        .unwrap();

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, response.status());
    assert!(body_of(response)
        .await
        .starts_with(b"invalid secret\nError occurred: [Unauthorized]"));
}

#[tokio::test]
async fn missing_code() {
    let work_root = TempDir::new().unwrap();
    let response = app(&work_root)
        .oneshot(form(&[
            ("secret", SECRET.as_bytes()),
            ("command", b"echo hello"),
        ]))
        .await
        .unwrap();

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, response.status());
    assert_eq!(
        Bytes::from_static(
            b"incomplete form\nError occurred: [MalformedRequest] malformed request: missing field: code\n"
        ),
        body_of(response).await
    );
}

#[tokio::test]
async fn not_multipart() {
    let work_root = TempDir::new().unwrap();
    let response = app(&work_root)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/make")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, response.status());
    assert!(body_of(response)
        .await
        .starts_with(b"did not find form data\nError occurred: [MalformedRequest]"));
}

#[tokio::test]
async fn output_not_found() {
    let work_root = TempDir::new().unwrap();
    let app = app(&work_root);

    for uri in [
        "/output/not-a-build-id".to_string(),
        format!("/output/{}", BuildId::new()),
    ] {
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(StatusCode::NOT_FOUND, response.status(), "{}", uri);
    }
}
