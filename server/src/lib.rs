use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use remake_build::{ArtifactServer, BuildCoordinator};

mod make;
mod output;

#[cfg(test)]
mod tests;

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<BuildCoordinator>,
    artifacts: ArtifactServer,
}

impl AppState {
    pub fn new(coordinator: Arc<BuildCoordinator>, artifacts: ArtifactServer) -> Self {
        Self {
            coordinator,
            artifacts,
        }
    }
}

pub fn gen_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/make", post(make::post))
        .route("/output/:id", get(output::get))
        .layer(TraceLayer::new_for_http())
}

async fn root() -> &'static str {
    "Hello from remake"
}
