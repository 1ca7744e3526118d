use clap::Parser;
use remake_build::executor::BuildExecutor;
use remake_build::{ArtifactServer, BuildCoordinator, CoordinatorConfig, Secret};
use remake_server::AppState;
use remake_store::artifactstore::ArtifactStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

/// Runs build commands on request, streaming their output back and keeping
/// the resulting artifacts.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Shared secret clients need to send along with each build.
    #[arg(long, env, hide_env_values = true)]
    secret: String,

    /// Where build records and artifacts are kept. Falls back to
    /// `CLOUDANT_URL`, and then to an in-memory store.
    #[arg(long, env = "STORE_ADDR")]
    store_addr: Option<String>,

    #[arg(long, env, default_value = "local://")]
    executor_addr: String,

    /// Directory each build gets its own work dir in.
    /// Defaults to `remake` inside the system temp dir.
    #[arg(long, env)]
    work_dir: Option<PathBuf>,

    /// The port to listen on, on all interfaces.
    #[arg(long, env, default_value_t = 3000)]
    port: u16,

    /// Whether to log in JSON
    #[arg(long)]
    json: bool,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
}

const DEFAULT_STORE_ADDR: &str = "memory://";

fn store_addr(store_addr: Option<String>, cloudant_url: Option<String>) -> String {
    store_addr
        .or(cloudant_url.filter(|url| !url.is_empty()))
        .unwrap_or_else(|| DEFAULT_STORE_ADDR.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    remake_tracing::TracingBuilder::default()
        .level(cli.log_level)
        .json(cli.json)
        .build()?;

    let store_addr = store_addr(cli.store_addr, std::env::var("CLOUDANT_URL").ok());
    let store: Arc<dyn ArtifactStore> = remake_store::artifactstore::from_addr(&store_addr)
        .await?
        .into();
    store.ensure_ready().await?;

    let executor: Arc<dyn BuildExecutor> =
        remake_build::executor::from_addr(&cli.executor_addr)
            .await?
            .into();

    let work_dir = cli
        .work_dir
        .unwrap_or_else(|| std::env::temp_dir().join("remake"));
    tokio::fs::create_dir_all(&work_dir).await?;

    let config = CoordinatorConfig::new(Secret::new(cli.secret), &work_dir);
    let state = AppState::new(
        Arc::new(BuildCoordinator::new(config, store.clone(), executor)),
        ArtifactServer::new(store),
    );

    let app = remake_server::gen_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;

    info!(listen_address=%listener.local_addr()?, work_dir=%work_dir.display(), "starting daemon");

    axum::serve(listener, app).await?;

    Ok(())
}
