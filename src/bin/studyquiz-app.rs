use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use studyquiz::app::http::router;
use studyquiz::app::local_store::LocalFsStore;
use studyquiz::app::service::{QuizService, Stores};
use studyquiz::provider::{self, Engine, ProviderConfig};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    #[arg(long, default_value = "workspace-app")]
    data_dir: PathBuf,

    /// Generation engine (overrides STUDYQUIZ_ENGINE).
    #[arg(long, value_enum)]
    engine: Option<Engine>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    studyquiz::logging::init_with_default("info,tower_http=debug")?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting studyquiz-app");

    let mut config = ProviderConfig::from_env().context("load provider config")?;
    if let Some(engine) = args.engine {
        config.engine = engine;
    }
    let provider = provider::from_config(&config)?;

    let store = Arc::new(LocalFsStore::new(&args.data_dir));
    tracing::info!(data_dir = %args.data_dir.display(), "using local filesystem store");
    let service = QuizService::new(provider, Stores::shared(store));

    let app = router(service);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
