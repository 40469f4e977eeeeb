use clap::Parser;
use dsbench::{create_router, AppState, BackendKind, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dsbench")]
#[command(about = "Datastore query benchmark server", long_about = None)]
struct Args {
    /// Port to listen on (overrides config and DSBENCH_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a TOML config file (defaults to ./dsbench.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Datastore backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Append call profiles to every test view
    #[arg(long)]
    profile: bool,

    /// Simulated round trip of the memory backend, in milliseconds
    #[arg(long)]
    rpc_latency_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dsbench=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if args.profile {
        config.profile = true;
    }
    if let Some(ms) = args.rpc_latency_ms {
        config.memory.rpc_latency_ms = ms;
    }

    let port = config.port;
    if config.profile {
        tracing::info!("Profiling enabled for test views");
    }

    let state = AppState::new(config)?;
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
