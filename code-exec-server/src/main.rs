use clap::Parser;
use code_exec::{Language, RuntimeConfig};
use code_exec_server::{create_app, create_service, run_server, spawn_readiness_logger};
use std::{net::SocketAddr, path::PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// TOML runtime configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Default wall-clock limit per execution in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Default memory ceiling per execution in megabytes
    #[arg(long)]
    memory_limit_mb: Option<f64>,

    /// Languages to initialize before the first request (repeatable)
    #[arg(long, value_name = "LANGUAGE")]
    warm: Vec<Language>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(timeout_ms) = args.timeout_ms {
        config.default_timeout_ms = timeout_ms;
    }
    if let Some(memory_limit_mb) = args.memory_limit_mb {
        config.default_memory_limit_mb = memory_limit_mb;
    }
    for language in args.warm {
        if !config.eager_languages.contains(&language) {
            config.eager_languages.push(language);
        }
    }

    let service = create_service(config).await?;
    let _readiness = spawn_readiness_logger(&service);
    let posture = service.security_posture();
    info!(
        timeout_ms = posture.timeout_ms,
        memory_limit_mb = posture.memory_limit_mb,
        "Runtime configured"
    );

    let result = run_server(create_app(service.clone()), args.addr).await;
    service.shutdown().await;
    if let Err(e) = &result {
        warn!("Server stopped with error: {}", e);
    }
    result?;

    Ok(())
}
