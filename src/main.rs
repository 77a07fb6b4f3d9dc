use anyhow::Context;
use clap::Parser;
use code_exec::{CodeExecutionService, ExecuteRequest, ExecutionResult, Language, RuntimeConfig};
use secure_code_runtime::RuntimeClient;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Language of the source code
    #[arg(short, long)]
    language: Language,

    /// Source file to run, `-` reads standard input
    #[arg(short, long, default_value = "-")]
    file: String,

    /// Base URL of a code execution server; runs in-process when absent
    #[arg(short, long)]
    server: Option<String>,

    /// Wall-clock limit in milliseconds
    #[arg(long)]
    timeout_ms: Option<i64>,

    /// Memory ceiling in megabytes
    #[arg(long)]
    memory_limit_mb: Option<f64>,

    /// TOML runtime configuration file for in-process runs
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn read_source(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        let mut code = String::new();
        std::io::stdin()
            .read_to_string(&mut code)
            .context("Failed to read code from stdin")?;
        Ok(code)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))
    }
}

async fn run_local(config: Option<PathBuf>, request: ExecuteRequest) -> anyhow::Result<ExecutionResult> {
    let config = match config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    let service = CodeExecutionService::new(config).await?;
    let result = service.submit(request).await;
    service.shutdown().await;
    Ok(result?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let code = read_source(&args.file)?;

    let mut request = ExecuteRequest::new(args.language.as_str(), code);
    request.timeout_ms = args.timeout_ms;
    request.memory_limit_mb = args.memory_limit_mb;

    let result = match &args.server {
        Some(url) => RuntimeClient::new(url.as_str())?.execute(&request).await?,
        None => run_local(args.config, request).await?,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
