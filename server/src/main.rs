use anyhow::Result;
use axum::Router;
use clap::Parser;
use reelsearch_core::SearchConfig;
use server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Cache directory written by `indexer build`
    #[arg(long, env = "REELSEARCH_CACHE", default_value = "./cache")]
    index: String,
    /// Optional JSON file overriding search defaults
    #[arg(long, env = "REELSEARCH_CONFIG")]
    config: Option<PathBuf>,
    /// Dimension of the hashing embedder; must match the build
    #[arg(long, default_value_t = reelsearch_core::embedding::DEFAULT_HASHING_DIM)]
    dim: usize,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SearchConfig::from_json_file(path)?,
        None => SearchConfig::default(),
    };
    let app: Router = build_app(&args.index, config, args.dim)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
