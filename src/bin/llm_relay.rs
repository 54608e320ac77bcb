//! llm-relay：通过 stdio 提供 MCP 工具的补全代理
//!
//! Usage:
//!   llm-relay               Serve MCP over stdin/stdout
//!   llm-relay --version     Show version information
//!
//! Configuration comes from the environment (and an optional `.env` file).
//! Logs go to stderr; stdout carries the protocol.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use llm_relay::client::CompletionClient;
use llm_relay::config::ServerConfig;
use llm_relay::mcp::{Dispatcher, McpServer, ToolRegistry};
use llm_relay::models::ModelValidator;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "version" | "--version" | "-V" => {
                println!("llm-relay {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => anyhow::bail!("Unknown argument: {other}"),
        }
    }

    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    init_logging();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let outcome = runtime.block_on(serve(config));

    // stdin is read on a blocking thread that only returns on the next line; don't wait for it.
    runtime.shutdown_timeout(Duration::from_millis(500));
    outcome
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    info!(
        upstream = config.upstream.base_url.as_str(),
        http2 = config.pool.http2_enabled,
        max_retries = config.retry.max_retries,
        "starting llm-relay"
    );
    if config.upstream.api_key.is_none() {
        warn!("no LITELLM_API_KEY or OPENAI_API_KEY set; upstream calls are unauthenticated");
    }

    let client = CompletionClient::new(&config).context("failed to build upstream client")?;
    let registry = ToolRegistry::standard(Arc::new(client), ModelValidator::default())
        .context("failed to register tools")?;
    let server = McpServer::new(Dispatcher::new(registry), &config);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        signal.cancel();
    });

    server.run_stdio(shutdown).await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, falling back to ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
