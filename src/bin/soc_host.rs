//! soc-host: serve the SOC investigation tools.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use soc_agent::config::{self, HostConfig};
use soc_agent::mcp_server::tools::{soc_registry, AlertStore, IpApiLocator, SocSources, ThreatIntel};
use soc_agent::mcp_server::ToolHost;

#[derive(Parser)]
#[command(name = "soc-host")]
#[command(version, about = "Tool host for the SOC analyst agent")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve one planner over stdin/stdout instead of TCP
    #[arg(long)]
    stdio: bool,

    /// TCP bind address
    #[arg(long)]
    bind: Option<String>,

    /// JSON alert feed (array of alerts); the built-in feed when omitted
    #[arg(long)]
    alerts: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    soc_agent::init_tracing();
    let cli = Cli::parse();

    let mut host_config = match &cli.config {
        Some(path) => {
            let mut config = config::load_config(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
            config.host
        }
        None => {
            let cwd = std::env::current_dir().context("resolving working directory")?;
            config::load_from_env(&cwd)?.host
        }
    };
    if let Some(bind) = cli.bind {
        host_config.bind = bind;
    }
    if let Some(alerts) = cli.alerts {
        host_config.alerts_path = Some(alerts);
    }

    let host = ToolHost::new(build_registry(&host_config)?);

    if cli.stdio {
        tracing::info!(tools = host.registry().len(), "serving over stdio");
        host.serve_stdio().await;
        return Ok(());
    }

    let listener = TcpListener::bind(&host_config.bind)
        .await
        .with_context(|| format!("binding {}", host_config.bind))?;
    Arc::new(host).serve_tcp(listener).await?;
    Ok(())
}

fn build_registry(config: &HostConfig) -> anyhow::Result<soc_agent::mcp_server::ToolRegistry> {
    let alerts = match &config.alerts_path {
        Some(path) => AlertStore::from_json_file(path)?,
        None => AlertStore::builtin(),
    };
    tracing::info!(alerts = alerts.len(), "alert feed loaded");

    let locator = IpApiLocator::new(&config.geo_api_url)?;
    let registry = soc_registry(SocSources {
        alerts: Arc::new(alerts),
        intel: Arc::new(ThreatIntel::builtin()),
        locator: Arc::new(locator),
    })?;
    Ok(registry)
}
