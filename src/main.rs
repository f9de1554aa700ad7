//! soc-agent: run one SOC investigation against a tool host.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use soc_agent::agent_core::{run_task, TaskOptions};
use soc_agent::config::{self, Config};
use soc_agent::inference::InferenceClient;
use soc_agent::mcp_client::Endpoint;

#[derive(Parser)]
#[command(name = "soc-agent")]
#[command(version, about = "Investigate security alerts with a tool-calling LLM")]
struct Cli {
    /// Task for the analyst; defaults to the configured task
    task: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tool host endpoint (tcp://host:port or "stdio:<command> [args]")
    #[arg(long)]
    endpoint: Option<String>,

    /// Model name on the oracle endpoint
    #[arg(long)]
    model: Option<String>,

    /// Maximum tool-dispatching iterations
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Dispatch the calls of a batch one at a time
    #[arg(long)]
    sequential: bool,

    /// Print the full conversation context as JSON after the answer
    #[arg(long)]
    show_context: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    soc_agent::init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = config::load_config(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
            config
        }
        None => {
            let cwd = std::env::current_dir().context("resolving working directory")?;
            config::load_from_env(&cwd)?
        }
    };
    apply_cli_overrides(&mut config, &cli);
    let agent = &config.agent;

    let endpoint: Endpoint = agent
        .endpoint
        .parse()
        .with_context(|| format!("invalid endpoint '{}'", agent.endpoint))?;
    let oracle = InferenceClient::from_config(&agent.oracle)?;
    let task = cli.task.clone().unwrap_or_else(|| agent.task.clone());

    tracing::info!(
        endpoint = %endpoint,
        oracle = %oracle.base_url(),
        model = %oracle.model(),
        max_iterations = agent.reasoning.max_iterations,
        "starting investigation"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping at the next step boundary");
            on_signal.cancel();
        }
    });

    let options = TaskOptions {
        endpoint,
        connect_timeout: agent.connect_timeout(),
        loop_config: agent.reasoning.to_loop_config(),
    };
    let outcome = run_task(&options, &oracle, &task, cancel).await;

    if let Some(answer) = &outcome.final_answer {
        println!("{answer}");
        if cli.show_context {
            println!("{}", outcome.context.to_json_pretty());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let message = outcome
        .abort_message()
        .unwrap_or_else(|| "Task ended without an answer.".to_string());
    eprintln!("{message}");
    eprintln!(
        "iterations: {}, oracle queries: {}",
        outcome.state.iteration_count, outcome.oracle_queries
    );
    println!("{}", outcome.context.to_json_pretty());
    Ok(ExitCode::FAILURE)
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(endpoint) = &cli.endpoint {
        config.agent.endpoint = endpoint.clone();
    }
    if let Some(model) = &cli.model {
        config.agent.oracle.model = model.clone();
    }
    if let Some(max) = cli.max_iterations {
        config.agent.reasoning.max_iterations = max;
    }
    if cli.sequential {
        config.agent.reasoning.parallel_tool_calls = false;
    }
}
