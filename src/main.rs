use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use agentlimit::agent::GrpcAgent;
use agentlimit::build_limiter;
use agentlimit::config::{EngineConfig, LoggingConfig};
use agentlimit::ratelimit::{RateLimiter, RatelimitRequest, RequestContext};

#[derive(Debug, Parser)]
#[command(name = "agentlimit", version, about = "Rate limit checks against a counting agent")]
struct Cli {
    /// Path to the engine configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run rate limit checks and print each decision as JSON
    Check(CheckArgs),
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Entity being limited
    #[arg(long)]
    identifier: String,

    /// Maximum cost per window
    #[arg(long)]
    limit: i64,

    /// Window length in milliseconds
    #[arg(long)]
    interval: i64,

    #[arg(long, default_value_t = 1)]
    cost: i64,

    #[arg(long, default_value = "default")]
    name: String,

    #[arg(long, default_value = "cli")]
    workspace: String,

    #[arg(long)]
    namespace: Option<String>,

    #[arg(long)]
    shard: Option<String>,

    /// Accept eventually consistent answers
    #[arg(long = "async")]
    is_async: bool,

    /// Number of checks to run
    #[arg(long, default_value_t = 1)]
    repeat: u32,
}

impl CheckArgs {
    fn request(&self) -> RatelimitRequest {
        let mut req = RatelimitRequest::new(
            &self.workspace,
            &self.name,
            &self.identifier,
            self.limit,
            self.interval,
        )
        .with_cost(self.cost)
        .asynchronous(self.is_async);
        req.namespace_id = self.namespace.clone();
        req.shard = self.shard.clone();
        req
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    init_tracing(&config.logging)?;

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(agent_url = %config.agent.url, enabled = config.enabled, "Configuration loaded");

    match cli.command {
        Command::Check(args) => run_check(&config, &args).await,
    }
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("invalid log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run_check(config: &EngineConfig, args: &CheckArgs) -> anyhow::Result<()> {
    let req = args.request();

    // The channel connects lazily, so a disabled limiter never dials the agent
    let agent = Arc::new(GrpcAgent::connect_lazy(&config.agent)?);
    let limiter = build_limiter(config, agent);

    let result = tokio::select! {
        result = run_checks(limiter.as_ref(), &req, args.repeat) => result,
        _ = shutdown_signal() => Ok(()),
    };

    limiter.flush().await;
    result
}

async fn run_checks(
    limiter: &dyn RateLimiter,
    req: &RatelimitRequest,
    repeat: u32,
) -> anyhow::Result<()> {
    for _ in 0..repeat {
        let ctx = RequestContext::new();
        let res = limiter.limit(&ctx, req).await?;
        println!("{}", serde_json::to_string(&res)?);
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping checks");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping checks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_check() {
        let cli = Cli::parse_from([
            "agentlimit",
            "check",
            "--identifier",
            "key_1",
            "--limit",
            "10",
            "--interval",
            "60000",
            "--async",
            "--shard",
            "fra",
        ]);
        let Command::Check(args) = cli.command;
        let req = args.request();
        assert_eq!(req.identifier, "key_1");
        assert_eq!(req.limit, 10);
        assert_eq!(req.interval, 60_000);
        assert_eq!(req.cost, 1);
        assert!(req.is_async);
        assert_eq!(req.shard.as_deref(), Some("fra"));
        assert_eq!(args.repeat, 1);
    }

    #[tokio::test]
    async fn test_disabled_checks_run_without_agent() {
        let config = EngineConfig::from_yaml("enabled: false").unwrap();
        let args = CheckArgs {
            identifier: "key_1".into(),
            limit: 0,
            interval: 1000,
            cost: 1,
            name: "default".into(),
            workspace: "cli".into(),
            namespace: None,
            shard: None,
            is_async: false,
            repeat: 2,
        };
        run_check(&config, &args).await.unwrap();
    }
}
