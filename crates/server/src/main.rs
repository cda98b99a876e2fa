mod api;
mod dispatch_loop;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use cadence_core::Config;
use cadence_deploy::{HttpProvisioner, LogProvisioner};
use cadence_engine::{DispatchCoordinator, Provisioner, Repository};
use cadence_store::{MemoryRepository, PgRepository};

use crate::state::AppState;

/// Scheduled-deployment service: stores deployments with cron triggers and
/// periodically dispatches the ones whose schedule is due.
#[derive(Parser, Debug)]
#[command(name = "cadence-server", about = "Scheduled deployment dispatcher")]
struct Cli {
    /// Run a single evaluation pass and exit (no HTTP server).
    #[arg(long)]
    once: bool,

    /// Serve the HTTP API without the background dispatch loop.
    #[arg(long)]
    no_scheduler: bool,
}

async fn build_repository(config: &Config) -> Result<(Arc<dyn Repository>, &'static str)> {
    if config.postgres.is_configured() {
        let repo = PgRepository::connect(&config.postgres)
            .await
            .context("failed to connect to Postgres")?;
        return Ok((Arc::new(repo), "postgres"));
    }
    warn!("PG_HOST not set; using in-memory repository (data is lost on restart)");
    Ok((Arc::new(MemoryRepository::new()), "memory"))
}

fn build_provisioner(config: &Config) -> Result<Arc<dyn Provisioner>> {
    if config.provisioner.is_configured() {
        let provisioner =
            HttpProvisioner::new(&config.provisioner).context("failed to build provisioner client")?;
        info!("provisioning API client ready");
        return Ok(Arc::new(provisioner));
    }
    info!("PROVISIONER_API_URL not set; dispatches will be logged, not sent");
    Ok(Arc::new(LogProvisioner))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    cadence_core::config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let (repo, backend) = build_repository(&config).await?;
    let provisioner = build_provisioner(&config)?;

    let coordinator = Arc::new(DispatchCoordinator::new(
        Arc::clone(&repo),
        provisioner,
        config.dispatch.interval_minutes,
        config.provisioner.name_prefix.clone(),
    ));

    if cli.once {
        let summary = coordinator.dispatch_all(Utc::now()).await?;
        info!(
            evaluated = summary.evaluated,
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            failed = summary.failed,
            errored = summary.errored,
            "single pass complete"
        );
        return Ok(());
    }

    if cli.no_scheduler {
        info!("dispatch loop disabled (--no-scheduler)");
    } else {
        let coordinator = Arc::clone(&coordinator);
        let poll_seconds = config.dispatch.poll_seconds;
        tokio::spawn(async move {
            dispatch_loop::run(coordinator, poll_seconds).await;
        });
    }

    let state = Arc::new(AppState { repo, backend });
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
