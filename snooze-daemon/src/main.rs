use anyhow::Result;
use clap::Parser;

use snooze_core::SnoozeConfig;
use snooze_daemon::cli::DaemonCli;
use snooze_daemon::logging;
use snooze_daemon::orchestrator::{self, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = SnoozeConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config);

    if cli.validate {
        let report = orchestrator::validate(&config).await?;
        println!(
            "configuration valid: {} ({} rules)",
            report.pipeline_file.display(),
            report.rules
        );
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "snooze-daemon starting");

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    match &cli.replay {
        Some(path) => {
            let summary = orchestrator.replay(path).await?;
            println!(
                "replayed {} logs: {} acked, {} terminated, {} retried",
                summary.published, summary.acked, summary.terminated, summary.retried
            );
        }
        None => orchestrator.run().await?,
    }

    tracing::info!("snooze-daemon shut down");
    Ok(())
}
