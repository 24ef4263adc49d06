//! Service assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `snooze-daemon`.
//! It validates configuration, connects backends, loads the pipeline,
//! registers services and runs the main signal loop.
//!
//! # Startup Order
//!
//! 1. Queue consumer (processes logs through the current pipeline)
//! 2. Sweeper (closes rate-limit windows, expires snoozes; optional)
//!
//! Shutdown runs in reverse order.
//!
//! # Signals
//!
//! - `SIGTERM`, `SIGINT`: graceful shutdown
//! - `SIGHUP`: reload the pipeline rules file

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use snooze_core::SnoozeConfig;
use snooze_core::metrics as m;
use snooze_processor::backend::MemoryQueue;
use snooze_processor::{Consumer, ConsumerSettings, Manager, PipelineConfig, Sweeper, SweeperSettings};

use crate::backends::{self, DaemonBackends};
use crate::health::{DaemonHealth, aggregate_status};
use crate::metrics_server;
use crate::pid_file::{remove_pid_file, write_pid_file};
use crate::replay::{self, ReplaySummary};
use crate::services::ServiceRegistry;

const UPTIME_INTERVAL: Duration = Duration::from_secs(10);
const REPLAY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Summary of a successful `--validate` run.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub pipeline_file: PathBuf,
    pub rules: usize,
}

/// Load and validate both the process configuration and the pipeline rules.
///
/// Nothing is connected or started.
pub async fn validate(config: &SnoozeConfig) -> Result<ValidationReport> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    let pipeline_file = PathBuf::from(&config.processor.pipeline_file);
    let pipeline = PipelineConfig::load_file(&pipeline_file)
        .await
        .map_err(|e| anyhow::anyhow!("pipeline validation failed: {}", e))?;
    Ok(ValidationReport {
        pipeline_file,
        rules: pipeline.rule_count(),
    })
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: SnoozeConfig,
    manager: Arc<Manager<DaemonBackends>>,
    queue: MemoryQueue,
    services: ServiceRegistry,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `snooze.toml` (with environment overrides) and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = SnoozeConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The metrics recorder cannot be installed
    /// - The shared cache cannot be reached
    /// - The pipeline rules file cannot be loaded
    pub async fn build_from_config(config: SnoozeConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let ctx = backends::build_context(&config.cache).await?;
        let manager = Arc::new(
            Manager::new(&config.processor.pipeline_file, ctx)
                .await
                .map_err(|e| anyhow::anyhow!("failed to load pipeline: {}", e))?,
        );

        let queue = MemoryQueue::new();
        let mut services = ServiceRegistry::new();
        services.register(Box::new(Consumer::new(
            Arc::new(queue.clone()),
            Arc::clone(&manager),
            ConsumerSettings::from_config(&config.processor),
        )));
        if config.sweeper.enabled {
            services.register(Box::new(Sweeper::new(
                Arc::clone(&manager),
                SweeperSettings::from_config(&config.sweeper),
            )));
        }

        tracing::info!(services = services.count(), "orchestrator initialized");
        if config.metrics.enabled {
            metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
        }

        Ok(Self {
            config,
            manager,
            queue,
            services,
            start_time: Instant::now(),
        })
    }

    /// Start all services and run until SIGTERM or SIGINT.
    ///
    /// SIGHUP reloads the pipeline; a failed reload keeps the current one.
    pub async fn run(&mut self) -> Result<()> {
        let pid_file = self.pid_file();
        if let Some(path) = &pid_file {
            write_pid_file(path)?;
        }

        if let Err(e) = self.services.start_all().await {
            if let Some(path) = &pid_file {
                remove_pid_file(path);
            }
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let uptime = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, cancel.clone()));

        tracing::info!("entering main event loop");
        let result = self.signal_loop().await;
        match &result {
            Ok(signal) => tracing::info!(signal = *signal, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
        }

        cancel.cancel();
        if let Some(task) = uptime {
            let _ = task.await;
        }
        let stopped = self.shutdown().await;

        if let Some(path) = &pid_file {
            remove_pid_file(path);
        }
        result.and(stopped)
    }

    /// Publish a JSON-lines file, process it and stop once every line is settled.
    ///
    /// SIGTERM or SIGINT interrupt the replay early.
    pub async fn replay(&mut self, path: &Path) -> Result<ReplaySummary> {
        let published = replay::publish_lines(path, &self.queue).await?;
        self.services.start_all().await?;

        let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
        let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;
        let mut poll = tokio::time::interval(REPLAY_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if self.queue.outstanding() == 0 {
                        break;
                    }
                }
                _ = sigterm.recv() => {
                    tracing::warn!("replay interrupted by SIGTERM");
                    break;
                }
                _ = sigint.recv() => {
                    tracing::warn!("replay interrupted by SIGINT");
                    break;
                }
            }
        }

        self.shutdown().await?;
        let summary = ReplaySummary::collect(published, &self.queue);
        tracing::info!(?summary, "replay finished");
        Ok(summary)
    }

    /// Reload the pipeline rules from disk.
    pub async fn reload(&self) -> Result<()> {
        self.manager
            .reload()
            .await
            .map_err(|e| anyhow::anyhow!("pipeline reload failed: {}", e))
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let services = self.services.health_statuses().await;
        DaemonHealth {
            status: aggregate_status(&services),
            uptime_secs: self.start_time.elapsed().as_secs(),
            services,
        }
    }

    /// In-process queue feeding the consumer.
    pub fn queue(&self) -> &MemoryQueue {
        &self.queue
    }

    pub fn manager(&self) -> &Arc<Manager<DaemonBackends>> {
        &self.manager
    }

    pub fn config(&self) -> &SnoozeConfig {
        &self.config
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all services");
        self.services.stop_all().await
    }

    fn pid_file(&self) -> Option<PathBuf> {
        let path = &self.config.general.pid_file;
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    /// Handle signals until a shutdown signal arrives.
    async fn signal_loop(&self) -> Result<&'static str> {
        let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
        let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;
        let mut sighup = install(SignalKind::hangup(), "SIGHUP")?;

        loop {
            tokio::select! {
                _ = sigterm.recv() => return Ok("SIGTERM"),
                _ = sigint.recv() => return Ok("SIGINT"),
                _ = sighup.recv() => {
                    tracing::info!(source = %self.manager.source().display(), "SIGHUP received, reloading pipeline");
                    match self.reload().await {
                        Ok(()) => tracing::info!("pipeline reloaded"),
                        Err(e) => tracing::error!(error = %e, "keeping current pipeline"),
                    }
                }
            }
        }
    }
}

fn install(kind: SignalKind, name: &str) -> Result<Signal> {
    signal(kind).map_err(|e| anyhow::anyhow!("failed to install {} handler: {}", name, e))
}

/// Periodically refresh the uptime gauge for Prometheus scrapes.
fn spawn_uptime_updater(start_time: Instant, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uptime_updater_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let task = spawn_uptime_updater(Instant::now(), cancel.clone());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_millis(200), task).await;
        assert!(result.is_ok(), "uptime updater should shut down within timeout");
    }
}
