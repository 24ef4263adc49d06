//! CLI argument definitions for snooze-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use snooze_core::SnoozeConfig;

/// Snooze log processing daemon.
///
/// Consumes logs from the queue, runs them through the pipeline
/// (silence, grouping, ratelimit, snooze, notification, storage) and
/// runs the singleton sweeper that closes rate-limit windows.
#[derive(Parser, Debug, Default)]
#[command(name = "snooze-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to snooze.toml configuration file.
    #[arg(short, long, default_value = "/etc/snooze/snooze.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate the configuration and pipeline rules, then exit.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,

    /// Feed a file of JSON lines through the pipeline, then exit.
    #[arg(long, value_name = "JSONL")]
    pub replay: Option<PathBuf>,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut SnoozeConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
        // replay runs in the foreground next to a possibly running daemon
        if self.replay.is_some() {
            config.general.pid_file.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let cli = DaemonCli::parse_from([
            "snooze-daemon",
            "--config",
            "/tmp/snooze.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--validate",
            "--pid-file",
            "/tmp/snooze.pid",
            "--replay",
            "/tmp/logs.jsonl",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/snooze.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.log_format.as_deref(), Some("pretty"));
        assert!(cli.validate);
        assert_eq!(cli.pid_file.as_deref(), Some("/tmp/snooze.pid"));
        assert_eq!(cli.replay, Some(PathBuf::from("/tmp/logs.jsonl")));
    }

    #[test]
    fn default_config_path() {
        let cli = DaemonCli::parse_from(["snooze-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/snooze/snooze.toml"));
        assert!(cli.replay.is_none());
    }

    #[test]
    fn overrides_take_precedence() {
        let cli = DaemonCli::parse_from([
            "snooze-daemon",
            "--log-level",
            "warn",
            "--pid-file",
            "/run/snooze.pid",
        ]);
        let mut config = SnoozeConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.general.pid_file, "/run/snooze.pid");
    }

    #[test]
    fn replay_never_writes_pid_file() {
        let cli = DaemonCli::parse_from([
            "snooze-daemon",
            "--pid-file",
            "/run/snooze.pid",
            "--replay",
            "logs.jsonl",
        ]);
        let mut config = SnoozeConfig::default();
        cli.apply_overrides(&mut config);
        assert!(config.general.pid_file.is_empty());
    }
}
