//! Server configuration: command-line flags with environment overrides.
//!
//! Environment variables win over flags when they are set and non-empty.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use tally_service::{PersistenceConfig, RestoreMode};

/// Durable medium for metric snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateFormat {
    /// Pretty-printed JSON replaced atomically on each save.
    Json,
    /// Embedded redb database.
    Redb,
}

/// How counters from the snapshot are applied on restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RestoreModeArg {
    Replace,
    Accumulate,
}

impl From<RestoreModeArg> for RestoreMode {
    fn from(arg: RestoreModeArg) -> Self {
        match arg {
            RestoreModeArg::Replace => RestoreMode::Replace,
            RestoreModeArg::Accumulate => RestoreMode::Accumulate,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "tallyd", about = "Tally metrics server")]
pub struct Cli {
    /// Listen address (host:port).
    #[arg(short = 'a', long, default_value = "localhost:8080")]
    pub address: String,

    /// Seconds between state saves; 0 saves after every update.
    #[arg(short = 'i', long, default_value_t = 300)]
    pub store_interval: u64,

    /// State file path; empty disables persistence.
    #[arg(short = 'f', long, default_value = "/tmp/metrics-db.json")]
    pub file_storage_path: String,

    /// Load saved state on start.
    #[arg(short = 'r', long, default_value_t = true, action = clap::ArgAction::Set)]
    pub restore: bool,

    /// PostgreSQL connection string; empty keeps metrics in memory.
    #[arg(short = 'd', long, default_value = "")]
    pub database_dsn: String,

    #[arg(long, value_enum, default_value_t = StateFormat::Json)]
    pub state_format: StateFormat,

    #[arg(long, value_enum, default_value_t = RestoreModeArg::Replace)]
    pub restore_mode: RestoreModeArg,
}

/// Resolved, read-only server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub store_interval: Duration,
    pub file_storage_path: PathBuf,
    pub restore: bool,
    pub database_dsn: String,
    pub state_format: StateFormat,
    pub restore_mode: RestoreMode,
}

impl ServerConfig {
    /// Parse process arguments and apply the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::resolve(Cli::parse(), |key| std::env::var(key).ok())
    }

    /// Apply environment overrides, looked up through `env`, on top of
    /// parsed flags.
    pub fn resolve(cli: Cli, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let env = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let address = env("ADDRESS").unwrap_or(cli.address);

        let store_secs = match env("STORE_INTERVAL") {
            Some(v) => v.parse::<u64>().with_context(|| {
                format!("invalid STORE_INTERVAL, must be non-negative integer seconds: {v:?}")
            })?,
            None => cli.store_interval,
        };

        let file_storage_path =
            PathBuf::from(env("FILE_STORAGE_PATH").unwrap_or(cli.file_storage_path));

        let restore = match env("RESTORE").as_deref() {
            Some("true") => true,
            Some("false") => false,
            Some(other) => bail!("invalid RESTORE, must be true or false: {other:?}"),
            None => cli.restore,
        };

        let database_dsn = env("DATABASE_DSN").unwrap_or(cli.database_dsn);

        let state_format = match env("STATE_FORMAT") {
            Some(v) => StateFormat::from_str(&v, true)
                .map_err(|_| anyhow::anyhow!("invalid STATE_FORMAT, must be json or redb: {v:?}"))?,
            None => cli.state_format,
        };

        let restore_mode = match env("RESTORE_MODE") {
            Some(v) => RestoreModeArg::from_str(&v, true).map_err(|_| {
                anyhow::anyhow!("invalid RESTORE_MODE, must be replace or accumulate: {v:?}")
            })?,
            None => cli.restore_mode,
        };

        Ok(Self {
            address,
            store_interval: Duration::from_secs(store_secs),
            file_storage_path,
            restore,
            database_dsn,
            state_format,
            restore_mode: restore_mode.into(),
        })
    }

    pub fn persistence(&self) -> PersistenceConfig {
        PersistenceConfig {
            file_path: self.file_storage_path.clone(),
            store_interval: self.store_interval,
            restore: self.restore,
            restore_mode: self.restore_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tallyd").chain(args.iter().copied())).unwrap()
    }

    fn resolve(args: &[&str], vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::resolve(cli(args), |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = resolve(&[], &[]).unwrap();
        assert_eq!(cfg.address, "localhost:8080");
        assert_eq!(cfg.store_interval, Duration::from_secs(300));
        assert_eq!(cfg.file_storage_path, PathBuf::from("/tmp/metrics-db.json"));
        assert!(cfg.restore);
        assert!(cfg.database_dsn.is_empty());
        assert_eq!(cfg.state_format, StateFormat::Json);
        assert_eq!(cfg.restore_mode, RestoreMode::Replace);
    }

    #[test]
    fn short_flags() {
        let cfg = resolve(
            &["-a", "0.0.0.0:9090", "-i", "0", "-f", "/var/lib/tally.json", "-r", "false"],
            &[],
        )
        .unwrap();
        assert_eq!(cfg.address, "0.0.0.0:9090");
        assert!(cfg.store_interval.is_zero());
        assert_eq!(cfg.file_storage_path, PathBuf::from("/var/lib/tally.json"));
        assert!(!cfg.restore);
    }

    #[test]
    fn env_overrides_flags() {
        let cfg = resolve(
            &["-a", "localhost:1", "-i", "10", "--state-format", "json"],
            &[
                ("ADDRESS", "localhost:2"),
                ("STORE_INTERVAL", "20"),
                ("FILE_STORAGE_PATH", "/data/m.json"),
                ("RESTORE", "false"),
                ("DATABASE_DSN", "postgres://localhost/metrics"),
                ("STATE_FORMAT", "redb"),
                ("RESTORE_MODE", "Accumulate"),
            ],
        )
        .unwrap();
        assert_eq!(cfg.address, "localhost:2");
        assert_eq!(cfg.store_interval, Duration::from_secs(20));
        assert_eq!(cfg.file_storage_path, PathBuf::from("/data/m.json"));
        assert!(!cfg.restore);
        assert_eq!(cfg.database_dsn, "postgres://localhost/metrics");
        assert_eq!(cfg.state_format, StateFormat::Redb);
        assert_eq!(cfg.restore_mode, RestoreMode::Accumulate);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let cfg = resolve(&["-a", "localhost:1"], &[("ADDRESS", ""), ("RESTORE", "")]).unwrap();
        assert_eq!(cfg.address, "localhost:1");
        assert!(cfg.restore);
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        assert!(resolve(&[], &[("STORE_INTERVAL", "-5")]).is_err());
        assert!(resolve(&[], &[("STORE_INTERVAL", "soon")]).is_err());
        assert!(resolve(&[], &[("RESTORE", "yes")]).is_err());
        assert!(resolve(&[], &[("STATE_FORMAT", "xml")]).is_err());
        assert!(resolve(&[], &[("RESTORE_MODE", "merge")]).is_err());
    }

    #[test]
    fn persistence_policy_mirrors_config() {
        let cfg = resolve(&["-i", "0", "-f", ""], &[]).unwrap();
        let policy = cfg.persistence();
        assert!(!policy.is_enabled());
        assert!(policy.store_interval.is_zero());
    }
}
