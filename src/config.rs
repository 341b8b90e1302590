use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::batch::{BatchDriverOptions, OnError};
use crate::diff::DiffOptions;
use crate::error::MigrateError;
use crate::migrate::MigratorOptions;
use crate::sanitize::SanitizeOptions;
use crate::types::{ConnectionDescriptor, RetryPolicy, ZoneName};

/// Command-line surface, one flag per spec.md §6. Parsed by `clap`'s derive
/// macro the way the wider PowerDNS/DNS-provider tooling corpus does.
#[derive(Debug, Parser)]
#[command(name = "pdns-zone-migrate", version, about = "Migrate PowerDNS zones between two servers")]
pub struct Cli {
    #[arg(long)]
    pub source_url: String,
    #[arg(long)]
    pub source_key: String,
    #[arg(long, default_value = "localhost")]
    pub source_server_id: String,

    #[arg(long)]
    pub target_url: String,
    #[arg(long)]
    pub target_key: String,
    #[arg(long, default_value = "localhost")]
    pub target_server_id: String,

    /// May be repeated; at least one of this or `--zones-file` is required.
    #[arg(long = "zone")]
    pub zones: Vec<String>,
    #[arg(long)]
    pub zones_file: Option<PathBuf>,

    #[arg(long)]
    pub recreate: bool,
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub insecure_source: bool,
    #[arg(long)]
    pub insecure_target: bool,

    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
    #[arg(long, default_value_t = 500)]
    pub retry_backoff: u64,
    #[arg(long, default_value_t = 30_000)]
    pub retry_max_backoff: u64,
    #[arg(long, default_value_t = 250)]
    pub retry_jitter: u64,

    #[arg(long)]
    pub ignore_soa_serial: bool,
    #[arg(long)]
    pub auto_fix_cname_conflicts: bool,
    #[arg(long)]
    pub auto_fix_double_cname_conflicts: bool,
    #[arg(long)]
    pub normalize_txt_escapes: bool,

    #[arg(long, value_enum, default_value_t = CliOnError::Continue)]
    pub on_error: CliOnError,
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
    #[arg(long, default_value_t = 30)]
    pub graceful_timeout: u64,
    #[arg(long, default_value_t = 0)]
    pub progress_interval: u64,

    #[arg(long, default_value = "info")]
    pub log_level: String,
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliOnError {
    Continue,
    Stop,
}

impl From<CliOnError> for OnError {
    fn from(value: CliOnError) -> Self {
        match value {
            CliOnError::Continue => OnError::Continue,
            CliOnError::Stop => OnError::Stop,
        }
    }
}

/// Everything `main` needs, validated and typed: connection descriptors,
/// the resolved zone list, and every component's options struct.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: ConnectionDescriptor,
    pub target: ConnectionDescriptor,
    pub zones: Vec<ZoneName>,
    pub migrator: MigratorOptions,
    pub batch: BatchDriverOptions,
    pub log_level: String,
    pub verbose: u8,
}

impl Config {
    /// Validates the CLI surface and resolves it into a `Config`. Reading
    /// `--zones-file`, if given, happens here too, so the only fallible
    /// step after this point is network I/O.
    pub fn from_cli(cli: Cli) -> Result<Self, MigrateError> {
        let have_zone = !cli.zones.is_empty();
        let have_file = cli.zones_file.is_some();
        if have_zone == have_file {
            return Err(MigrateError::Config(
                "exactly one of --zone or --zones-file is required".to_string(),
            ));
        }

        let raw_names: Vec<String> = if let Some(path) = &cli.zones_file {
            read_zones_file(path)?
        } else {
            cli.zones.clone()
        };
        if raw_names.is_empty() {
            return Err(MigrateError::Config(
                "zone list resolved to no zones".to_string(),
            ));
        }
        let zones = crate::batch::dedupe_zone_names(raw_names.into_iter().map(ZoneName::new));

        let retry = RetryPolicy {
            retries: cli.retries,
            base_backoff: Duration::from_millis(cli.retry_backoff),
            max_backoff: Duration::from_millis(cli.retry_max_backoff),
            jitter: Duration::from_millis(cli.retry_jitter),
        };

        let source = ConnectionDescriptor {
            base_url: cli.source_url.clone(),
            api_key: cli.source_key.clone(),
            server_id: cli.source_server_id.clone(),
            insecure: cli.insecure_source,
            timeout: Duration::from_secs(cli.timeout),
            retry,
        };
        let target = ConnectionDescriptor {
            base_url: cli.target_url.clone(),
            api_key: cli.target_key.clone(),
            server_id: cli.target_server_id.clone(),
            insecure: cli.insecure_target,
            timeout: Duration::from_secs(cli.timeout),
            retry,
        };

        let migrator = MigratorOptions {
            recreate: cli.recreate,
            dry_run: cli.dry_run,
            sanitize: SanitizeOptions {
                normalize_txt_escapes: cli.normalize_txt_escapes,
                auto_fix_cname_conflicts: cli.auto_fix_cname_conflicts,
                auto_fix_double_cname_conflicts: cli.auto_fix_double_cname_conflicts,
            },
            diff: DiffOptions {
                ignore_soa_serial: cli.ignore_soa_serial,
            },
        };

        let batch = BatchDriverOptions {
            concurrency: cli.concurrency.max(1),
            on_error: cli.on_error.into(),
            graceful_timeout: Duration::from_secs(cli.graceful_timeout),
            progress_interval: Duration::from_secs(cli.progress_interval),
        };

        Ok(Config {
            source,
            target,
            zones,
            migrator,
            batch,
            log_level: cli.log_level,
            verbose: cli.verbose,
        })
    }
}

/// Newline-delimited zone list: blank lines and `#`-prefixed comment lines
/// are skipped. De-duplication happens later, in `Config::from_cli`, so
/// this just parses.
fn read_zones_file(path: &std::path::Path) -> Result<Vec<String>, MigrateError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        MigrateError::Config(format!("reading zones file {}: {e}", path.display()))
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            source_url: "http://source".into(),
            source_key: "skey".into(),
            source_server_id: "localhost".into(),
            target_url: "http://target".into(),
            target_key: "tkey".into(),
            target_server_id: "localhost".into(),
            zones: vec![],
            zones_file: None,
            recreate: false,
            dry_run: false,
            insecure_source: false,
            insecure_target: false,
            timeout: 10,
            retries: 3,
            retry_backoff: 500,
            retry_max_backoff: 30_000,
            retry_jitter: 250,
            ignore_soa_serial: false,
            auto_fix_cname_conflicts: false,
            auto_fix_double_cname_conflicts: false,
            normalize_txt_escapes: false,
            on_error: CliOnError::Continue,
            concurrency: 4,
            graceful_timeout: 30,
            progress_interval: 0,
            log_level: "info".into(),
            verbose: 0,
        }
    }

    #[test]
    fn requires_exactly_one_of_zone_or_zones_file() {
        let cli = base_cli();
        let err = Config::from_cli(cli).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn rejects_both_zone_and_zones_file() {
        let mut cli = base_cli();
        cli.zones = vec!["example.com.".to_string()];
        cli.zones_file = Some(PathBuf::from("/tmp/does-not-matter"));
        let err = Config::from_cli(cli).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn builds_config_from_zone_flags() {
        let mut cli = base_cli();
        cli.zones = vec!["Example.COM".to_string(), "example.com.".to_string()];
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.zones.len(), 1);
        assert_eq!(config.zones[0].as_str(), "Example.COM.");
    }
}
