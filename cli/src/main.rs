mod commit_message;
mod logging;
mod pipeline;
mod summary;
mod vcs;

use std::path::PathBuf;
use std::time::SystemTime;

use catalog_snapshot_discovery::oracle::{OracleConnector, OracleSettings};
use catalog_snapshot_store::AppConfig;
use clap::{Args, Parser, Subcommand};
use tracing::{info, info_span};

use crate::pipeline::SnapshotPipeline;
use crate::summary::RunSummary;
use crate::vcs::GitRepository;

const DEFAULT_CONFIG_PATH: &str = "config/snapshot.yml";

#[derive(Debug, Parser)]
#[command(name = "catalog-snapshot")]
#[command(about = "Catalog DDL snapshots and audit export (snapshot only, no migration)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract, normalize, write snapshots, export audit rows, and commit/push.
    Snapshot(RunArgs),
    /// Run extraction and classification without writing files, state, or git.
    DryRun(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to the YAML config file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Snapshot(args) => run_pipeline(args, false),
        Command::DryRun(args) => run_pipeline(args, true),
    };

    match result {
        Ok(summary) if summary.vcs_failed => std::process::exit(1),
        Ok(_) => {}
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// snapshot / dry-run
// ---------------------------------------------------------------------------

fn run_pipeline(args: RunArgs, dry_run: bool) -> Result<RunSummary, String> {
    let config_path = std::path::absolute(&args.config)
        .map_err(|e| format!("invalid config path {}: {e}", args.config.display()))?;
    let config = AppConfig::load(&config_path)
        .map_err(|e| format!("failed to load config {}: {e}", config_path.display()))?;

    let logs_dir = logging::logs_dir(&config_path);
    let log_file = logging::daily_log_file(&logs_dir);
    logging::init_logging(&log_file)?;
    let removed = logging::purge_old_logs(&logs_dir, config.logs.retention_days, SystemTime::now());
    if removed > 0 {
        info!(
            removed,
            retention_days = config.logs.retention_days,
            "Log retention applied"
        );
    }

    let span = info_span!(
        "run",
        service = %config.oracle.service_name,
        dry_run
    );
    let connector = OracleConnector::new(
        OracleSettings {
            username: config.oracle.username.clone(),
            password: config.oracle.password.clone(),
            connect_string: config.oracle.connect_string(),
        },
        span.clone(),
    );
    let git = GitRepository::new(&config.git.repo_path, span.clone());

    let summary = SnapshotPipeline::new(&config, connector, git, span)
        .with_log_file(log_file)
        .run(dry_run)
        .map_err(|e| e.to_string())?;

    print_summary(&summary, args.json)?;
    Ok(summary)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<(), String> {
    if json {
        let rendered = summary
            .render_json()
            .map_err(|e| format!("failed to serialize summary: {e}"))?;
        println!("{rendered}");
    } else {
        print!("{}", summary.render_text());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["catalog-snapshot", "snapshot"]);
        let Command::Snapshot(args) = cli.command else {
            panic!("expected snapshot");
        };
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!args.json);
    }

    #[test]
    fn test_dry_run_with_flags() {
        let cli = Cli::parse_from(["catalog-snapshot", "dry-run", "--config", "x.yml", "--json"]);
        let Command::DryRun(args) = cli.command else {
            panic!("expected dry-run");
        };
        assert_eq!(args.config, PathBuf::from("x.yml"));
        assert!(args.json);
    }
}
