//! patchwatch command line

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use patchwatch::config::{self, DEFAULT_CONFIG_FILE, DEFAULT_MACHINES_FILE};
use patchwatch::core::{FleetAuditor, HostAuditor};
use patchwatch::platform::SshConnector;
use patchwatch::{logger, report};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "patchwatch")]
#[command(author, version, about = "Audit a fleet of Linux hosts for pending security updates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit every machine once and write the report
    Run {
        /// Policy configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Machine inventory
        #[arg(short, long, default_value = DEFAULT_MACHINES_FILE)]
        machines: PathBuf,

        /// Also write the full results as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Skip the text report
        #[arg(long)]
        no_report: bool,

        /// Debug-level logging
        #[arg(short, long)]
        verbose: bool,

        /// Append logs to this file as well
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Exit with status 2 when a notification is warranted
        #[arg(long)]
        fail_on_notify: bool,
    },

    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

struct RunArgs {
    config: PathBuf,
    machines: PathBuf,
    json: Option<PathBuf>,
    no_report: bool,
    fail_on_notify: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (verbose, log_file) = match &cli.command {
        Commands::Run {
            verbose, log_file, ..
        } => (*verbose, log_file.clone()),
        Commands::Init { .. } => (false, None),
    };
    if let Err(e) = logger::init_logger(verbose, log_file.as_deref()) {
        eprintln!("patchwatch: cannot initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Init { config } => init(config),
        Commands::Run {
            config,
            machines,
            json,
            no_report,
            fail_on_notify,
            ..
        } => {
            run(RunArgs {
                config,
                machines,
                json,
                no_report,
                fail_on_notify,
            })
            .await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("patchwatch: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init(path: PathBuf) -> Result<ExitCode> {
    config::write_default_config(&path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    println!("Configuration written to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let config = config::load_config(&args.config)?;
    let fleet = config::load_machines(&args.machines, &config)?;
    if fleet.hosts.is_empty() {
        anyhow::bail!("no machines defined in {}", args.machines.display());
    }

    let connector = Arc::new(SshConnector::new(config.command_timeout()));
    let auditor = HostAuditor::new(
        connector,
        Arc::new(fleet.credentials),
        config.audit_settings(),
    );
    let fleet_auditor = FleetAuditor::new(auditor, config.fleet_settings());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight audits");
            let _ = cancel_tx.send(true);
        }
    });

    let today = Local::now().weekday();
    let fleet_report = fleet_auditor.run(&fleet.hosts, today, cancel_rx).await;

    println!("{}", report::render_summary(&fleet_report));

    if !args.no_report {
        let dir = &config.reports.directory;
        let path = report::write_text_report(dir, &fleet_report, config.disk.alert_threshold)
            .context("cannot write text report")?;
        println!("Report written to {}", path.display());
        report::prune_reports(dir, config.reports.max_files)
            .context("cannot prune old reports")?;
    }
    if let Some(json_path) = &args.json {
        report::write_json_report(json_path, &fleet_report)
            .with_context(|| format!("cannot write {}", json_path.display()))?;
    }

    let decision = fleet_report.notification;
    match decision.reason {
        Some(reason) => println!("Notification warranted: {reason}"),
        None => println!("No notification needed"),
    }

    if decision.notify && args.fail_on_notify {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
