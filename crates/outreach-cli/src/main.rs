//! Outreach CLI - paced, audited profile messaging over one browser session
//!
//! Usage:
//!   outreach init [path]                 Write a default .outreach/config.toml
//!   outreach run --targets <file>        Message every target in the file
//!   outreach check-session               Verify the session token works
//!   outreach ledger [--failed]           Show recorded outcomes

mod targets;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use outreach_browser::{ChromeSurface, Surface};
use outreach_core::{resolve_session_token, OutcomeStatus, OutreachConfig, RunSummary};
use outreach_engine::{load_records, new_run_id, DelayGenerator, Orchestrator, SessionManager};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "outreach")]
#[command(author, version, about = "Paced, audited profile messaging over one browser session")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to .outreach/config.toml under the working directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Message every target in a file
    Run {
        /// JSON array or JSON lines of target records
        #[arg(long, value_name = "FILE")]
        targets: PathBuf,

        /// Maximum successful sends for this run
        #[arg(long)]
        max: Option<usize>,

        /// Message template overriding the configured one
        #[arg(long)]
        template: Option<String>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Write surface snapshots to this directory
        #[arg(long, value_name = "DIR")]
        diagnostics: Option<PathBuf>,
    },

    /// Establish the session and report whether it is live
    CheckSession {
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// Print recorded outcomes
    Ledger {
        /// Only failed targets
        #[arg(long)]
        failed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let root = PathBuf::from(".");
    match cli.command {
        Commands::Init { path } => cmd_init(path),
        Commands::Run {
            targets,
            max,
            template,
            headed,
            diagnostics,
        } => {
            let mut config = load_config(cli.config.as_deref(), &root)?;
            if let Some(max) = max {
                config.run.max_messages = max;
            }
            if let Some(template) = template {
                config.run.message_template = template;
            }
            if headed {
                config.browser.headless = false;
            }
            if diagnostics.is_some() {
                config.paths.diagnostics_dir = diagnostics;
            }
            config.validate()?;
            cmd_run(config, &root, &targets).await
        }
        Commands::CheckSession { headed } => {
            let mut config = load_config(cli.config.as_deref(), &root)?;
            if headed {
                config.browser.headless = false;
            }
            cmd_check_session(config).await
        }
        Commands::Ledger { failed } => {
            let config = load_config(cli.config.as_deref(), &root)?;
            cmd_ledger(&config, &root, failed).await
        }
    }
}

fn load_config(explicit: Option<&Path>, root: &Path) -> Result<OutreachConfig> {
    let config = match explicit {
        Some(path) => OutreachConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => OutreachConfig::load_or_default(root).context("Failed to load config")?,
    };
    Ok(config)
}

fn cmd_init(path: PathBuf) -> Result<()> {
    info!("Initializing outreach in {:?}", path);
    let config_path = OutreachConfig::write_default(&path).context("Failed to write config")?;

    println!("Initialized outreach in {:?}", path);
    println!("Created:");
    println!("  {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Edit the message template and pacing in the config");
    println!("  2. export OUTREACH_SESSION_TOKEN=<session cookie value>");
    println!("  3. outreach check-session");
    println!("  4. outreach run --targets targets.json");
    Ok(())
}

async fn cmd_run(config: OutreachConfig, root: &Path, targets_path: &Path) -> Result<()> {
    let targets = targets::load_targets(targets_path)?;
    info!("Loaded {} targets from {}", targets.len(), targets_path.display());

    let token = resolve_session_token(&config.session).context("No usable session token")?;

    let surface = ChromeSurface::start(&config.browser)
        .await
        .context("Failed to start browser")?;
    let run_id = new_run_id();
    let mut orchestrator = Orchestrator::from_config(surface, &config, Some(token), root, &run_id)
        .await
        .context("Failed to prepare run")?;
    let ledger_path = orchestrator.ledger().path().to_path_buf();

    match orchestrator.run(targets).await {
        Ok(summary) => {
            print_summary(&run_id, &summary, &ledger_path);
            Ok(())
        }
        Err(aborted) => {
            print_summary(&run_id, &aborted.summary, &ledger_path);
            println!("\nRUN ABORTED: {}", aborted.reason);
            println!("Remaining targets were not attempted.");
            bail!("run aborted: {}", aborted.reason)
        }
    }
}

fn print_summary(run_id: &str, summary: &RunSummary, ledger: &Path) {
    println!("\nRun {}", run_id);
    println!("==============");
    println!("Sent:    {}", summary.sent_count);
    if summary.unconfirmed_count > 0 {
        println!("  unconfirmed: {}", summary.unconfirmed_count);
    }
    println!("Failed:  {}", summary.failed_count);
    println!("Skipped: {}", summary.skipped_count);
    println!("Ledger:  {}", ledger.display());
}

async fn cmd_check_session(config: OutreachConfig) -> Result<()> {
    let token = resolve_session_token(&config.session).context("No usable session token")?;
    println!("Using session token {}", token);

    let surface = ChromeSurface::start(&config.browser)
        .await
        .context("Failed to start browser")?;
    let mut session = SessionManager::from_config(surface, &config, Some(token), DelayGenerator::new());
    session
        .ensure_authenticated()
        .await
        .context("Session could not be established")?;

    let url = session.surface().current_url().await?;
    println!("Session is live ({})", url);
    Ok(())
}

async fn cmd_ledger(config: &OutreachConfig, root: &Path, failed_only: bool) -> Result<()> {
    let path = OutreachConfig::resolve_path(root, &config.paths.ledger);
    let records = load_records(&path)
        .await
        .with_context(|| format!("Failed to read ledger {}", path.display()))?;

    if records.is_empty() {
        println!("No outcomes recorded in {}", path.display());
        return Ok(());
    }

    let mut totals = [0usize; 3];
    for record in &records {
        match record.status {
            OutcomeStatus::Sent => totals[0] += 1,
            OutcomeStatus::Failed => totals[1] += 1,
            OutcomeStatus::Skipped => totals[2] += 1,
        }

        if failed_only && record.status != OutcomeStatus::Failed {
            continue;
        }

        let status = match (record.status, record.confirmed) {
            (OutcomeStatus::Sent, Some(false)) => "sent?".to_string(),
            (status, _) => status.to_string(),
        };
        println!(
            "{}  {:<8} {:<12} {}{}",
            record.timestamp.format("%Y-%m-%d %H:%M"),
            status,
            record.run_id,
            record.url,
            record
                .error
                .as_ref()
                .map(|e| format!("  ({})", e))
                .unwrap_or_default()
        );
    }

    println!(
        "\n{} records: {} sent, {} failed, {} skipped",
        records.len(),
        totals[0],
        totals[1],
        totals[2]
    );
    println!("Ledger: {}", path.display());
    Ok(())
}
