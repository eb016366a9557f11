use anyhow::{anyhow, Context, Result};
use bill_organizer::bill_date::extract_date_target;
use bill_organizer::config::OrganizerConfig;
use bill_organizer::history::{HistoryLog, HistoryRecord};
use bill_organizer::logging::{init_logging, LogConfig};
use bill_organizer::mapping_table::LoadedMapping;
use bill_organizer::organizer::{preview_batch, BatchRequest, PreviewOutcome};
use bill_organizer::{extract_account_tokens, spawn_batch};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "bill-organizer", version, about = "File scanned utility bills by corporation, provider, account and year")]
struct Cli {
    /// Config file (defaults to $BILL_ORGANIZER_CONFIG or the per-user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Account mapping sheet (.xlsx, .xls, .ods or .csv)
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// A single bill or a folder of bills (not searched recursively)
    #[arg(short, long)]
    source: PathBuf,

    /// Root of the organized tree
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Document extension to pick up (default: pdf)
    #[arg(short, long)]
    extension: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Move bills into the organized tree
    Organize {
        #[command(flatten)]
        batch: BatchArgs,

        /// Do not record this run in the history log
        #[arg(long)]
        no_history: bool,
    },

    /// Show where each bill would go without moving anything
    Preview {
        #[command(flatten)]
        batch: BatchArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the lookup table built from a mapping sheet
    Mapping {
        /// Account mapping sheet (.xlsx, .xls, .ods or .csv)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the account tokens and date read from filenames
    Tokens {
        /// Filenames to inspect
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List previous runs, newest first
    History {
        /// Maximum number of runs to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

fn load_mapping(arg: Option<PathBuf>, config: &OrganizerConfig) -> Result<LoadedMapping> {
    let path = arg
        .or_else(|| config.mapping_path.clone())
        .ok_or_else(|| anyhow!("no mapping file given (use --mapping or set mapping_path in the config)"))?;
    let mapping = LoadedMapping::load(&path)?;
    println!(
        "Loaded mapping entries: {} ({})",
        mapping.table.entry_count(),
        mapping.path.display()
    );
    Ok(mapping)
}

fn batch_request(batch: BatchArgs, config: &OrganizerConfig) -> Result<BatchRequest> {
    let mapping = load_mapping(batch.mapping, config)?;
    let dest = batch
        .dest
        .or_else(|| config.destination_root.clone())
        .ok_or_else(|| anyhow!("no destination folder given (use --dest or set destination_root in the config)"))?;
    let extension = batch
        .extension
        .unwrap_or_else(|| config.document_extension.clone());
    Ok(BatchRequest::new(mapping.table, batch.source, dest).with_extension(&extension))
}

async fn organize(batch: BatchArgs, no_history: bool, config: &OrganizerConfig) -> Result<()> {
    let request = batch_request(batch, config)?;
    println!("Starting file organization...");

    let result = spawn_batch(request)
        .drive(|event| println!("[{:>3}%] {}", event.percent, event.message))
        .await
        .context("organization failed")?;

    println!("{}", result.totals_line());
    println!("{}", "=".repeat(50));
    for line in &result.log {
        println!("{line}");
    }

    if !no_history {
        let log = HistoryLog::new(config.resolved_history_path());
        if let Err(err) = log.append(&HistoryRecord::from_result(&result)) {
            warn!(path = %log.path().display(), error = %err, "could not record run history");
        }
    }
    Ok(())
}

fn preview(batch: BatchArgs, as_json: bool, config: &OrganizerConfig) -> Result<()> {
    let request = batch_request(batch, config)?;
    let entries = preview_batch(&request)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in entries {
        match entry.outcome {
            PreviewOutcome::Planned {
                hierarchy,
                target_exists,
                ..
            } => {
                let note = if target_exists { "  (target exists, would skip)" } else { "" };
                println!("PLAN '{}' -> {hierarchy}{note}", entry.file_name);
            }
            PreviewOutcome::NotFound { reason } => {
                println!("NOT FOUND '{}': {reason}", entry.file_name);
            }
        }
    }
    Ok(())
}

fn print_mapping(arg: Option<PathBuf>, as_json: bool, config: &OrganizerConfig) -> Result<()> {
    let mapping = load_mapping(arg, config)?;
    if as_json {
        let rows = mapping
            .table
            .entries()
            .map(|(provider, token, entry)| json!({ "provider": provider, "token": token, "entry": entry }))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for (provider, token, entry) in mapping.table.entries() {
        println!("{:<7} {:<7} {}", provider.code(), token, entry.corporation);
    }
    Ok(())
}

fn print_tokens(names: &[String]) -> Result<()> {
    for name in names {
        let tokens = extract_account_tokens(name);
        let date = extract_date_target(name);
        println!(
            "{}",
            serde_json::to_string(&json!({ "file_name": name, "tokens": tokens, "date": date }))?
        );
    }
    Ok(())
}

fn print_history(limit: usize, config: &OrganizerConfig) -> Result<()> {
    let log = HistoryLog::new(config.resolved_history_path());
    let records = log
        .load()
        .with_context(|| format!("failed to read history {}", log.path().display()))?;
    if records.is_empty() {
        println!("No runs recorded yet.");
    }
    for record in records.iter().take(limit) {
        println!("{}", record.summary_line());
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = OrganizerConfig::discover(cli.config.as_deref())?;
    match cli.command {
        Commands::Organize { batch, no_history } => organize(batch, no_history, &config).await,
        Commands::Preview { batch, json } => preview(batch, json, &config),
        Commands::Mapping { mapping, json } => print_mapping(mapping, json, &config),
        Commands::Tokens { names } => print_tokens(&names),
        Commands::History { limit } => print_history(limit, &config),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(LogConfig { verbose: cli.verbose }) {
        eprintln!("{err}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
