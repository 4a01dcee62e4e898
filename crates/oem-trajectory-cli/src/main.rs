use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use oem_trajectory_core::{
    load_sources, parse_report, LoadProgress, LoadReport, ProgressCallback, SourceFetcher,
};
use oem_trajectory_source_fs::{OemDirectory, PathSources, DEFAULT_OEM_DIR};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

type JsonObject = Map<String, Value>;

#[derive(Debug, Parser)]
#[command(name = "oemtraj")]
#[command(about = "Assemble satellite trajectories from OEM ephemeris files")]
struct Cli {
    /// Directory holding `.oem` files.
    #[arg(long, default_value = DEFAULT_OEM_DIR)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the `.oem` files that a directory load would read, in load order.
    List,
    /// Parse one file and report every dropped line.
    Parse(ParseArgs),
    /// Load several files into one combined trajectory.
    Load(LoadArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Explicit files, loaded in the order given. Defaults to every file under `--dir`.
    #[arg(long = "file")]
    files: Vec<PathBuf>,
    /// Emit only the flat list of position triples instead of full records.
    #[arg(long, default_value_t = false)]
    positions_only: bool,
    /// Also write the combined trajectory records to this file.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Number of trailing positions to include in the summary.
    #[arg(long, default_value_t = 3)]
    preview: usize,
}

fn emit_json(mut object: JsonObject) -> Result<()> {
    object.insert(
        "contract_version".to_string(),
        Value::String(CLI_CONTRACT_VERSION.to_string()),
    );
    println!("{}", serde_json::to_string_pretty(&object)?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::List => run_list(&OemDirectory::new(cli.dir)).await,
        Command::Parse(args) => run_parse(&args),
        Command::Load(args) => run_load(&args, OemDirectory::new(cli.dir)).await,
    }
}

async fn run_list(directory: &OemDirectory) -> Result<()> {
    let files = directory.list().await?;
    let mut object = JsonObject::new();
    object.insert("directory".to_string(), Value::String(directory.root().display().to_string()));
    object.insert("files".to_string(), serde_json::to_value(files)?);
    emit_json(object)
}

fn run_parse(args: &ParseArgs) -> Result<()> {
    let raw_text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let report = parse_report(&raw_text);
    let mut object = JsonObject::new();
    object.insert("source_id".to_string(), Value::String(args.file.display().to_string()));
    object.insert("record_count".to_string(), Value::from(report.records.len()));
    object.insert("covariance_line".to_string(), serde_json::to_value(report.covariance_line)?);
    object.insert("records".to_string(), serde_json::to_value(&report.records)?);
    object.insert("skipped".to_string(), serde_json::to_value(&report.skipped)?);
    emit_json(object)
}

async fn run_load(args: &LoadArgs, directory: OemDirectory) -> Result<()> {
    let progress: ProgressCallback = Box::new(log_progress);
    let report = if args.files.is_empty() {
        let source_ids = directory.list().await?;
        load_with(&directory, &source_ids, &progress).await?
    } else {
        let source_ids = explicit_source_ids(&args.files)?;
        load_with(&PathSources, &source_ids, &progress).await?
    };
    tracing::info!("{}", report.summary());

    if let Some(out) = &args.out {
        let body = serde_json::to_string_pretty(&report.trajectory)?;
        fs::write(out, body).with_context(|| format!("failed to write {}", out.display()))?;
        tracing::info!(path = %out.display(), "wrote combined trajectory");
    }

    emit_json(load_summary(&report, args)?)
}

/// `PathSources` reopens files from their identifier, so the identifier must be the exact
/// path; a lossy rendering of a non UTF-8 path would point at a different file.
fn explicit_source_ids(files: &[PathBuf]) -> Result<Vec<String>> {
    files
        .iter()
        .map(|path| {
            path.to_str()
                .map(ToString::to_string)
                .with_context(|| format!("file path is not valid UTF-8: {}", path.display()))
        })
        .collect()
}

async fn load_with<F>(
    fetcher: &F,
    source_ids: &[String],
    progress: &ProgressCallback,
) -> Result<LoadReport>
where
    F: SourceFetcher + Sync,
{
    Ok(load_sources(fetcher, source_ids, Some(progress)).await?)
}

fn log_progress(update: LoadProgress) {
    tracing::info!(
        source = %update.source_id,
        processed = update.processed,
        total = update.total,
        fraction = update.fraction(),
        "{}",
        update.message
    );
}

fn load_summary(report: &LoadReport, args: &LoadArgs) -> Result<JsonObject> {
    let mut object = JsonObject::new();
    object.insert("sources_processed".to_string(), Value::from(report.sources_processed()));
    object.insert("total_records".to_string(), Value::from(report.total_records()));
    object.insert("failed_sources".to_string(), Value::from(report.failed_sources().count()));
    object.insert("empty_sources".to_string(), Value::from(report.empty_sources().count()));
    object.insert("outcomes".to_string(), serde_json::to_value(&report.outcomes)?);
    object.insert(
        "preview".to_string(),
        serde_json::to_value(report.trajectory.last_positions(args.preview))?,
    );
    if args.positions_only {
        object.insert("positions".to_string(), serde_json::to_value(report.trajectory.positions())?);
    } else {
        object.insert("trajectory".to_string(), serde_json::to_value(&report.trajectory)?);
    }
    if let Some(out) = &args.out {
        object.insert("written_to".to_string(), Value::String(out.display().to_string()));
    }
    Ok(object)
}
