//! fileguard - file integrity catalog and bit-rot verifier.
//!
//! Usage:
//!   fileguard scan [PATHS...]   Hash new and changed files into the catalog
//!   fileguard verify            Re-hash cataloged files and report damage
//!   fileguard report            Catalog statistics, problems and history
//!   fileguard --help            Show help

mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::{ArgAction, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fileguard_catalog::{Catalog, CatalogRecord, FileStatus};
use fileguard_core::{MediaKind, SourceSpec};
use fileguard_integrity::{IntegrityScanner, ScanEvent, ScanOutcome, ScanSummary, Summary, Verifier, VerifyResult};

use crate::settings::Settings;

/// Exit status when corrupted or missing files are found.
const EXIT_PROBLEMS: u8 = 2;
/// Exit status when a scan could not walk one of its source roots.
const EXIT_SOURCE_FAILED: u8 = 3;

#[derive(Parser)]
#[command(
    name = "fileguard",
    version,
    about = "File integrity catalog and bit-rot verifier",
    long_about = "fileguard keeps a catalog of content digests for every file on a \
                  set of disks, follows files that move between disks, and reports \
                  files whose content changed silently or disappeared."
)]
struct Cli {
    /// Settings file (defaults to <config dir>/fileguard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog database, overriding the settings file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hash files into the catalog, detecting moves
    Scan {
        /// Roots to scan (defaults to the sources in the settings file)
        paths: Vec<PathBuf>,

        /// Re-hash every file instead of skipping unchanged size and mtime
        #[arg(long)]
        full: bool,

        /// Extra exclusion regex matched against full paths
        #[arg(short, long = "exclude")]
        exclude: Vec<String>,

        /// Hashing workers per source
        #[arg(short, long)]
        workers: Option<usize>,

        /// Medium behind ad-hoc paths (rotational, ssd, unknown)
        #[arg(short, long)]
        media: Option<MediaKind>,
    },

    /// Re-hash cataloged files and classify them
    Verify {
        /// Skip files whose size and mtime are unchanged
        #[arg(short, long)]
        quick: bool,

        /// Only verify this source
        #[arg(short, long)]
        source: Option<String>,

        /// Hashing workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show catalog statistics, problem files and run history
    Report {
        /// List records of one source
        #[arg(long)]
        source: Option<String>,

        /// List records with a status (ok, corrupted, missing)
        #[arg(long)]
        status: Option<FileStatus>,

        /// List records whose path contains this text
        #[arg(long)]
        search: Option<String>,

        /// Show recent scan and verify runs
        #[arg(long)]
        history: bool,

        /// Maximum rows for search and history
        #[arg(short = 'n', long, default_value = "0")]
        limit: usize,
    },
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;
    let db = cli.db.clone().unwrap_or_else(|| settings.database.clone());
    let catalog = Catalog::open(&db, settings.algorithm)
        .wrap_err_with(|| format!("Cannot open catalog {}", db.display()))?;

    match cli.command {
        Command::Scan {
            paths,
            full,
            exclude,
            workers,
            media,
        } => {
            let sources = resolve_sources(&settings, paths, workers, media)?;
            let summary = run_scan(&catalog, &settings, sources, full, &exclude, cli.json)?;
            Ok(scan_exit_code(&summary))
        }
        Command::Verify {
            quick,
            source,
            workers,
        } => {
            let summary = run_verify(&catalog, &settings, quick, source, workers, cli.json)?;
            if summary.is_clean() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_PROBLEMS))
            }
        }
        Command::Report {
            source,
            status,
            search,
            history,
            limit,
        } => {
            run_report(&catalog, source, status, search, history, limit, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Log to stderr so stdout stays clean for JSON.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fileguard=info")),
        1 => EnvFilter::new("fileguard=debug"),
        _ => EnvFilter::new("fileguard=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Ad-hoc paths win over configured sources.
fn resolve_sources(
    settings: &Settings,
    paths: Vec<PathBuf>,
    workers: Option<usize>,
    media: Option<MediaKind>,
) -> Result<Vec<SourceSpec>> {
    let mut sources = if paths.is_empty() {
        settings.sources.clone()
    } else {
        paths
            .iter()
            .map(|path| {
                let root = path
                    .canonicalize()
                    .wrap_err_with(|| format!("Invalid path {}", path.display()))?;
                Ok(SourceSpec::from_root(root).with_media(media.unwrap_or_default()))
            })
            .collect::<Result<Vec<_>>>()?
    };
    if sources.is_empty() {
        return Err(eyre!(
            "Nothing to scan: pass paths or configure [[sources]] in the settings file"
        ));
    }
    if let Some(workers) = workers {
        sources = sources.into_iter().map(|s| s.with_workers(workers)).collect();
    }
    Ok(sources)
}

#[derive(Serialize)]
struct ScanOutput<'a> {
    summary: &'a ScanSummary,
    events: &'a [ScanEvent],
}

fn run_scan(
    catalog: &Catalog,
    settings: &Settings,
    sources: Vec<SourceSpec>,
    full: bool,
    exclude: &[String],
    json: bool,
) -> Result<ScanSummary> {
    let config = settings.scan_config(full, exclude)?;
    for source in &sources {
        info!(
            source = %source.label,
            root = %source.root.display(),
            media = %source.media,
            workers = source.worker_count(&config.worker_policy),
            "source"
        );
    }

    let scan = IntegrityScanner::new(catalog, config).prepare(sources)?;
    let mut progress = scan.subscribe();
    let reporter = thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || loop {
            match progress.blocking_recv() {
                Ok(p) => info!(
                    hashed = p.files_hashed,
                    skipped = p.files_skipped,
                    rate = %format!("{}/s", format_size(p.bytes_per_second() as u64)),
                    "progress"
                ),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        })
        .wrap_err("Cannot start progress reporter")?;

    let mut notable = Vec::new();
    let summary = scan.run(|event| match &event.outcome {
        ScanOutcome::New | ScanOutcome::Updated | ScanOutcome::Unchanged => {}
        _ => {
            if !json {
                print_event(event);
            }
            notable.push(event.clone());
        }
    });
    // The progress sender is dropped once the run returns, either way.
    let _ = reporter.join();
    let summary = summary.wrap_err("Scan failed")?;

    if json {
        let output = ScanOutput {
            summary: &summary,
            events: &notable,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(summary);
    }

    println!();
    println!("{}", "─".repeat(60));
    println!(" Scan finished in {:.2}s", summary.duration.as_secs_f64());
    println!("{}", "─".repeat(60));
    println!(" {:<16} {:>10}", "hashed", summary.hashed);
    println!(" {:<16} {:>10}", "skipped", summary.skipped);
    println!(" {:<16} {:>10}", "new", summary.new);
    println!(" {:<16} {:>10}", "updated", summary.updated);
    println!(" {:<16} {:>10}", "unchanged", summary.unchanged);
    println!(" {:<16} {:>10}", "moved", summary.moved);
    println!(" {:<16} {:>10}", "move corrupted", summary.move_corrupted);
    println!(" {:<16} {:>10}", "errors", summary.errors + summary.walk_errors);
    println!();
    for source in &summary.sources {
        let state = match &source.error {
            Some(err) => format!("FAILED: {err}"),
            None => format!("{} files", source.files_walked),
        };
        println!("   {:<16} {:>2} workers  {}", source.label, source.workers, state);
    }
    Ok(summary)
}

fn scan_exit_code(summary: &ScanSummary) -> ExitCode {
    if summary.is_clean() {
        ExitCode::SUCCESS
    } else if summary.move_corrupted > 0 {
        ExitCode::from(EXIT_PROBLEMS)
    } else {
        ExitCode::from(EXIT_SOURCE_FAILED)
    }
}

fn print_event(event: &ScanEvent) {
    match &event.outcome {
        ScanOutcome::Moved { from } => {
            println!(" moved      {} -> {}", from.display(), event.path.display());
        }
        ScanOutcome::MoveCorrupted { from } => {
            println!(" CORRUPTED  {} (moved from {})", event.path.display(), from.display());
        }
        ScanOutcome::Error { message } => {
            println!(" error      {}: {message}", event.path.display());
        }
        _ => {}
    }
}

#[derive(Serialize)]
struct VerifyOutput<'a> {
    summary: &'a Summary,
    problems: &'a [VerifyResult],
}

fn run_verify(
    catalog: &Catalog,
    settings: &Settings,
    quick: bool,
    source: Option<String>,
    workers: Option<usize>,
    json: bool,
) -> Result<Summary> {
    let config = settings.verify_config(quick, source, workers)?;

    let mut problems = Vec::new();
    let summary = Verifier::new(catalog, config)
        .run_with(|result| {
            if !result.status.is_problem() {
                return;
            }
            if !json {
                print_problem(result);
            }
            problems.push(result.clone());
        })
        .wrap_err("Verify failed")?;

    if json {
        let output = VerifyOutput {
            summary: &summary,
            problems: &problems,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(summary);
    }

    println!();
    println!("{}", "─".repeat(60));
    println!(" Verify finished in {:.2}s", summary.duration.as_secs_f64());
    println!("{}", "─".repeat(60));
    println!(" {:<16} {:>10}", "checked", summary.total_checked);
    println!(" {:<16} {:>10}", "ok", summary.ok);
    println!(" {:<16} {:>10}", "corrupted", summary.corrupted);
    println!(" {:<16} {:>10}", "missing", summary.missing);
    println!(" {:<16} {:>10}", "skipped", summary.skipped);
    println!(" {:<16} {:>10}", "read errors", summary.errors);
    println!();
    if summary.is_clean() {
        println!(" All files intact.");
    } else {
        println!(" {} problem file(s) found.", summary.corrupted + summary.missing);
    }
    Ok(summary)
}

fn print_problem(result: &VerifyResult) {
    match result.status {
        FileStatus::Missing => println!(" MISSING    {}", result.path.display()),
        _ => {
            let detail = match (&result.new_digest, &result.error) {
                (Some(new), _) => format!("{} -> {}", result.old_digest.short(), new.short()),
                (None, Some(err)) => err.clone(),
                (None, None) => String::new(),
            };
            println!(" CORRUPTED  {}  {detail}", result.path.display());
        }
    }
}

fn run_report(
    catalog: &Catalog,
    source: Option<String>,
    status: Option<FileStatus>,
    search: Option<String>,
    history: bool,
    limit: usize,
    json: bool,
) -> Result<()> {
    if history {
        let entries = catalog.history(limit)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }
        for entry in &entries {
            let ended = entry
                .ended_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                " #{:<5} {:<7} {:<10} {}  {}  {:>8} items {:>5} errors  {}",
                entry.id,
                entry.kind,
                entry.status,
                entry.started_at.format("%Y-%m-%d %H:%M:%S"),
                ended,
                entry.items_processed,
                entry.errors,
                entry.scope
            );
        }
        return Ok(());
    }

    let listing = match (source, status, search) {
        (Some(source), _, _) => Some(catalog.by_source(&source)?),
        (None, Some(status), _) => Some(catalog.by_status(status)?),
        (None, None, Some(needle)) => Some(catalog.search(&needle, limit)?),
        (None, None, None) => None,
    };
    if let Some(records) = listing {
        return print_records(&records, json);
    }

    let stats = catalog.stats()?;
    let per_source = catalog.source_stats()?;
    let mut problems = catalog.by_status(FileStatus::Corrupted)?;
    problems.extend(catalog.by_status(FileStatus::Missing)?);

    if json {
        #[derive(Serialize)]
        struct Report<'a> {
            stats: &'a fileguard_catalog::CatalogStats,
            sources: &'a [fileguard_catalog::SourceStats],
            problems: &'a [CatalogRecord],
        }
        let report = Report {
            stats: &stats,
            sources: &per_source,
            problems: &problems,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let when = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string())
    };
    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {} files, {}",
        stats.total_files,
        format_size(stats.total_bytes)
    );
    println!(
        " {} ok, {} corrupted, {} missing",
        stats.ok, stats.corrupted, stats.missing
    );
    println!(" Last scan {}, last verify {}", when(stats.last_scan), when(stats.last_verify));
    println!("{}", "─".repeat(60));
    for s in &per_source {
        println!(
            "   {:<16} {:>8} files {:>10}  {:>4} corrupted {:>4} missing",
            s.source,
            s.total_files,
            format_size(s.total_bytes),
            s.corrupted,
            s.missing
        );
    }
    if !problems.is_empty() {
        println!();
        for record in &problems {
            println!(" {:<10} {}", record.status.as_ref().to_uppercase(), record.path.display());
        }
    }
    Ok(())
}

fn print_records(records: &[CatalogRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    for record in records {
        println!(
            " {:<9} {:>10}  {}  {}",
            record.status,
            format_size(record.size),
            record.digest.short(),
            record.path.display()
        );
    }
    println!();
    println!(" {} record(s)", records.len());
    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
