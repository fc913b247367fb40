//! epub-ingest - turn EPUB files into a self-contained reading model

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use epub_ingest::ingest::{BookOutcome, BookReport, discover_epubs};
use epub_ingest::{BatchOptions, BatchSummary, IngestOptions, ingest_batch};

#[derive(Parser)]
#[command(name = "epub-ingest")]
#[command(version, about = "Normalize EPUB files into book.json + images/", long_about = None)]
#[command(after_help = "EXAMPLES:
    epub-ingest book.epub                 Writes book_data/book.json
    epub-ingest --all ~/books             Every *.epub in the directory
    epub-ingest --all --skip-existing .   Only books without output yet")]
struct Cli {
    /// EPUB files, or directories when --all is given
    #[arg(value_name = "EPUB|DIR", required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for <name>_data output (default: next to each EPUB)
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Process every *.epub inside the given directories
    #[arg(short, long)]
    all: bool,

    /// Skip books whose book.json already exists
    #[arg(short, long)]
    skip_existing: bool,

    /// Number of books processed concurrently
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Fixed processing timestamp (RFC 3339); defaults to SOURCE_DATE_EPOCH or now
    #[arg(long, value_name = "RFC3339", value_parser = parse_timestamp)]
    timestamp: Option<DateTime<Utc>>,

    /// Keep this entry of an existing output directory when re-ingesting
    #[arg(long, value_name = "NAME")]
    preserve: Vec<String>,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log every chapter and image
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let paths = match collect_inputs(&cli) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if paths.is_empty() {
        eprintln!("No epub files found");
        return ExitCode::SUCCESS;
    }

    let mut ingest = IngestOptions::new();
    if let Some(at) = cli.timestamp.or_else(source_date_epoch) {
        ingest = ingest.processed_at(at);
    }
    for name in &cli.preserve {
        ingest = ingest.preserve(name.as_str());
    }

    let options = BatchOptions {
        output_root: cli.out.clone(),
        skip_existing: cli.skip_existing,
        jobs: cli.jobs.max(1),
        ingest,
    };

    let summary = ingest_batch(&paths, &options);
    if !cli.quiet {
        print_summary(&summary);
    }

    if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn collect_inputs(cli: &Cli) -> Result<Vec<PathBuf>, String> {
    if !cli.all {
        for path in &cli.inputs {
            if !path.is_file() {
                return Err(format!("{}: file not found", path.display()));
            }
        }
        return Ok(cli.inputs.clone());
    }

    let mut paths = Vec::new();
    for dir in &cli.inputs {
        let found = discover_epubs(dir).map_err(|e| e.to_string())?;
        println!("Found {} epub file(s) in {}", found.len(), dir.display());
        paths.extend(found);
    }
    Ok(paths)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp: {e}"))
}

fn source_date_epoch() -> Option<DateTime<Utc>> {
    let secs = std::env::var("SOURCE_DATE_EPOCH").ok()?.trim().parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}

fn print_summary(summary: &BatchSummary) {
    for result in &summary.books {
        println!();
        println!("{}", result.source.display());
        match &result.outcome {
            BookOutcome::Ingested(report) => print_report(report, &result.output_dir),
            BookOutcome::Skipped => println!("  Skipped (already processed)"),
            BookOutcome::Failed { reason } => println!("  Error: {reason}"),
        }
    }

    println!();
    println!(
        "Summary: {} processed, {} skipped, {} failed",
        summary.ingested(),
        summary.skipped(),
        summary.failed()
    );
}

fn print_report(report: &BookReport, output_dir: &std::path::Path) {
    println!("  Title: {}", report.title);
    if !report.authors.is_empty() {
        println!("  Authors: {}", report.authors.join(", "));
    }
    println!("  Physical Files (Spine): {}", report.chapters);
    println!("  TOC Root Items: {}", report.toc_entries);
    println!("  Images extracted: {}", report.images);
    if let Some(ref cover) = report.cover_image {
        println!("  Cover: {cover}");
    }
    if !report.diagnostics.is_empty() {
        println!("  Warnings: {}", report.diagnostics.len());
    }
    println!("  Output: {}", output_dir.display());
}
