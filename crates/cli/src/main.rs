//! `tally`: interpret OCR'd receipts into structured JSON.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rayon::prelude::*;
use tally_kie::{EngineConfig, Interpreter, RawLine, ReceiptRecord};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Extract store, items and totals from OCR'd receipt text")]
struct Args {
    /// Engine configuration (TOML); defaults apply to missing keys.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Inputs are JSON arrays of `{ "text": ..., "bbox": {x,y,w,h} }` rows.
    #[arg(long)]
    boxes: bool,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,

    /// OCR dumps to interpret, one receipt per file; `-` reads stdin.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn interpret_file(interpreter: &Interpreter, path: &Path, boxes: bool) -> Result<ReceiptRecord> {
    let input = read_input(path)?;
    let mut record = if boxes {
        let lines: Vec<RawLine> = serde_json::from_str(&input)
            .with_context(|| format!("{} is not a JSON array of OCR rows", path.display()))?;
        interpreter.interpret_with_boxes(&lines)
    } else {
        interpreter.interpret_text(&input)
    };
    record.fill_datetime(Utc::now());
    Ok(record)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let interpreter = Interpreter::new(config);

    // Collected in argument order regardless of completion order.
    let results: Vec<(&PathBuf, Result<ReceiptRecord>)> = args
        .files
        .par_iter()
        .map(|path| (path, interpret_file(&interpreter, path, args.boxes)))
        .collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0usize;
    for (path, result) in results {
        match result {
            Ok(record) => {
                tracing::info!(
                    file = %path.display(),
                    items = record.lines.len(),
                    total = record.totals.total,
                    "interpreted"
                );
                let json = if args.pretty {
                    serde_json::to_string_pretty(&record)?
                } else {
                    serde_json::to_string(&record)?
                };
                writeln!(out, "{json}")?;
            }
            Err(e) => {
                tracing::error!(file = %path.display(), "{e:#}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} inputs could not be interpreted", args.files.len());
    }
    Ok(())
}
