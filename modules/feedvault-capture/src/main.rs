//! Replay CLI: run saved API response dumps through the extraction pipeline
//! offline and export what it finds. Useful for regression-checking the
//! shape recognizers against real captured payloads.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use feedvault_capture::export;
use feedvault_capture::parse;
use feedvault_capture::scan;
use feedvault_capture::store::MediaStore;
use feedvault_common::Config;

#[derive(Parser)]
#[command(
    name = "feedvault-replay",
    about = "Replay captured feed responses through the media extraction pipeline"
)]
struct Args {
    /// Response dump files to replay, in capture order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Treat inputs as raw page HTML/script text instead of JSON responses.
    #[arg(long)]
    script_text: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Write here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Csv,
    Urls,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    let store = MediaStore::shared();

    for path in &args.inputs {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let records = if args.script_text {
            scan::scan_script_text(&raw)
        } else {
            let value: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            parse::parse_with_depth(&value, config.parse_depth_cap)
        };

        let mut store = store.lock().await;
        let added = records.into_iter().filter(|r| store.insert(r.clone())).count();
        info!(file = %path.display(), added, "replayed dump");
    }

    let (snapshot, stats) = {
        let store = store.lock().await;
        (store.snapshot(), store.stats())
    };

    let output = match args.format {
        Format::Json => export::to_json(&snapshot)?,
        Format::Csv => export::to_csv(&snapshot),
        Format::Urls => export::to_url_list(&snapshot),
    };
    match &args.out {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{output}"),
    }

    info!(
        images = stats.images,
        videos = stats.videos,
        "replay complete"
    );
    Ok(())
}
