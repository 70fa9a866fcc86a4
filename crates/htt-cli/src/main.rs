//! HTT analysis CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use htt_analysis::{Sequence, SequenceConfig};
use htt_core::{HistoSet, TreeEvent};

#[derive(Parser)]
#[command(name = "htt")]
#[command(about = "HTT - di-tau event selection and categorisation")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream events through a module sequence
    Run {
        /// Sequence file (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Input events (JSON Lines, one event per line)
        #[arg(short, long)]
        input: PathBuf,

        /// Accepted events (JSON Lines). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Histogram output (pretty JSON), keyed by module directory.
        #[arg(long)]
        histos: Option<PathBuf>,

        /// Per-module counters (pretty JSON).
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Print a sequence file with all defaults filled in
    ShowConfig {
        /// Sequence file (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct ModuleSummary<'a> {
    name: &'a str,
    accepted: u64,
    rejected: u64,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    processed: u64,
    accepted: u64,
    modules: Vec<ModuleSummary<'a>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { config, input, output, histos, summary } => {
            cmd_run(&config, &input, output.as_ref(), histos.as_ref(), summary.as_ref())
        }
        Commands::ShowConfig { config, output } => cmd_show_config(&config, output.as_ref()),
    }
}

fn load_config(path: &PathBuf) -> Result<SequenceConfig> {
    SequenceConfig::from_path(path)
        .with_context(|| format!("failed to load sequence file {}", path.display()))
}

fn cmd_show_config(config: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    let cfg = load_config(config)?;
    write_json(output, serde_json::to_value(&cfg)?)
}

fn cmd_run(
    config: &PathBuf,
    input: &PathBuf,
    output: Option<&PathBuf>,
    histos: Option<&PathBuf>,
    summary: Option<&PathBuf>,
) -> Result<()> {
    let cfg = load_config(config)?;
    let mut seq = Sequence::from_config(&cfg);
    seq.pre_analysis()?;
    tracing::info!(channel = %cfg.channel, modules = ?seq.module_names(), "sequence built");

    let reader = BufReader::new(
        std::fs::File::open(input)
            .with_context(|| format!("failed to open events {}", input.display()))?,
    );
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let mut accepted = 0u64;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut event: TreeEvent = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event", input.display(), lineno + 1))?;
        let status = seq
            .process(&mut event)
            .with_context(|| format!("{}:{}: processing failed", input.display(), lineno + 1))?;
        tracing::debug!(line = lineno + 1, status = status.code(), "event processed");
        if status.is_accept() {
            accepted += 1;
            serde_json::to_writer(&mut writer, &event)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;
    drop(writer);

    seq.post_analysis()?;
    tracing::info!(processed = seq.processed(), accepted, "run complete");

    if let Some(path) = histos {
        let sets: BTreeMap<&str, &HistoSet> =
            seq.histograms().into_iter().map(|h| (h.directory.as_str(), h)).collect();
        write_json(Some(path), serde_json::to_value(sets)?)?;
    }
    if let Some(path) = summary {
        let modules = seq
            .module_names()
            .into_iter()
            .zip(seq.counts())
            .map(|(name, c)| ModuleSummary { name, accepted: c.accepted, rejected: c.rejected })
            .collect();
        let report = RunSummary { processed: seq.processed(), accepted, modules };
        write_json(Some(path), serde_json::to_value(report)?)?;
    }
    Ok(())
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
