use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use flowkeep_config::{FlowkeepConfig, HandshakeMode};
use flowkeep_storage::{FileBlobStore, JsonLinesSink};
use flowkeep_telemetry::{EventLogger, MetricsRecorder};
use tracing::info;

use crate::error::CliError;
use crate::runtime;

#[derive(Parser)]
#[command(name = "flowkeep", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reassemble segment traces into flow records
    Replay(ReplayArgs),
    /// Load, validate and print the effective configuration
    CheckConfig(CheckConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Configuration file (defaults to config/flowkeep.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory receiving blob files
    #[arg(long)]
    pub blob_dir: Option<PathBuf>,
    /// JSON-lines file receiving records (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Only reassemble connections whose handshake was observed
    #[arg(long)]
    pub strict: bool,
    /// Print Prometheus metrics when done
    #[arg(long)]
    pub metrics: bool,
    /// Trace files, each replayed as one capture batch
    #[arg(required = true)]
    pub traces: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckConfigArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<FlowkeepConfig, CliError> {
    Ok(match path {
        Some(path) => FlowkeepConfig::load_from_path(path)?,
        None => FlowkeepConfig::load()?,
    })
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Replay(args) => replay(args).await,
        Commands::CheckConfig(args) => check_config(args),
    }
}

async fn replay(args: ReplayArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if args.strict {
        config.assembler.handshake = HandshakeMode::Strict;
    }
    if let Some(dir) = args.blob_dir {
        config.storage.blob_dir = dir;
    }
    if let Some(output) = args.output {
        config.storage.records = Some(output);
    }
    config.telemetry.print_metrics |= args.metrics;

    EventLogger::init(&config.telemetry.log_level);
    let metrics = Arc::new(MetricsRecorder::new());
    let blobs = Arc::new(FileBlobStore::open(&config.storage.blob_dir).map_err(CliError::from)?);
    let writer: Box<dyn Write + Send> = match &config.storage.records {
        Some(path) => Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let sink = Arc::new(JsonLinesSink::new(writer));

    for trace in &args.traces {
        let summary = runtime::replay_batch(
            trace,
            &config.assembler,
            blobs.clone(),
            sink.clone(),
            metrics.clone(),
        )
        .await?;
        sink.flush().map_err(CliError::from)?;
        info!(
            trace = %trace.display(),
            segments = summary.segments,
            malformed = summary.malformed,
            "Batch finished"
        );
    }
    info!(records = sink.written(), "Replay complete");

    if config.telemetry.print_metrics {
        eprintln!("{}", metrics.gather_metrics()?);
    }
    Ok(())
}

fn check_config(args: CheckConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_ref())?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replay_arguments() {
        let cli = Cli::try_parse_from([
            "flowkeep",
            "replay",
            "--strict",
            "--blob-dir",
            "/tmp/blobs",
            "a.trace",
            "b.trace",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay(args) => {
                assert!(args.strict);
                assert_eq!(args.blob_dir, Some(PathBuf::from("/tmp/blobs")));
                assert_eq!(args.traces.len(), 2);
            }
            Commands::CheckConfig(_) => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn replay_requires_a_trace() {
        assert!(Cli::try_parse_from(["flowkeep", "replay"]).is_err());
    }

    #[test]
    fn check_config_subcommand() {
        let cli = Cli::try_parse_from(["flowkeep", "check-config", "-c", "x.yaml"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckConfig(_)));
    }
}
