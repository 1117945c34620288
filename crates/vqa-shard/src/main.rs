//! `vqa-shard`: score a video/label workload across several GPUs.
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use vqa_observe::{ENV_LOG_FORMAT, ENV_LOG_LEVEL, LoggerConfig, LoggerFormat, logger_init};

mod commands;
use commands::{IngestCommand, MergeCommand, RelabelCommand, RunCommand, WorkerCommand};

#[derive(Parser)]
#[command(name = "vqa-shard")]
#[command(about = "Multi-GPU VQA scoring orchestrator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args)]
struct LogArgs {
    /// Log filter directive, e.g. `info` or `info,vqa.exec=debug`
    #[arg(long, global = true, env = ENV_LOG_LEVEL, default_value = "info")]
    log_level: String,

    /// Log output format: text, json or journald
    #[arg(long, global = true, env = ENV_LOG_FORMAT, default_value = "text")]
    log_format: LoggerFormat,

    /// Disable ANSI colors in text logs
    #[arg(long, global = true)]
    no_color: bool,
}

impl LogArgs {
    fn config(&self) -> LoggerConfig {
        let mut cfg = LoggerConfig {
            format: self.log_format,
            level: self.log_level.clone(),
            ..Default::default()
        };
        if self.no_color {
            cfg.use_color = false;
        }
        cfg
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Partition an input file, score it on every GPU and merge the results
    Run(RunCommand),

    /// Score one slice on the current GPU (started by `run`)
    #[command(hide = true)]
    Worker(WorkerCommand),

    /// Merge the partial outputs of a run again
    Merge(MergeCommand),

    /// Build an input file from a local directory of videos
    Ingest(IngestCommand),

    /// Set the same label on every record of an existing input file
    Relabel(RelabelCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = cli.log.config();

    if let Err(e) = logger_init(&log) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Run(cmd) => commands::run::execute(cmd, &log).await,
        Commands::Worker(cmd) => commands::worker::execute(cmd).await,
        Commands::Merge(cmd) => commands::merge::execute(cmd),
        Commands::Ingest(cmd) => commands::ingest::execute(cmd),
        Commands::Relabel(cmd) => commands::relabel::execute(cmd),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(target: "vqa.shard", error = %format!("{e:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}
