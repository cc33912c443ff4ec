use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ohne_core::Action;
use ohne_factory::{
    init_logging, run_check_cli, run_cli, LogFormat, LoggingConfig, PipelineArgs, PipelineConfig,
    ToolCommands, WorkspaceLayout,
};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser)]
#[command(name = "ohne")]
#[command(version)]
#[command(about = "Ohne - Only Vocals: strip a video down to its vocal track")]
struct Cli {
    /// JSON config file; flags and environment override it
    #[arg(long, global = true, env = "OHNE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "OHNE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the vocals as <title>.wav
    Extract(JobOpts),
    /// Replace the audio of the video with its vocals as <title>.mp4
    Merge(JobOpts),
    /// Look for yt-dlp, ffmpeg, demucs and ffprobe and print their versions
    Check,
}

#[derive(Args)]
struct JobOpts {
    #[arg(short, long, conflicts_with = "file")]
    url: Option<String>,

    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Output file name without extension
    #[arg(short, long)]
    title: Option<String>,

    #[arg(short, long, env = "OHNE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Where per-job scratch directories are created
    #[arg(long, env = "OHNE_WORK_ROOT")]
    work_root: Option<PathBuf>,

    /// Use fixed file names directly in the work root (one job at a time)
    #[arg(long, default_value_t = false)]
    shared_workspace: bool,

    /// Do not open the result when done
    #[arg(long, default_value_t = false)]
    no_open: bool,

    /// Log every download progress line
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: cli.log_level.clone(),
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("⚠️ Logging disabled: {:#}", e);
    }

    let result = match cli.command {
        Commands::Extract(opts) => run_job(cli.config, opts, Action::ExtractVocals),
        Commands::Merge(opts) => run_job(cli.config, opts, Action::MergeWithVideo),
        Commands::Check => load_config(cli.config).and_then(|c| run_check_cli(&c.tools)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_file(&p).context("Could not load config"),
        None => Ok(PipelineConfig {
            tools: ToolCommands::discover(),
            ..PipelineConfig::default()
        }),
    }
}

fn run_job(config_path: Option<PathBuf>, opts: JobOpts, action: Action) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = opts.output_dir {
        config.output_dir = dir;
    }
    if let Some(dir) = opts.work_root {
        config.work_root = dir;
    }
    if opts.shared_workspace {
        config.workspace_layout = WorkspaceLayout::Shared;
    }
    if opts.no_open {
        config.open_result = false;
    }
    config.verbose |= opts.verbose;

    run_cli(PipelineArgs {
        url: opts.url,
        file: opts.file,
        title: opts.title,
        action,
        config,
    })
}
