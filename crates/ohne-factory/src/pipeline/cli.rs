use super::async_handler::run_async;
use super::types::{JobHandle, PipelineArgs, PipelineStatus};
use crate::tools::check_dependencies;
use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use ohne_core::{Job, Source};
use std::{path::PathBuf, sync::mpsc};

pub fn run_cli(args: PipelineArgs) -> Result<()> {
    check_dependencies(&args.config.tools)?;

    let (url, file) = resolve_source(args.url, args.file)?;
    let source = Source::from_inputs(url.as_deref(), file.as_deref())?;

    let title: String = match args.title {
        Some(t) => t,
        None => {
            let suggested = file
                .as_ref()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "vocals".into());
            Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Enter output title")
                .default(suggested)
                .interact_text()?
        }
    };

    let job = Job::new(source, title, args.action);
    println!(
        "\n🚀 Starting Job: {} [{}] -> {}",
        job.output_title,
        job.action.as_str(),
        args.config.output_dir.display()
    );

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
        )?
        .progress_chars("#>-"),
    );

    let (tx, rx) = mpsc::channel();
    let handle = run_async(job, args.config, tx)?;
    cancel_on_interrupt(&handle, &pb);

    // Runs until the worker drops its sender, so a cancelled job still gets
    // to clean up and report before the process exits.
    for status in rx {
        match status {
            PipelineStatus::Stage(stage) => {
                tracing::debug!(stage = %stage, "stage changed");
            }
            PipelineStatus::Log(line) => pb.println(line),
            PipelineStatus::Progress { percent, label } => {
                pb.set_position(percent.round() as u64);
                pb.set_message(label);
            }
            PipelineStatus::Finished(path) => {
                pb.finish_with_message("All tasks finished.");
                println!("✅ Success! Saved at: {}", path.display());
            }
            PipelineStatus::Error(e) => {
                pb.abandon_with_message(format!("Error: {}", e));
            }
        }
    }

    handle.join()?;
    Ok(())
}

/// Turns Ctrl-C into a job cancellation instead of killing the process
/// mid-stage.
fn cancel_on_interrupt(handle: &JobHandle, pb: &ProgressBar) {
    let token = handle.cancel_token();
    let pb = pb.clone();
    let installed = ctrlc::set_handler(move || {
        if !token.is_cancelled() {
            pb.set_message("Cancelling, cleaning up...");
        }
        token.cancel();
    });
    if let Err(e) = installed {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }
}

/// Asks which kind of source to use when neither was given.
fn resolve_source(
    url: Option<String>,
    file: Option<PathBuf>,
) -> Result<(Option<String>, Option<PathBuf>)> {
    if url.is_some() || file.is_some() {
        return Ok((url, file));
    }

    let choices = ["YouTube URL", "Local video file"];
    let idx = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select video source")
        .default(0)
        .items(&choices)
        .interact()?;

    if idx == 0 {
        let url: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Enter YouTube URL")
            .interact_text()?;
        Ok((Some(url), None))
    } else {
        let path: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Enter path to video file")
            .interact_text()?;
        Ok((None, Some(PathBuf::from(path.trim()))))
    }
}
