use super::core::process_job;
use super::types::{JobHandle, PipelineStatus};
use crate::config::PipelineConfig;
use crate::process::CancelToken;
use anyhow::{Context, Result};
use ohne_core::Job;
use std::sync::mpsc::Sender;
use std::thread;

/// Runs `job` on a dedicated worker thread so the caller stays responsive.
/// Statuses arrive on `sender` from that thread, ending with `Finished` or
/// `Error`.
pub fn run_async(
    job: Job,
    config: PipelineConfig,
    sender: Sender<PipelineStatus>,
) -> Result<JobHandle> {
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let thread = thread::Builder::new()
        .name(format!("ohne-{}", job.action.as_str()))
        .spawn(move || {
            process_job(&job, &config, &worker_cancel, move |status| {
                // A receiver that went away just stops listening.
                let _ = sender.send(status);
            })
        })
        .context("failed to spawn worker thread")?;

    Ok(JobHandle { cancel, thread })
}
