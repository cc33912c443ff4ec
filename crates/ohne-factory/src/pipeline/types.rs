use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineFailure};
use crate::process::CancelToken;
use ohne_core::{Action, Stage};
use serde::Deserialize;
use std::{path::PathBuf, thread::JoinHandle};

/// Everything a running job reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStatus {
    Stage(Stage),
    /// A line for the log sink.
    Log(String),
    /// Global percent (0 - 100) with a short label.
    Progress { percent: f32, label: String },
    Finished(PathBuf),
    Error(String),
}

/// Input collected by the CLI; anything left `None` is prompted for.
#[derive(Debug, Clone)]
pub struct PipelineArgs {
    pub url: Option<String>,
    pub file: Option<PathBuf>,
    pub title: Option<String>,
    pub action: Action,
    pub config: PipelineConfig,
}

/// A job running on its own worker thread.
#[derive(Debug)]
pub struct JobHandle {
    pub(crate) cancel: CancelToken,
    pub(crate) thread: JoinHandle<Result<PathBuf, PipelineFailure>>,
}

impl JobHandle {
    /// Asks the job to stop. The running tool is killed and cleanup still
    /// runs; `join` then reports `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that outlives the handle, for signal handlers.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn name(&self) -> Option<&str> {
        self.thread.thread().name()
    }

    /// Waits for the worker and returns its result.
    pub fn join(self) -> Result<PathBuf, PipelineFailure> {
        self.thread.join().unwrap_or_else(|_| {
            Err(PipelineFailure {
                stage: Stage::Failed,
                error: PipelineError::WorkerPanicked,
            })
        })
    }
}

// Only the container duration is read.
#[derive(Debug, Deserialize)]
pub struct FFProbeOutput {
    pub format: Option<FFProbeFormat>,
}

#[derive(Debug, Deserialize)]
pub struct FFProbeFormat {
    pub duration: Option<String>,
}
