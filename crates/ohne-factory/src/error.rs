use crate::process::ProcessError;
use crate::workspace::WorkspaceError;
use ohne_core::{FailureCause, JobError, Stage, TransitionError};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidJob(#[from] JobError),
    #[error("source file not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },
    #[error("failed to launch {program}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {}", exit_label(.code))]
    ToolFailed {
        cause: FailureCause,
        program: String,
        code: Option<i32>,
    },
    #[error("expected artifact not found under {}", .searched.display())]
    ArtifactMissing {
        cause: FailureCause,
        searched: PathBuf,
    },
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("{operation} failed for {}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("job was cancelled")]
    Cancelled,
    #[error("worker thread panicked")]
    WorkerPanicked,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {}", c),
        None => "a signal".to_string(),
    }
}

impl PipelineError {
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn cause(&self) -> FailureCause {
        match self {
            PipelineError::InvalidJob(_) | PipelineError::SourceNotFound { .. } => {
                FailureCause::InvalidJob
            }
            PipelineError::Launch { .. } => FailureCause::LaunchFailed,
            PipelineError::ToolFailed { cause, .. } | PipelineError::ArtifactMissing { cause, .. } => {
                *cause
            }
            PipelineError::Cancelled => FailureCause::Cancelled,
            PipelineError::Workspace(_)
            | PipelineError::Io { .. }
            | PipelineError::Transition(_)
            | PipelineError::WorkerPanicked => FailureCause::UnexpectedFailure,
        }
    }
}

impl From<ProcessError> for PipelineError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Launch { program, source } => PipelineError::Launch { program, source },
            ProcessError::Wait { program, source } => PipelineError::Io {
                operation: "wait",
                path: PathBuf::from(program),
                source,
            },
            ProcessError::Cancelled { .. } => PipelineError::Cancelled,
        }
    }
}

/// A run that ended in `Failed`: the stage that was active and what went
/// wrong there.
#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: PipelineError,
}

impl PipelineFailure {
    pub fn cause(&self) -> FailureCause {
        self.error.cause()
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cause(), self.error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_maps_to_a_cause() {
        let launch = PipelineError::from(ProcessError::Launch {
            program: "yt-dlp".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        });
        assert_eq!(launch.cause(), FailureCause::LaunchFailed);

        let cancelled = PipelineError::from(ProcessError::Cancelled {
            program: "demucs".into(),
        });
        assert_eq!(cancelled.cause(), FailureCause::Cancelled);

        let merge = PipelineError::ToolFailed {
            cause: FailureCause::MergeFailed,
            program: "ffmpeg".into(),
            code: Some(1),
        };
        assert_eq!(merge.cause(), FailureCause::MergeFailed);
        assert_eq!(merge.to_string(), "ffmpeg exited with code 1");

        let invalid = PipelineError::from(JobError::MissingSource);
        assert_eq!(invalid.cause(), FailureCause::InvalidJob);
    }

    #[test]
    fn failure_display_leads_with_the_cause() {
        let failure = PipelineFailure {
            stage: Stage::SeparateVocals,
            error: PipelineError::ToolFailed {
                cause: FailureCause::SeparationFailed,
                program: "demucs".into(),
                code: None,
            },
        };
        assert_eq!(
            failure.to_string(),
            "Vocal separation failed: demucs exited with a signal"
        );
    }
}
