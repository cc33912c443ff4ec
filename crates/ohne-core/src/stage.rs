use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline states, in the only order a run may visit them.
///
/// The happy path is `Init → AcquireSource → ExtractAudio → SeparateVocals →
/// Finalize → Cleanup → Done`. A failure in any working stage jumps straight to
/// `Cleanup` and ends in `Failed`; a failure in `Init` (nothing acquired yet)
/// goes directly to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    AcquireSource,
    ExtractAudio,
    SeparateVocals,
    Finalize,
    Cleanup,
    Done,
    Failed,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::AcquireSource => "acquire_source",
            Stage::ExtractAudio => "extract_audio",
            Stage::SeparateVocals => "separate_vocals",
            Stage::Finalize => "finalize",
            Stage::Cleanup => "cleanup",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Stage::Init => "Initializing",
            Stage::AcquireSource => "Acquiring source video",
            Stage::ExtractAudio => "Extracting audio",
            Stage::SeparateVocals => "Separating vocals",
            Stage::Finalize => "Producing output",
            Stage::Cleanup => "Cleaning up",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Next state on the happy path.
    pub const fn successor(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::AcquireSource),
            Stage::AcquireSource => Some(Stage::ExtractAudio),
            Stage::ExtractAudio => Some(Stage::SeparateVocals),
            Stage::SeparateVocals => Some(Stage::Finalize),
            Stage::Finalize => Some(Stage::Cleanup),
            Stage::Cleanup => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    pub fn can_transition_to(self, next: Stage) -> bool {
        if self.successor() == Some(next) {
            return true;
        }
        matches!(
            (self, next),
            (Stage::Init, Stage::Failed)
                | (
                    Stage::AcquireSource
                        | Stage::ExtractAudio
                        | Stage::SeparateVocals
                        | Stage::Finalize,
                    Stage::Cleanup
                )
                | (Stage::Cleanup, Stage::Failed)
        )
    }

    /// Slice of the global 0-100 scale owned by this stage.
    ///
    /// `AcquireSource` starts at the 10% checkpoint the source announcement
    /// jumps to, so the download itself only spans 10-30.
    pub const fn progress_range(self) -> (f32, f32) {
        match self {
            Stage::Init => (0.0, 0.0),
            Stage::AcquireSource => (10.0, 30.0),
            Stage::ExtractAudio => (30.0, 50.0),
            Stage::SeparateVocals => (50.0, 90.0),
            Stage::Finalize => (90.0, 100.0),
            Stage::Cleanup | Stage::Done => (100.0, 100.0),
            Stage::Failed => (0.0, 0.0),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal stage transition from {from} to {to}")]
pub struct TransitionError {
    pub from: Stage,
    pub to: Stage,
}

/// Enforces the stage order for a single run: no skipping, no re-entry.
#[derive(Debug, Clone)]
pub struct StageMachine {
    current: Stage,
    history: Vec<Stage>,
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StageMachine {
    pub fn new() -> Self {
        Self {
            current: Stage::Init,
            history: vec![Stage::Init],
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Every state visited so far, starting with `Init`.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    pub fn advance(&mut self, next: Stage) -> Result<(), TransitionError> {
        if !self.current.can_transition_to(next) {
            return Err(TransitionError {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    InvalidJob,
    LaunchFailed,
    DownloadFailed,
    DownloadArtifactMissing,
    ExtractionFailed,
    SeparationFailed,
    VocalsArtifactMissing,
    MergeFailed,
    Cancelled,
    UnexpectedFailure,
}

impl FailureCause {
    pub const fn describe(self) -> &'static str {
        match self {
            FailureCause::InvalidJob => "Invalid job",
            FailureCause::LaunchFailed => "Could not launch external tool",
            FailureCause::DownloadFailed => "Download failed",
            FailureCause::DownloadArtifactMissing => "Downloaded video not found",
            FailureCause::ExtractionFailed => "Audio extraction failed",
            FailureCause::SeparationFailed => "Vocal separation failed",
            FailureCause::VocalsArtifactMissing => "Vocals file not found",
            FailureCause::MergeFailed => "Merging vocals with video failed",
            FailureCause::Cancelled => "Cancelled",
            FailureCause::UnexpectedFailure => "Unexpected error",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}
