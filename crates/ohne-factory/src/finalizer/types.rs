use crate::error::PipelineError;
use crate::process::{CommandPrefix, CommandSpec};
use ohne_core::{Action, FailureCause, StageParser};
use std::path::{Path, PathBuf};

/// Runs external tools on behalf of a finalizer and reports back to the
/// job's sinks. The pipeline implements this; tests can fake it.
pub trait ToolRunner {
    /// Runs `spec` to completion, feeding its output through `parser`.
    /// A non-zero exit fails with `cause`.
    fn run_tool(
        &mut self,
        cause: FailureCause,
        spec: CommandSpec,
        parser: &dyn StageParser,
    ) -> Result<(), PipelineError>;

    fn progress(&mut self, percent: f32, label: &str);

    fn log(&mut self, line: &str);
}

/// Inputs for producing the final artifact.
#[derive(Debug, Clone)]
pub struct FinalizeRequest<'a> {
    pub action: Action,
    pub vocals: &'a Path,
    pub video: &'a Path,
    pub output: PathBuf,
    pub transcoder: &'a CommandPrefix,
    /// Working directory for any tool the finalizer runs.
    pub cwd: &'a Path,
    pub open_result: bool,
}

/// One output strategy.
pub trait Finalizer {
    fn produce(
        &self,
        req: &FinalizeRequest<'_>,
        runner: &mut dyn ToolRunner,
    ) -> Result<(), PipelineError>;

    /// Log line announcing the finished artifact.
    fn done_message(&self, output: &Path) -> String;

    /// Label for the terminal 100% update.
    fn complete_label(&self, output: &Path) -> String;

    /// Noun used in the "Opening ... file" log line.
    fn kind(&self) -> &'static str;
}

/// `ExtractVocals`: the vocals stem copied out as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyVocals;

/// `MergeWithVideo`: original video stream muxed with the vocals track.
#[derive(Debug, Clone, Copy, Default)]
pub struct MuxWithVideo;

/// A finished artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalOutput {
    /// Absolute path of the artifact.
    pub path: PathBuf,
    pub label: String,
}
