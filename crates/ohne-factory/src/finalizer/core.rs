use super::types::*;
use super::utils::{mux_command, open_with_default_handler};
use crate::error::PipelineError;
use ohne_core::{Action, FailureCause, MergeParser};
use std::{fs, path::Path};
use tracing::{info, warn};

impl Finalizer for CopyVocals {
    fn produce(
        &self,
        req: &FinalizeRequest<'_>,
        _runner: &mut dyn ToolRunner,
    ) -> Result<(), PipelineError> {
        fs::copy(req.vocals, &req.output)
            .map_err(|e| PipelineError::io("copy vocals", &req.output, e))?;
        Ok(())
    }

    fn done_message(&self, output: &Path) -> String {
        format!("Vocals extracted: {}", output.display())
    }

    fn complete_label(&self, _output: &Path) -> String {
        "Complete! Vocals extracted".to_string()
    }

    fn kind(&self) -> &'static str {
        "audio"
    }
}

impl Finalizer for MuxWithVideo {
    fn produce(
        &self,
        req: &FinalizeRequest<'_>,
        runner: &mut dyn ToolRunner,
    ) -> Result<(), PipelineError> {
        runner.progress(95.0, "Merging vocals with video...");
        let spec = mux_command(req.transcoder, req.video, req.vocals, &req.output)
            .current_dir(req.cwd);
        runner.run_tool(FailureCause::MergeFailed, spec, &MergeParser)
    }

    fn done_message(&self, output: &Path) -> String {
        format!("Done! Saved as {}", output.display())
    }

    fn complete_label(&self, output: &Path) -> String {
        format!("Complete! Saved as {}", output.display())
    }

    fn kind(&self) -> &'static str {
        "video"
    }
}

pub fn finalizer_for(action: Action) -> &'static dyn Finalizer {
    match action {
        Action::ExtractVocals => &CopyVocals,
        Action::MergeWithVideo => &MuxWithVideo,
    }
}

/// Produces the artifact for `req.action`, resolves its absolute path and,
/// if asked, opens it. Failing to open is logged, never returned.
pub fn finalize(
    req: &FinalizeRequest<'_>,
    runner: &mut dyn ToolRunner,
) -> Result<FinalOutput, PipelineError> {
    let finalizer = finalizer_for(req.action);
    finalizer.produce(req, runner)?;

    let full_path = fs::canonicalize(&req.output)
        .map_err(|e| PipelineError::io("resolve output", &req.output, e))?;
    runner.log(&finalizer.done_message(&req.output));
    runner.log(&format!("Full path: {}", full_path.display()));
    info!(path = %full_path.display(), action = req.action.as_str(), "output written");

    if req.open_result {
        match open_with_default_handler(&full_path) {
            Ok(()) => runner.log(&format!("Opening {} file...", finalizer.kind())),
            Err(e) => {
                warn!(path = %full_path.display(), error = %e, "could not open output");
                runner.log(&format!("Could not open file automatically: {}", e));
            }
        }
    }

    Ok(FinalOutput {
        label: finalizer.complete_label(&req.output),
        path: full_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandPrefix, CommandSpec};
    use ohne_core::StageParser;
    use std::ffi::OsStr;

    #[derive(Default)]
    struct FakeRunner {
        commands: Vec<(FailureCause, CommandSpec)>,
        progress: Vec<f32>,
        logs: Vec<String>,
        exit_ok: bool,
    }

    impl ToolRunner for FakeRunner {
        fn run_tool(
            &mut self,
            cause: FailureCause,
            spec: CommandSpec,
            _parser: &dyn StageParser,
        ) -> Result<(), PipelineError> {
            let output = spec.args.last().cloned().unwrap();
            self.commands.push((cause, spec));
            if !self.exit_ok {
                return Err(PipelineError::ToolFailed {
                    cause,
                    program: "ffmpeg".into(),
                    code: Some(1),
                });
            }
            fs::write(output, b"muxed").unwrap();
            Ok(())
        }

        fn progress(&mut self, percent: f32, _label: &str) {
            self.progress.push(percent);
        }

        fn log(&mut self, line: &str) {
            self.logs.push(line.to_string());
        }
    }

    fn request<'a>(
        action: Action,
        dir: &'a Path,
        vocals: &'a Path,
        transcoder: &'a CommandPrefix,
    ) -> FinalizeRequest<'a> {
        FinalizeRequest {
            action,
            vocals,
            video: vocals,
            output: dir.join(format!("song.{}", action.extension())),
            transcoder,
            cwd: dir,
            open_result: false,
        }
    }

    #[test]
    fn extract_copies_vocals_without_running_tools() {
        let dir = tempfile::tempdir().unwrap();
        let vocals = dir.path().join("vocals.wav");
        fs::write(&vocals, b"la la").unwrap();
        let ffmpeg = CommandPrefix::new("ffmpeg");
        let mut runner = FakeRunner::default();

        let out = finalize(
            &request(Action::ExtractVocals, dir.path(), &vocals, &ffmpeg),
            &mut runner,
        )
        .unwrap();

        assert!(out.path.is_absolute());
        assert_eq!(fs::read(&out.path).unwrap(), b"la la");
        assert!(runner.commands.is_empty());
        assert!(runner.logs.iter().any(|l| l.starts_with("Full path: ")));
        assert_eq!(out.label, "Complete! Vocals extracted");
    }

    #[test]
    fn merge_runs_the_mux_command() {
        let dir = tempfile::tempdir().unwrap();
        let vocals = dir.path().join("vocals.wav");
        fs::write(&vocals, b"la la").unwrap();
        let ffmpeg = CommandPrefix::new("ffmpeg");
        let mut runner = FakeRunner {
            exit_ok: true,
            ..Default::default()
        };

        let out = finalize(
            &request(Action::MergeWithVideo, dir.path(), &vocals, &ffmpeg),
            &mut runner,
        )
        .unwrap();

        let (cause, spec) = &runner.commands[0];
        assert_eq!(*cause, FailureCause::MergeFailed);
        assert!(spec.args.iter().any(|a| a == OsStr::new("-shortest")));
        assert_eq!(runner.progress, vec![95.0]);
        assert_eq!(fs::read(&out.path).unwrap(), b"muxed");
    }

    #[test]
    fn failed_merge_produces_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let vocals = dir.path().join("vocals.wav");
        fs::write(&vocals, b"la la").unwrap();
        let ffmpeg = CommandPrefix::new("ffmpeg");
        let mut runner = FakeRunner::default();

        let err = finalize(
            &request(Action::MergeWithVideo, dir.path(), &vocals, &ffmpeg),
            &mut runner,
        )
        .unwrap_err();
        assert_eq!(err.cause(), FailureCause::MergeFailed);
        assert!(runner.logs.is_empty());
    }
}
