use super::types::PipelineStatus;
use super::utils::{download_command, extract_command, probe_duration, separate_command, OutputTail};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineFailure};
use crate::finalizer::{finalize, output_path, FinalOutput, FinalizeRequest, ToolRunner};
use crate::process::{run_streaming, CancelToken, CommandSpec};
use crate::workspace::Workspace;
use ohne_core::{
    DownloadParser, FailureCause, Job, ProgressTracker, SeparationParser, Source, Stage,
    StageMachine, StageParser, StageProgress, TranscodeParser, ValidJob, SEPARATION_MODEL,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, trace, warn};

/// Lines of tool output replayed to the log when a tool fails.
const TAIL_LINES: usize = 8;

/// Runs `job` from `Init` to `Done`/`Failed` on the calling thread.
///
/// Every status goes through `callback`, in order. Progress is non-decreasing
/// until the terminal update: `100` on success, `0` with an `Error: ...`
/// label on failure. Once the workspace is acquired, cleanup runs on every
/// exit path.
pub fn process_job<F>(
    job: &Job,
    config: &PipelineConfig,
    cancel: &CancelToken,
    callback: F,
) -> Result<PathBuf, PipelineFailure>
where
    F: Fn(PipelineStatus),
{
    PipelineRun::new(config, cancel, &callback).execute(job)
}

struct PipelineRun<'a> {
    config: &'a PipelineConfig,
    cancel: &'a CancelToken,
    emit: &'a dyn Fn(PipelineStatus),
    machine: StageMachine,
    tracker: ProgressTracker,
    output_dir: PathBuf,
    duration: Option<f64>,
}

impl<'a> PipelineRun<'a> {
    fn new(
        config: &'a PipelineConfig,
        cancel: &'a CancelToken,
        emit: &'a dyn Fn(PipelineStatus),
    ) -> Self {
        Self {
            config,
            cancel,
            emit,
            machine: StageMachine::new(),
            tracker: ProgressTracker::new(),
            output_dir: config.output_dir.clone(),
            duration: None,
        }
    }

    fn execute(mut self, job: &Job) -> Result<PathBuf, PipelineFailure> {
        (self.emit)(PipelineStatus::Stage(Stage::Init));
        self.progress(0.0, "Initializing...");

        let (valid, mut workspace) = match self.init(job) {
            Ok(ready) => ready,
            Err(error) => return self.fail(Stage::Init, error),
        };

        let outcome = self.work(&valid, &mut workspace);
        let failed_in = self.machine.current();
        self.cleanup(&mut workspace);

        match outcome {
            Ok(output) => self.succeed(output),
            Err(error) => self.fail(failed_in, error),
        }
    }

    fn init(&mut self, job: &Job) -> Result<(ValidJob, Workspace), PipelineError> {
        self.check_cancel()?;
        let mut valid = job.validate()?;

        if let Source::LocalFile(path) = &valid.source {
            if !path.is_file() {
                return Err(PipelineError::SourceNotFound { path: path.clone() });
            }
            let absolute =
                fs::canonicalize(path).map_err(|e| PipelineError::io("resolve source", path, e))?;
            valid.source = Source::LocalFile(absolute);
        }

        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir)
            .map_err(|e| PipelineError::io("create output directory", output_dir, e))?;
        self.output_dir = fs::canonicalize(output_dir)
            .map_err(|e| PipelineError::io("resolve output directory", output_dir, e))?;

        let workspace = Workspace::acquire(&self.config.work_root, self.config.workspace_layout)?;
        debug!(workspace = %workspace.root().display(), "job initialized");
        Ok((valid, workspace))
    }

    fn work(&mut self, job: &ValidJob, ws: &mut Workspace) -> Result<FinalOutput, PipelineError> {
        self.acquire_source(job, ws)?;
        self.extract_audio(ws)?;
        let vocals = self.separate_vocals(ws)?;
        self.finalize(job, ws, &vocals)
    }

    fn acquire_source(&mut self, job: &ValidJob, ws: &mut Workspace) -> Result<(), PipelineError> {
        self.enter(Stage::AcquireSource)?;

        match &job.source {
            Source::LocalFile(path) => {
                self.log(&format!("Using local video file: {}", path.display()));
                self.progress(10.0, "Using local video file");
                ws.adopt_local(path.clone());
            }
            Source::RemoteUrl(url) => {
                let purged = ws.purge_stale_downloads();
                if purged > 0 {
                    info!(count = purged, "removed stale downloads");
                }
                ws.claim_downloads();
                self.progress(10.0, "Downloading video...");
                let spec = download_command(&self.config.tools.downloader, url).current_dir(ws.root());
                let parser = DownloadParser {
                    verbose: self.config.verbose,
                };
                self.run_tool(FailureCause::DownloadFailed, spec, &parser)?;

                let video = ws
                    .locate_download()
                    .ok_or_else(|| PipelineError::ArtifactMissing {
                        cause: FailureCause::DownloadArtifactMissing,
                        searched: ws.root().to_path_buf(),
                    })?;
                self.log(&format!("Downloaded: {}", video.display()));
                ws.adopt_download(video);
                self.progress(30.0, "Video download complete");
            }
        }
        Ok(())
    }

    fn extract_audio(&mut self, ws: &Workspace) -> Result<(), PipelineError> {
        self.enter(Stage::ExtractAudio)?;
        let video = self.video_path(ws)?;

        if self.config.probe_duration {
            if let Some(prober) = &self.config.tools.prober {
                match probe_duration(prober, &video, self.cancel) {
                    Ok(secs) => {
                        debug!(duration = secs, "probed source duration");
                        self.duration = Some(secs);
                    }
                    Err(e) => debug!(error = %e, "duration probe failed, using heuristic"),
                }
                self.check_cancel()?;
            }
        }

        self.progress(30.0, "Extracting audio...");
        let spec = extract_command(&self.config.tools.transcoder, &video, &ws.audio_file())
            .current_dir(ws.root());
        let parser = TranscodeParser::with_duration(self.duration);
        self.run_tool(FailureCause::ExtractionFailed, spec, &parser)?;
        self.progress(50.0, "Audio extraction complete");
        Ok(())
    }

    fn separate_vocals(&mut self, ws: &Workspace) -> Result<PathBuf, PipelineError> {
        self.enter(Stage::SeparateVocals)?;
        self.progress(50.0, "Starting vocal separation...");
        let spec = separate_command(&self.config.tools.separator, &ws.audio_file())
            .current_dir(ws.root());
        self.run_tool(FailureCause::SeparationFailed, spec, &SeparationParser)?;
        self.progress(90.0, "Vocal separation complete");

        match ws.locate_vocals(SEPARATION_MODEL) {
            Some(vocals) => Ok(vocals),
            None => {
                self.log("Vocals file not found!");
                Err(PipelineError::ArtifactMissing {
                    cause: FailureCause::VocalsArtifactMissing,
                    searched: ws.model_dir(SEPARATION_MODEL),
                })
            }
        }
    }

    fn finalize(
        &mut self,
        job: &ValidJob,
        ws: &Workspace,
        vocals: &Path,
    ) -> Result<FinalOutput, PipelineError> {
        self.enter(Stage::Finalize)?;
        let video = self.video_path(ws)?;
        let config = self.config;
        let request = FinalizeRequest {
            action: job.action,
            vocals,
            video: &video,
            output: output_path(&self.output_dir, &job.title, job.action),
            transcoder: &config.tools.transcoder,
            cwd: ws.root(),
            open_result: config.open_result,
        };
        finalize(&request, self)
    }

    fn cleanup(&mut self, ws: &mut Workspace) {
        if let Err(e) = self.enter(Stage::Cleanup) {
            warn!(error = %e, "cleanup entered out of order");
        }
        let report = ws.release();
        for (path, err) in &report.failures {
            warn!(path = %path.display(), error = %err, "cleanup failed");
        }
    }

    fn succeed(mut self, output: FinalOutput) -> Result<PathBuf, PipelineFailure> {
        if let Err(error) = self.enter(Stage::Done) {
            return self.fail(Stage::Cleanup, error);
        }
        self.progress(100.0, &output.label);
        (self.emit)(PipelineStatus::Finished(output.path.clone()));
        Ok(output.path)
    }

    fn fail(mut self, stage: Stage, error: PipelineError) -> Result<PathBuf, PipelineFailure> {
        let cause = error.cause();
        let message = format!("{}: {}", cause, error);
        warn!(stage = %stage, cause = ?cause, error = %error, "job failed");

        self.log(&message);
        if let Err(e) = self.enter(Stage::Failed) {
            warn!(error = %e, "failed state entered out of order");
        }
        self.tracker.reset();
        (self.emit)(PipelineStatus::Progress {
            percent: 0.0,
            label: format!("Error: {}", cause),
        });
        (self.emit)(PipelineStatus::Error(message));
        Err(PipelineFailure { stage, error })
    }

    fn enter(&mut self, stage: Stage) -> Result<(), PipelineError> {
        self.machine.advance(stage)?;
        info!(stage = %stage, "entering stage");
        (self.emit)(PipelineStatus::Stage(stage));
        if !stage.is_terminal() && stage != Stage::Cleanup {
            self.check_cancel()?;
        }
        Ok(())
    }

    fn check_cancel(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn video_path(&self, ws: &Workspace) -> Result<PathBuf, PipelineError> {
        ws.video_file()
            .map(|v| v.path().to_path_buf())
            .ok_or_else(|| PipelineError::ArtifactMissing {
                cause: FailureCause::UnexpectedFailure,
                searched: ws.root().to_path_buf(),
            })
    }

    fn measured(&mut self, stage: Stage, progress: StageProgress) {
        let percent = self.tracker.advance(stage, progress.fraction);
        (self.emit)(PipelineStatus::Progress {
            percent,
            label: progress.label,
        });
    }
}

impl ToolRunner for PipelineRun<'_> {
    fn run_tool(
        &mut self,
        cause: FailureCause,
        spec: CommandSpec,
        parser: &dyn StageParser,
    ) -> Result<(), PipelineError> {
        let stage = self.machine.current();
        let program = spec.program_name();
        let cancel = self.cancel;
        let mut tail = OutputTail::new(TAIL_LINES);
        info!(stage = %stage, command = %spec, "running tool");

        let exit = run_streaming(&spec, cancel, |line| {
            trace!(stage = %stage, program = %program, line, "tool output");
            tail.push(line);
            if let Some(progress) = parser.parse(line) {
                self.measured(stage, progress);
            }
            if parser.is_log_worthy(line) {
                self.log(line);
            }
        });

        let exit = match exit {
            Ok(exit) => exit,
            Err(e) => {
                if !tail.is_empty() {
                    self.log_tail(&program, &tail);
                }
                return Err(e.into());
            }
        };

        // Ctrl-C reaches the child too; it may exit before the runner
        // notices the cancel.
        if !exit.success() && cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if !exit.success() {
            self.log_tail(&program, &tail);
            return Err(PipelineError::ToolFailed {
                cause,
                program,
                code: exit.code,
            });
        }
        debug!(stage = %stage, %program, "tool finished");
        Ok(())
    }

    fn progress(&mut self, percent: f32, label: &str) {
        let percent = self.tracker.checkpoint(percent);
        (self.emit)(PipelineStatus::Progress {
            percent,
            label: label.to_string(),
        });
    }

    fn log(&mut self, line: &str) {
        (self.emit)(PipelineStatus::Log(line.to_string()));
    }
}

impl PipelineRun<'_> {
    fn log_tail(&mut self, program: &str, tail: &OutputTail) {
        if tail.is_empty() {
            self.log(&format!("{} printed nothing", program));
            return;
        }
        self.log(&format!("Last output from {}:", program));
        for line in tail.lines() {
            (self.emit)(PipelineStatus::Log(format!("  {}", line)));
        }
    }
}
