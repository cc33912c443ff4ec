//! End-to-end runs against shell scripts standing in for yt-dlp, ffmpeg,
//! demucs and ffprobe.
#![cfg(unix)]

use ohne_core::{Action, FailureCause, Job, Source, Stage};
use ohne_factory::{
    process_job, run_async, CancelToken, CommandPrefix, PipelineConfig, PipelineFailure,
    PipelineStatus, ToolCommands, WorkspaceLayout,
};
use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
    process::Command,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};
use tempfile::TempDir;

const DOWNLOAD_OK: &str = r#"
[ -e video.webm ] && echo "stale video.webm present" >> "$LOG"
echo "[youtube] abc: Downloading webpage"
echo "[download] Destination: video.mp4"
printf '[download]  42.0%% of 10.00MiB\r[download]  10.0%% of 1.00MiB\r[download] 100%% of 1.00MiB\n'
echo data > video.mp4
"#;

const TRANSCODE_OK: &str = r#"
for last; do :; done
printf 'frame=  1 time=00:00:05.00 bitrate=N/A\r' >&2
echo media > "$last"
"#;

const SEPARATE_OK: &str = r#"
echo "Separating track $4"
printf ' 55%%|#####     | 55/100\n100%%|##########| 100/100\n'
mkdir -p separated/htdemucs/audio
echo vocals > separated/htdemucs/audio/vocals.wav
echo other > separated/htdemucs/audio/no_vocals.wav
"#;

struct Harness {
    base: TempDir,
    config: PipelineConfig,
}

impl Harness {
    fn new(layout: WorkspaceLayout) -> Self {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir(base.path().join("bin")).unwrap();
        let mut harness = Self {
            config: PipelineConfig {
                tools: ToolCommands::default(),
                output_dir: base.path().join("videos"),
                work_root: base.path().join("work"),
                workspace_layout: layout,
                open_result: false,
                verbose: false,
                probe_duration: false,
            },
            base,
        };
        harness.config.tools = ToolCommands {
            downloader: harness.stub("yt-dlp", DOWNLOAD_OK),
            transcoder: harness.stub("ffmpeg", TRANSCODE_OK),
            separator: harness.stub("demucs", SEPARATE_OK),
            prober: None,
        };
        harness
    }

    fn launches_log(&self) -> PathBuf {
        self.base.path().join("launches.log")
    }

    /// A `/bin/sh <script>` prefix that records each launch before running
    /// `body`.
    fn stub(&self, name: &str, body: &str) -> CommandPrefix {
        let script = self.base.path().join("bin").join(format!("{}.sh", name));
        let log = self.launches_log();
        fs::write(
            &script,
            format!(
                "LOG='{}'\necho \"{} $*\" >> \"$LOG\"\n{}",
                log.display(),
                name,
                body
            ),
        )
        .unwrap();
        CommandPrefix::with_args("/bin/sh", [script.to_string_lossy().to_string()])
    }

    fn local_video(&self) -> PathBuf {
        let video = self.base.path().join("input.mp4");
        fs::write(&video, b"original").unwrap();
        video
    }

    fn launches(&self) -> Vec<String> {
        fs::read_to_string(self.launches_log())
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn run(&self, job: &Job) -> (Result<PathBuf, PipelineFailure>, Vec<PipelineStatus>) {
        self.run_with(job, &CancelToken::new())
    }

    fn run_with(
        &self,
        job: &Job,
        cancel: &CancelToken,
    ) -> (Result<PathBuf, PipelineFailure>, Vec<PipelineStatus>) {
        let statuses = RefCell::new(Vec::new());
        let result = process_job(job, &self.config, cancel, |s| statuses.borrow_mut().push(s));
        (result, statuses.into_inner())
    }

    fn assert_workspace_empty(&self) {
        let work = &self.config.work_root;
        let left: Vec<_> = fs::read_dir(work)
            .map(|d| d.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default();
        assert!(left.is_empty(), "workspace not cleaned: {:?}", left);
    }
}

fn remote(action: Action) -> Job {
    Job::new(
        Some(Source::RemoteUrl("https://www.youtube.com/watch?v=abc".into())),
        "song",
        action,
    )
}

fn local(path: &Path, action: Action) -> Job {
    Job::new(Some(Source::LocalFile(path.to_path_buf())), "song", action)
}

fn percents(statuses: &[PipelineStatus]) -> Vec<f32> {
    statuses
        .iter()
        .filter_map(|s| match s {
            PipelineStatus::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

fn logs(statuses: &[PipelineStatus]) -> Vec<&str> {
    statuses
        .iter()
        .filter_map(|s| match s {
            PipelineStatus::Log(l) => Some(l.as_str()),
            _ => None,
        })
        .collect()
}

fn stages(statuses: &[PipelineStatus]) -> Vec<Stage> {
    statuses
        .iter()
        .filter_map(|s| match s {
            PipelineStatus::Stage(stage) => Some(*stage),
            _ => None,
        })
        .collect()
}

fn assert_failed_with(
    result: Result<PathBuf, PipelineFailure>,
    statuses: &[PipelineStatus],
    stage: Stage,
    cause: FailureCause,
) {
    let failure = result.unwrap_err();
    assert_eq!(failure.stage, stage, "{}", failure);
    assert_eq!(failure.cause(), cause, "{}", failure);

    match statuses.iter().rev().nth(1) {
        Some(PipelineStatus::Progress { percent, label }) => {
            assert_eq!(*percent, 0.0);
            assert!(label.starts_with("Error: "), "{}", label);
        }
        other => panic!("expected a final error progress, got {:?}", other),
    }
    assert!(matches!(statuses.last(), Some(PipelineStatus::Error(_))));
}

#[test]
fn local_extract_produces_only_the_output() {
    let h = Harness::new(WorkspaceLayout::Isolated);
    let video = h.local_video();

    let (result, statuses) = h.run(&local(&video, Action::ExtractVocals));
    let output = result.unwrap();

    assert_eq!(output, fs::canonicalize(h.base.path().join("videos/song.wav")).unwrap());
    assert_eq!(fs::read_to_string(&output).unwrap(), "vocals\n");
    let outputs: Vec<_> = fs::read_dir(h.base.path().join("videos")).unwrap().collect();
    assert_eq!(outputs.len(), 1);

    assert_eq!(fs::read(&video).unwrap(), b"original");
    h.assert_workspace_empty();

    let launches = h.launches();
    assert_eq!(launches.len(), 2, "{:?}", launches);
    assert!(launches[0].starts_with("ffmpeg -y -i "));
    assert!(launches[0].contains("-acodec pcm_s16le -ar 44100 -ac 2"));
    assert!(launches[1].starts_with("demucs --two-stems=vocals -n htdemucs "));

    assert_eq!(
        stages(&statuses),
        [
            Stage::Init,
            Stage::AcquireSource,
            Stage::ExtractAudio,
            Stage::SeparateVocals,
            Stage::Finalize,
            Stage::Cleanup,
            Stage::Done,
        ]
    );
    assert_eq!(statuses.last(), Some(&PipelineStatus::Finished(output)));
}

#[test]
fn progress_never_decreases_and_ends_at_100() {
    let h = Harness::new(WorkspaceLayout::Isolated);

    let (result, statuses) = h.run(&remote(Action::ExtractVocals));
    result.unwrap();

    let seen = percents(&statuses);
    assert!(seen.len() > 5, "{:?}", seen);
    assert!(
        seen.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        seen
    );
    assert_eq!(seen.last(), Some(&100.0));
    // yt-dlp restarted at 10% for the second stream; the sink never saw it.
    assert!(seen.contains(&(10.0 + 20.0 * 0.42)));
}

#[test]
fn remote_merge_muxes_video_with_vocals() {
    let h = Harness::new(WorkspaceLayout::Isolated);

    let (result, statuses) = h.run(&remote(Action::MergeWithVideo));
    let output = result.unwrap();

    assert!(output.ends_with("song.mp4"));
    assert!(output.exists());
    h.assert_workspace_empty();

    let launches = h.launches();
    assert_eq!(launches.len(), 4, "{:?}", launches);
    assert!(launches[0].starts_with("yt-dlp -f bestvideo+bestaudio -o video.%(ext)s https://"));
    let mux = &launches[3];
    assert!(mux.starts_with("ffmpeg -y -i "));
    assert!(mux.contains("video.mp4 -i "));
    assert!(mux.contains("vocals.wav -c:v copy -map 0:v:0 -map 1:a:0 -shortest "));

    let seen = percents(&statuses);
    assert!(seen.contains(&95.0));
    assert!(seen.contains(&97.0));
    assert!(logs(&statuses).iter().any(|l| l.starts_with("Full path: ")));
}

#[test]
fn local_merge_never_removes_the_source_file() {
    let h = Harness::new(WorkspaceLayout::Shared);
    let video = h.local_video();

    let (result, _) = h.run(&local(&video, Action::MergeWithVideo));
    result.unwrap();

    assert_eq!(fs::read(&video).unwrap(), b"original");
    h.assert_workspace_empty();
}

#[test]
fn missing_source_launches_nothing() {
    let h = Harness::new(WorkspaceLayout::Isolated);

    let (result, statuses) = h.run(&Job::new(None, "song", Action::ExtractVocals));

    assert_failed_with(result, &statuses, Stage::Init, FailureCause::InvalidJob);
    assert!(h.launches().is_empty());
    assert!(!h.config.work_root.exists());
}

#[test]
fn download_failure() {
    let mut h = Harness::new(WorkspaceLayout::Isolated);
    h.config.tools.downloader = h.stub(
        "yt-dlp",
        "echo 'ERROR: [youtube] abc: Video unavailable' >&2\nexit 1\n",
    );

    let (result, statuses) = h.run(&remote(Action::ExtractVocals));

    assert_failed_with(result, &statuses, Stage::AcquireSource, FailureCause::DownloadFailed);
    assert_eq!(h.launches().len(), 1);
    assert!(logs(&statuses).contains(&"ERROR: [youtube] abc: Video unavailable"));
    h.assert_workspace_empty();
}

#[test]
fn download_without_artifact() {
    let mut h = Harness::new(WorkspaceLayout::Shared);
    h.config.tools.downloader = h.stub("yt-dlp", "echo 'partial' > video.mp4.part\n");

    let (result, statuses) = h.run(&remote(Action::ExtractVocals));

    assert_failed_with(
        result,
        &statuses,
        Stage::AcquireSource,
        FailureCause::DownloadArtifactMissing,
    );
    assert_eq!(h.launches().len(), 1);
    h.assert_workspace_empty();
}

#[test]
fn extraction_failure_cleans_the_shared_workspace() {
    let mut h = Harness::new(WorkspaceLayout::Shared);
    h.config.tools.transcoder = h.stub(
        "ffmpeg",
        "for last; do :; done\necho half > \"$last\"\necho 'Invalid data found when processing input' >&2\nexit 1\n",
    );

    let (result, statuses) = h.run(&remote(Action::ExtractVocals));

    assert_failed_with(result, &statuses, Stage::ExtractAudio, FailureCause::ExtractionFailed);
    assert!(logs(&statuses)
        .iter()
        .any(|l| l.contains("Invalid data found")));
    h.assert_workspace_empty();
}

#[test]
fn separation_failure() {
    let mut h = Harness::new(WorkspaceLayout::Isolated);
    h.config.tools.separator = h.stub(
        "demucs",
        "mkdir -p separated/htdemucs\necho 'RuntimeError: out of memory' >&2\nexit 2\n",
    );
    let video = h.local_video();

    let (result, statuses) = h.run(&local(&video, Action::ExtractVocals));

    assert_failed_with(result, &statuses, Stage::SeparateVocals, FailureCause::SeparationFailed);
    let logged = logs(&statuses);
    assert!(logged.iter().any(|l| l.starts_with("Last output from ")));
    assert!(logged.iter().any(|l| l.contains("out of memory")));
    h.assert_workspace_empty();
}

#[test]
fn separation_without_vocals() {
    let mut h = Harness::new(WorkspaceLayout::Shared);
    h.config.tools.separator = h.stub(
        "demucs",
        "mkdir -p separated/htdemucs/audio\necho x > separated/htdemucs/audio/no_vocals.wav\n",
    );
    let video = h.local_video();

    let (result, statuses) = h.run(&local(&video, Action::ExtractVocals));

    assert_failed_with(
        result,
        &statuses,
        Stage::SeparateVocals,
        FailureCause::VocalsArtifactMissing,
    );
    assert!(stages(&statuses).contains(&Stage::Cleanup));
    h.assert_workspace_empty();
    assert!(!h.base.path().join("videos/song.wav").exists());
}

#[test]
fn merge_failure() {
    let mut h = Harness::new(WorkspaceLayout::Isolated);
    h.config.tools.transcoder = h.stub(
        "ffmpeg",
        &format!(
            "case \"$*\" in *-shortest*) echo 'Conversion failed!' >&2; exit 1;; esac\n{}",
            TRANSCODE_OK
        ),
    );

    let (result, statuses) = h.run(&remote(Action::MergeWithVideo));

    assert_failed_with(result, &statuses, Stage::Finalize, FailureCause::MergeFailed);
    assert_eq!(h.launches().len(), 4);
    h.assert_workspace_empty();
    assert!(!h.base.path().join("videos/song.mp4").exists());
}

#[test]
fn unlaunchable_tool() {
    let mut h = Harness::new(WorkspaceLayout::Isolated);
    h.config.tools.downloader = CommandPrefix::new(h.base.path().join("missing/yt-dlp"));

    let (result, statuses) = h.run(&remote(Action::ExtractVocals));

    assert_failed_with(result, &statuses, Stage::AcquireSource, FailureCause::LaunchFailed);
    h.assert_workspace_empty();
}

#[test]
fn stale_downloads_are_removed_before_downloading() {
    let h = Harness::new(WorkspaceLayout::Shared);
    fs::create_dir_all(&h.config.work_root).unwrap();
    fs::write(h.config.work_root.join("video.webm"), b"crashed run").unwrap();
    fs::write(h.config.work_root.join("video.webm.part"), b"crashed run").unwrap();

    let (result, _) = h.run(&remote(Action::ExtractVocals));
    result.unwrap();

    assert!(!h.launches().iter().any(|l| l.starts_with("stale")));
    h.assert_workspace_empty();
}

fn exited_pid() -> u32 {
    let mut child = Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

/// Blocks until `program` shows up in the launch log.
fn wait_for_launch(log: &Path, program: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        let launched = fs::read_to_string(log).unwrap_or_default();
        if launched.lines().any(|l| l.starts_with(program)) {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    thread::sleep(Duration::from_millis(100));
}

#[test]
fn rerun_after_a_crash_reclaims_the_shared_workspace() {
    let h = Harness::new(WorkspaceLayout::Shared);
    let work = &h.config.work_root;
    fs::create_dir_all(work).unwrap();
    fs::write(work.join("video.webm"), b"crashed run").unwrap();
    fs::write(work.join("audio.wav"), b"crashed run").unwrap();
    fs::write(work.join(".ohne.lock"), format!("{}\n", exited_pid())).unwrap();

    let (result, _) = h.run(&remote(Action::ExtractVocals));
    result.unwrap();

    assert!(!h.launches().iter().any(|l| l.starts_with("stale")));
    h.assert_workspace_empty();
}

#[test]
fn rerun_after_a_crash_sweeps_isolated_leftovers() {
    let h = Harness::new(WorkspaceLayout::Isolated);
    let crashed = h.config.work_root.join("ohne-job-crashd");
    fs::create_dir_all(crashed.join("separated/htdemucs/audio")).unwrap();
    fs::write(crashed.join("audio.wav"), b"crashed run").unwrap();
    let video = h.local_video();

    let (result, _) = h.run(&local(&video, Action::ExtractVocals));
    result.unwrap();

    assert!(!crashed.exists());
    h.assert_workspace_empty();
}

#[test]
fn busy_shared_workspace_is_refused() {
    let h = Harness::new(WorkspaceLayout::Shared);
    fs::create_dir_all(&h.config.work_root).unwrap();
    let lock = h.config.work_root.join(".ohne.lock");
    fs::write(&lock, std::process::id().to_string()).unwrap();

    let (result, statuses) = h.run(&remote(Action::ExtractVocals));

    assert_failed_with(result, &statuses, Stage::Init, FailureCause::UnexpectedFailure);
    assert!(h.launches().is_empty());
    assert!(lock.exists());
}

#[test]
fn concurrent_isolated_jobs_do_not_collide() {
    let h = Harness::new(WorkspaceLayout::Isolated);
    let config = h.config.clone();

    let workers: Vec<_> = ["one", "two"]
        .into_iter()
        .map(|title| {
            let config = config.clone();
            thread::spawn(move || {
                let job = Job::new(
                    Some(Source::RemoteUrl("https://example.com/v".into())),
                    title,
                    Action::ExtractVocals,
                );
                process_job(&job, &config, &CancelToken::new(), |_| {})
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap().unwrap();
    }
    assert!(h.base.path().join("videos/one.wav").exists());
    assert!(h.base.path().join("videos/two.wav").exists());
    h.assert_workspace_empty();
}

#[test]
fn cancellation_kills_the_running_tool() {
    let mut h = Harness::new(WorkspaceLayout::Isolated);
    h.config.tools.separator = h.stub("demucs", "mkdir -p separated\nexec sleep 30\n");
    let video = h.local_video();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let log = h.launches_log();
    thread::spawn(move || {
        wait_for_launch(&log, "demucs ");
        trigger.cancel();
    });

    let started = Instant::now();
    let (result, statuses) = h.run_with(&local(&video, Action::ExtractVocals), &cancel);

    assert!(started.elapsed() < Duration::from_secs(20));
    assert_failed_with(result, &statuses, Stage::SeparateVocals, FailureCause::Cancelled);
    h.assert_workspace_empty();
}

#[test]
fn probed_duration_makes_extraction_progress_exact() {
    let mut h = Harness::new(WorkspaceLayout::Isolated);
    h.config.probe_duration = true;
    h.config.tools.prober = Some(h.stub(
        "ffprobe",
        "echo '{\"format\": {\"filename\": \"input.mp4\", \"duration\": \"10.000000\"}}'\n",
    ));
    let video = h.local_video();

    let (result, statuses) = h.run(&local(&video, Action::ExtractVocals));
    result.unwrap();

    // 5 of 10 seconds: halfway through the 30-50 slice.
    assert!(statuses.contains(&PipelineStatus::Progress {
        percent: 40.0,
        label: "Extracting audio: 00:00:05".into(),
    }));
    assert!(h.launches()[0].starts_with("ffprobe -v quiet -print_format json -show_format "));
}

#[test]
fn broken_prober_falls_back_to_the_heuristic() {
    let mut h = Harness::new(WorkspaceLayout::Isolated);
    h.config.probe_duration = true;
    h.config.tools.prober = Some(h.stub("ffprobe", "exit 1\n"));
    let video = h.local_video();

    let (result, statuses) = h.run(&local(&video, Action::ExtractVocals));
    result.unwrap();

    assert!(!statuses.iter().any(|s| matches!(
        s,
        PipelineStatus::Progress { percent, .. } if *percent == 40.0
    )));
}

#[test]
fn cancelling_the_handle_cleans_up_before_reporting() {
    let mut h = Harness::new(WorkspaceLayout::Shared);
    h.config.tools.separator = h.stub("demucs", "mkdir -p separated\nexec sleep 30\n");
    let video = h.local_video();

    let (tx, rx) = mpsc::channel();
    let handle = run_async(local(&video, Action::MergeWithVideo), h.config.clone(), tx).unwrap();
    wait_for_launch(&h.launches_log(), "demucs ");
    handle.cancel();

    let failure = handle.join().unwrap_err();
    assert_eq!(failure.cause(), FailureCause::Cancelled);
    let statuses: Vec<PipelineStatus> = rx.iter().collect();
    assert!(stages(&statuses).contains(&Stage::Cleanup));
    assert!(matches!(statuses.last(), Some(PipelineStatus::Error(_))));
    assert!(video.exists());
    h.assert_workspace_empty();
}

#[test]
fn tool_dying_from_the_interrupt_counts_as_cancelled() {
    let mut h = Harness::new(WorkspaceLayout::Isolated);
    let stop = h.base.path().join("interrupt");
    h.config.tools.transcoder = h.stub(
        "ffmpeg",
        &format!(
            "while [ ! -e '{}' ]; do sleep 0.05; done\nexit 130\n",
            stop.display()
        ),
    );
    let video = h.local_video();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let log = h.launches_log();
    thread::spawn(move || {
        wait_for_launch(&log, "ffmpeg ");
        trigger.cancel();
        let _ = fs::write(&stop, b"");
    });

    let (result, statuses) = h.run_with(&local(&video, Action::ExtractVocals), &cancel);

    assert_failed_with(result, &statuses, Stage::ExtractAudio, FailureCause::Cancelled);
    h.assert_workspace_empty();
}
