use super::types::{FFProbeOutput, PipelineStatus};
use crate::process::{run_streaming, CancelToken, CommandPrefix, CommandSpec};
use crate::workspace::DOWNLOAD_TEMPLATE;
use anyhow::{bail, Context, Result};
use ohne_core::SEPARATION_MODEL;
use std::{collections::VecDeque, path::Path};

/// `-f bestvideo+bestaudio -o "video.%(ext)s" <url>`, run inside the
/// workspace so the template lands there.
pub fn download_command(downloader: &CommandPrefix, url: &str) -> CommandSpec {
    CommandSpec::new(downloader)
        .args(["-f", "bestvideo+bestaudio", "-o", DOWNLOAD_TEMPLATE])
        .arg(url)
}

/// 16-bit PCM, 44.1 kHz, stereo.
pub fn extract_command(transcoder: &CommandPrefix, input: &Path, audio: &Path) -> CommandSpec {
    CommandSpec::new(transcoder)
        .arg("-y")
        .arg("-i")
        .arg(input)
        .args(["-acodec", "pcm_s16le", "-ar", "44100", "-ac", "2"])
        .arg(audio)
}

pub fn separate_command(separator: &CommandPrefix, audio: &Path) -> CommandSpec {
    CommandSpec::new(separator)
        .args(["--two-stems=vocals", "-n", SEPARATION_MODEL])
        .arg(audio)
}

pub fn probe_command(prober: &CommandPrefix, video: &Path) -> CommandSpec {
    CommandSpec::new(prober)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(video)
}

/// Container duration of `video` in seconds.
pub fn probe_duration(prober: &CommandPrefix, video: &Path, cancel: &CancelToken) -> Result<f64> {
    let mut output = String::new();
    let exit = run_streaming(&probe_command(prober, video), cancel, |line| {
        output.push_str(line);
        output.push('\n');
    })?;
    if !exit.success() {
        bail!("ffprobe exited with {:?}", exit.code);
    }

    let parsed: FFProbeOutput =
        serde_json::from_str(&output).context("Failed to parse ffprobe output")?;
    let duration: f64 = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse().ok())
        .context("ffprobe reported no duration")?;
    if duration <= 0.0 {
        bail!("ffprobe reported a non-positive duration");
    }
    Ok(duration)
}

/// The last few lines a tool printed, replayed to the log when it fails.
#[derive(Debug)]
pub struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

/// Adapts a log sink and a progress sink to the status callback taken by
/// `process_job`. Other statuses are ignored.
pub fn sinks<L, P>(log: L, progress: P) -> impl Fn(PipelineStatus)
where
    L: Fn(&str),
    P: Fn(f32, &str),
{
    move |status| match status {
        PipelineStatus::Log(line) => log(&line),
        PipelineStatus::Progress { percent, label } => progress(percent, &label),
        _ => {}
    }
}
