//! Line scrapers for the output of each external tool.
//!
//! Every parser is a pure function of one output line. Progress extraction and
//! the decision whether a line deserves to reach the user's log are separate:
//! a line can carry progress without being logged, and vice versa.

use crate::progress::StageProgress;
use once_cell::sync::Lazy;
use regex::Regex;

static DOWNLOAD_PERCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").expect("download percent pattern")
});

// "55%|█████     | 55/100": leading integer, then the bar between two pipes.
static SEPARATION_BAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)%\|[^|]*\|").expect("separation bar pattern"));

/// Seconds of transcoded media per stage point when the duration is unknown.
pub const HEURISTIC_SECONDS_PER_POINT: f64 = 10.0;
/// Points the transcode heuristic can reach before it saturates.
pub const HEURISTIC_MAX_POINTS: f64 = 15.0;
/// Where the merge stage sits inside the finalize slice (97% overall).
pub const MERGE_PINNED_FRACTION: f32 = 0.7;

/// Parser for one pipeline stage's output.
pub trait StageParser {
    fn parse(&self, line: &str) -> Option<StageProgress>;

    /// Whether `line` should be forwarded to the log sink.
    fn is_log_worthy(&self, line: &str) -> bool;
}

/// Parses ffmpeg's `HH:MM:SS.ff` into seconds.
pub fn parse_ffmpeg_time(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let h: f64 = parts[0].parse().ok()?;
    let m: f64 = parts[1].parse().ok()?;
    let s: f64 = parts[2].parse().ok()?;
    Some((h * 3600.0 + m * 60.0 + s).max(0.0))
}

/// Elapsed media time from an ffmpeg status line (`... time=00:01:30.00 ...`).
pub fn parse_elapsed_seconds(line: &str) -> Option<f64> {
    let idx = line.find("time=")?;
    let remainder = &line[idx + 5..];
    let time_str = remainder.split_whitespace().next()?;
    parse_ffmpeg_time(time_str)
}

/// Percentage from a yt-dlp progress line (`[download]  42.0% of 10.00MiB`).
pub fn parse_download_percent(line: &str) -> Option<f32> {
    let caps = DOWNLOAD_PERCENT.captures(line)?;
    let pct: f32 = caps.get(1)?.as_str().parse().ok()?;
    Some(pct.clamp(0.0, 100.0))
}

/// Leading percentage from a demucs progress bar.
pub fn parse_separation_percent(line: &str) -> Option<u8> {
    let caps = SEPARATION_BAR.captures(line)?;
    let pct: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(pct.min(100) as u8)
}

fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn is_ffmpeg_error(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("error") || lower.contains("invalid") || lower.contains("no such file")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadParser {
    /// Forward every progress line to the log, not only the milestones.
    pub verbose: bool,
}

impl StageParser for DownloadParser {
    fn parse(&self, line: &str) -> Option<StageProgress> {
        let pct = parse_download_percent(line)?;
        Some(StageProgress::new(
            pct / 100.0,
            format!("Downloading: {:.1}%", pct),
        ))
    }

    fn is_log_worthy(&self, line: &str) -> bool {
        let line = line.trim_start();
        if line.starts_with("ERROR:") || line.starts_with("[Merger]") {
            return true;
        }
        if !line.starts_with("[download]") {
            return false;
        }
        self.verbose || parse_download_percent(line).is_none()
    }
}

/// Audio extraction progress.
///
/// ffmpeg only reports elapsed media time. With a probed duration the fraction
/// is exact; without one it is an approximation: every
/// [`HEURISTIC_SECONDS_PER_POINT`] seconds count as one point, saturating at
/// [`HEURISTIC_MAX_POINTS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscodeParser {
    pub duration: Option<f64>,
}

impl TranscodeParser {
    pub fn with_duration(duration: Option<f64>) -> Self {
        Self {
            duration: duration.filter(|d| *d > 0.0),
        }
    }

    pub fn fraction_for(&self, elapsed: f64) -> f32 {
        let fraction = match self.duration {
            Some(total) => elapsed / total,
            None => {
                (elapsed / HEURISTIC_SECONDS_PER_POINT).min(HEURISTIC_MAX_POINTS)
                    / HEURISTIC_MAX_POINTS
            }
        };
        fraction.clamp(0.0, 1.0) as f32
    }
}

impl StageParser for TranscodeParser {
    fn parse(&self, line: &str) -> Option<StageProgress> {
        let elapsed = parse_elapsed_seconds(line)?;
        Some(StageProgress::new(
            self.fraction_for(elapsed),
            format!("Extracting audio: {}", format_clock(elapsed)),
        ))
    }

    fn is_log_worthy(&self, line: &str) -> bool {
        is_ffmpeg_error(line)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SeparationParser;

impl StageParser for SeparationParser {
    fn parse(&self, line: &str) -> Option<StageProgress> {
        let pct = parse_separation_percent(line)?;
        Some(StageProgress::new(
            f32::from(pct) / 100.0,
            format!("Separating vocals: {}%", pct),
        ))
    }

    fn is_log_worthy(&self, line: &str) -> bool {
        line.contains("Separating track") || parse_separation_percent(line).is_some()
    }
}

/// Mux progress. The output length is bounded by the shorter input, so the
/// elapsed time only feeds the label while the percentage stays pinned.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeParser;

impl StageParser for MergeParser {
    fn parse(&self, line: &str) -> Option<StageProgress> {
        let elapsed = parse_elapsed_seconds(line)?;
        Some(StageProgress::new(
            MERGE_PINNED_FRACTION,
            format!("Merging: {}", format_clock(elapsed)),
        ))
    }

    fn is_log_worthy(&self, line: &str) -> bool {
        is_ffmpeg_error(line)
    }
}
