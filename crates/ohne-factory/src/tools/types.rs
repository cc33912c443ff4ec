use crate::process::CommandPrefix;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Downloader,
    Transcoder,
    Separator,
    Prober,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::Downloader,
        ToolKind::Transcoder,
        ToolKind::Separator,
        ToolKind::Prober,
    ];

    pub const fn binary_name(self) -> &'static str {
        match self {
            ToolKind::Downloader => "yt-dlp",
            ToolKind::Transcoder => "ffmpeg",
            ToolKind::Separator => "demucs",
            ToolKind::Prober => "ffprobe",
        }
    }

    /// Arguments that make the tool print something identifying and exit 0.
    pub const fn version_args(self) -> &'static [&'static str] {
        match self {
            ToolKind::Downloader => &["--version"],
            ToolKind::Transcoder | ToolKind::Prober => &["-version"],
            // demucs has no version flag
            ToolKind::Separator => &["--help"],
        }
    }

    /// The prober only sharpens progress reporting; the others are needed
    /// for every job.
    pub const fn is_required(self) -> bool {
        !matches!(self, ToolKind::Prober)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// Command prefixes for every external tool a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommands {
    pub downloader: CommandPrefix,
    pub transcoder: CommandPrefix,
    pub separator: CommandPrefix,
    /// Used for the duration probe; `None` keeps the transcode heuristic.
    pub prober: Option<CommandPrefix>,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            downloader: CommandPrefix::new(ToolKind::Downloader.binary_name()),
            transcoder: CommandPrefix::new(ToolKind::Transcoder.binary_name()),
            separator: CommandPrefix::new(ToolKind::Separator.binary_name()),
            prober: Some(CommandPrefix::new(ToolKind::Prober.binary_name())),
        }
    }
}

impl ToolCommands {
    pub fn get(&self, kind: ToolKind) -> Option<&CommandPrefix> {
        match kind {
            ToolKind::Downloader => Some(&self.downloader),
            ToolKind::Transcoder => Some(&self.transcoder),
            ToolKind::Separator => Some(&self.separator),
            ToolKind::Prober => self.prober.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Available {
        path: PathBuf,
        version_line: Option<String>,
    },
    Unavailable {
        reason: String,
    },
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, ToolStatus::Available { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ToolReport {
    pub kind: ToolKind,
    pub prefix: Option<CommandPrefix>,
    pub status: ToolStatus,
}
