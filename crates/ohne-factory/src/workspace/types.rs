use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Output template handed to yt-dlp; it fills in the container extension.
pub const DOWNLOAD_TEMPLATE: &str = "video.%(ext)s";
/// Every downloaded file starts with this prefix.
pub const DOWNLOAD_PREFIX: &str = "video.";
pub const AUDIO_FILE: &str = "audio.wav";
pub const SEPARATED_DIR: &str = "separated";
pub const VOCALS_FILE: &str = "vocals.wav";
/// Owner marker holding the pid of the job using a workspace.
pub const LOCK_FILE: &str = ".ohne.lock";
pub const JOB_DIR_PREFIX: &str = "ohne-job-";
/// Job directories are created under this prefix and renamed once their
/// owner marker is written.
pub const STAGING_PREFIX: &str = ".ohne-staging-";
/// How long a marker without a readable pid, or a staging directory, is
/// given before it counts as abandoned.
pub const MARKER_GRACE: Duration = Duration::from_secs(10);

/// Suffixes yt-dlp leaves on unfinished downloads.
pub const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceLayout {
    /// A fresh, uniquely named directory per job.
    #[default]
    Isolated,
    /// Fixed names directly inside the work root, guarded by a lock file so
    /// only one job uses it at a time.
    Shared,
}

/// The input video and who owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoFile {
    /// Supplied by the caller; never modified or removed.
    Borrowed(PathBuf),
    /// Downloaded into the workspace; removed on release.
    Owned(PathBuf),
}

impl VideoFile {
    pub fn path(&self) -> &Path {
        match self {
            VideoFile::Borrowed(p) | VideoFile::Owned(p) => p,
        }
    }
}

/// What a release removed and what it could not.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, io::Error)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace {} is in use by a running job (owner recorded in {})", .root.display(), .lock.display())]
    Busy { root: PathBuf, lock: PathBuf },
    #[error("workspace {operation} failed for {}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
