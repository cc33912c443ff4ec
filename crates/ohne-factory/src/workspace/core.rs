use super::types::*;
use super::utils::{
    downloads_in, find_file_named, is_partial_download, owner_is_gone, read_owner, remove_path,
    sweep_abandoned_jobs, write_owner,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// The intermediate files of one job.
///
/// Acquired before the first external tool runs and released on every exit
/// path: explicitly by the Cleanup stage, or on drop if the job unwinds
/// early. Release never touches a borrowed (caller supplied) video.
///
/// Each workspace carries an owner marker with the job's pid, so leftovers
/// of a run that was killed can be told apart from a job still running.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    owns_root: bool,
    lock: Option<PathBuf>,
    video: Option<VideoFile>,
    owns_downloads: bool,
    released: bool,
}

impl Workspace {
    pub fn acquire(work_root: &Path, layout: WorkspaceLayout) -> Result<Self, WorkspaceError> {
        fs::create_dir_all(work_root).map_err(|source| WorkspaceError::Io {
            operation: "create work root",
            path: work_root.to_path_buf(),
            source,
        })?;
        // Tools run with the workspace as cwd, so every path handed out
        // has to be absolute.
        let work_root = fs::canonicalize(work_root).map_err(|source| WorkspaceError::Io {
            operation: "resolve work root",
            path: work_root.to_path_buf(),
            source,
        })?;

        match layout {
            WorkspaceLayout::Isolated => {
                let swept = sweep_abandoned_jobs(&work_root);
                if !swept.removed.is_empty() {
                    info!(count = swept.removed.len(), "removed job directories of dead runs");
                }
                for (path, err) in &swept.failures {
                    warn!(path = %path.display(), error = %err, "could not remove abandoned job directory");
                }

                let root = create_job_dir(&work_root)?;
                debug!(path = %root.display(), "isolated workspace acquired");
                Ok(Self {
                    root,
                    owns_root: true,
                    lock: None,
                    video: None,
                    owns_downloads: false,
                    released: false,
                })
            }
            WorkspaceLayout::Shared => {
                let lock = lock_shared(&work_root)?;
                let workspace = Self {
                    root: work_root,
                    owns_root: false,
                    lock: Some(lock),
                    video: None,
                    owns_downloads: false,
                    released: false,
                };
                // Holding the lock, anything under the fixed names is left
                // over from a dead run.
                let mut leftovers = CleanupReport::default();
                remove_path(&workspace.audio_file(), &mut leftovers);
                remove_path(&workspace.separated_dir(), &mut leftovers);
                if !leftovers.removed.is_empty() {
                    info!(count = leftovers.removed.len(), "removed leftovers of a dead run");
                }
                debug!(path = %workspace.root.display(), "shared workspace locked");
                Ok(workspace)
            }
        }
    }

    /// Working directory for every tool the job runs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn audio_file(&self) -> PathBuf {
        self.root.join(AUDIO_FILE)
    }

    pub fn separated_dir(&self) -> PathBuf {
        self.root.join(SEPARATED_DIR)
    }

    /// Where the separator writes its stems for `model`.
    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.separated_dir().join(model)
    }

    pub fn video_file(&self) -> Option<&VideoFile> {
        self.video.as_ref()
    }

    /// Uses a caller supplied file as the job's video. It is never removed.
    pub fn adopt_local(&mut self, path: PathBuf) -> &VideoFile {
        self.video.insert(VideoFile::Borrowed(path))
    }

    /// Takes ownership of a file the downloader left in the workspace.
    pub fn adopt_download(&mut self, path: PathBuf) -> &VideoFile {
        self.video.insert(VideoFile::Owned(path))
    }

    /// Marks every `video.*` file in the workspace as belonging to this job,
    /// including partial files a failed download leaves behind.
    pub fn claim_downloads(&mut self) {
        self.owns_downloads = true;
    }

    /// Removes `video.*` leftovers from an earlier run that never cleaned
    /// up. Returns how many were removed.
    pub fn purge_stale_downloads(&self) -> usize {
        let mut report = CleanupReport::default();
        for stale in downloads_in(&self.root) {
            remove_path(&stale, &mut report);
        }
        for (path, err) in &report.failures {
            warn!(path = %path.display(), error = %err, "could not remove stale download");
        }
        report.removed.len()
    }

    /// The finished download, skipping anything yt-dlp has not completed.
    pub fn locate_download(&self) -> Option<PathBuf> {
        downloads_in(&self.root)
            .into_iter()
            .find(|p| !is_partial_download(p))
    }

    pub fn locate_vocals(&self, model: &str) -> Option<PathBuf> {
        find_file_named(&self.model_dir(model), VOCALS_FILE)
    }

    /// Deletes every artifact the job owns. Safe to call more than once;
    /// only the first call does any work. Errors are collected, never
    /// raised.
    pub fn release(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        remove_path(&self.audio_file(), &mut report);
        if let Some(VideoFile::Owned(video)) = self.video.take() {
            remove_path(&video, &mut report);
        }
        if self.owns_downloads {
            for leftover in downloads_in(&self.root) {
                remove_path(&leftover, &mut report);
            }
        }
        remove_path(&self.separated_dir(), &mut report);

        if self.owns_root {
            remove_path(&self.root, &mut report);
        }
        if let Some(lock) = self.lock.take() {
            remove_path(&lock, &mut report);
        }

        debug!(
            removed = report.removed.len(),
            failed = report.failures.len(),
            "workspace released"
        );
        report
    }
}

/// Creates a uniquely named job directory that already holds its owner
/// marker when it appears under its final name.
fn create_job_dir(work_root: &Path) -> Result<PathBuf, WorkspaceError> {
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(work_root)
        .map_err(|source| WorkspaceError::Io {
            operation: "create job directory",
            path: work_root.to_path_buf(),
            source,
        })?;
    write_owner(&staging.path().join(LOCK_FILE)).map_err(|source| WorkspaceError::Io {
        operation: "write owner marker",
        path: staging.path().to_path_buf(),
        source,
    })?;

    let name = staging
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().replacen(STAGING_PREFIX, JOB_DIR_PREFIX, 1))
        .unwrap_or_else(|| JOB_DIR_PREFIX.to_string());
    let root = work_root.join(name);
    fs::rename(staging.path(), &root).map_err(|source| WorkspaceError::Io {
        operation: "rename job directory",
        path: root.clone(),
        source,
    })?;
    // The staging guard only cleans up if the rename failed; its path is
    // gone now.
    drop(staging);
    Ok(root)
}

/// Takes the shared workspace lock, reclaiming it when the job that holds
/// it is no longer running.
fn lock_shared(work_root: &Path) -> Result<PathBuf, WorkspaceError> {
    let lock = work_root.join(LOCK_FILE);
    let busy = || WorkspaceError::Busy {
        root: work_root.to_path_buf(),
        lock: lock.clone(),
    };
    let io_error = |operation, source| WorkspaceError::Io {
        operation,
        path: lock.clone(),
        source,
    };

    match write_owner(&lock) {
        Ok(()) => return Ok(lock.clone()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(io_error("create lock file", e)),
    }
    if !owner_is_gone(&lock) {
        return Err(busy());
    }

    warn!(path = %lock.display(), owner = ?read_owner(&lock), "reclaiming lock of a dead job");
    match fs::remove_file(&lock) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error("remove stale lock", e)),
    }
    match write_owner(&lock) {
        Ok(()) => Ok(lock.clone()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(busy()),
        Err(e) => Err(io_error("create lock file", e)),
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let report = self.release();
        for (path, err) in &report.failures {
            warn!(path = %path.display(), error = %err, "cleanup on drop failed");
        }
    }
}
