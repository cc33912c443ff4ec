use super::types::{
    CleanupReport, DOWNLOAD_PREFIX, JOB_DIR_PREFIX, LOCK_FILE, MARKER_GRACE, PARTIAL_SUFFIXES,
    STAGING_PREFIX,
};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    time::Duration,
};
use walkdir::WalkDir;

/// Files in `dir` (not recursive) carrying the reserved download prefix.
pub fn downloads_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name().to_string_lossy().starts_with(DOWNLOAD_PREFIX)
                && e.file_type().map(|t| t.is_file()).unwrap_or(false)
        })
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

pub fn is_partial_download(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// First file called `name` found while walking `root`.
pub fn find_file_named(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == name)
        .map(|e| e.into_path())
}

/// Best-effort removal of a file or directory tree; a path that is already
/// gone counts as neither removed nor failed.
pub fn remove_path(path: &Path, report: &mut CleanupReport) {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => report.removed.push(path.to_path_buf()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => report.failures.push((path.to_path_buf(), e)),
    }
}

/// Creates `path` holding this process's pid. Fails with `AlreadyExists`
/// if another job got there first.
pub fn write_owner(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", process::id())
}

pub fn read_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// True when the job that wrote the marker at `path` is gone. A marker
/// without a pid is only trusted for `MARKER_GRACE`, since its owner writes
/// the pid right after creating it.
pub fn owner_is_gone(path: &Path) -> bool {
    match read_owner(path) {
        Some(pid) => !process_alive(pid),
        None => older_than(path, MARKER_GRACE),
    }
}

fn older_than(path: &Path, age: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .map_or(true, |elapsed| elapsed >= age)
}

#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    use nix::{errno::Errno, sys::signal::kill, unistd::Pid};

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // Signal 0 only checks that the pid exists; EPERM means it does but
    // belongs to someone else.
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(windows)]
pub fn process_alive(pid: u32) -> bool {
    use windows::Win32::Foundation::{CloseHandle, ERROR_ACCESS_DENIED, STILL_ACTIVE};
    use windows::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    // SAFETY: the handle is owned here and closed before returning.
    unsafe {
        let handle = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            Ok(handle) => handle,
            Err(e) => return e.code() == ERROR_ACCESS_DENIED.to_hresult(),
        };
        let mut code = 0u32;
        let alive =
            GetExitCodeProcess(handle, &mut code).is_ok() && code == STILL_ACTIVE.0 as u32;
        let _ = CloseHandle(handle);
        alive
    }
}

#[cfg(not(any(unix, windows)))]
pub fn process_alive(_pid: u32) -> bool {
    true
}

/// Removes job directories in `work_root` left behind by runs that died
/// before cleaning up: `ohne-job-*` whose owner is gone, and staging
/// directories that never got renamed.
pub fn sweep_abandoned_jobs(work_root: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();
    let Ok(entries) = fs::read_dir(work_root) else {
        return report;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        let abandoned = if name.starts_with(JOB_DIR_PREFIX) {
            // A live job writes its marker before the directory gets this
            // name, so a missing marker means a dead owner.
            match read_owner(&path.join(LOCK_FILE)) {
                Some(pid) => !process_alive(pid),
                None => true,
            }
        } else if name.starts_with(STAGING_PREFIX) {
            older_than(&path, MARKER_GRACE)
        } else {
            false
        };
        if abandoned {
            remove_path(&path, &mut report);
        }
    }
    report
}
