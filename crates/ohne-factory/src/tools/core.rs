use super::types::{ToolCommands, ToolKind, ToolReport, ToolStatus};
use super::utils::{app_dir, candidate_paths, first_line};
use crate::process::{run_streaming, CancelToken, CommandPrefix, CommandSpec, ProcessError};
use anyhow::{bail, Result};
use crossbeam_channel::RecvTimeoutError;
use std::{
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use tracing::debug;

/// A version query that takes longer than this is treated as broken.
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Finds `name`: bundled `tools/` dir next to the binary, the binary's own
/// dir, `PATH`, then common install locations.
pub fn discover_tool(name: &str) -> Option<PathBuf> {
    discover_in(app_dir().as_deref(), name)
}

pub fn discover_in(app_dir: Option<&Path>, name: &str) -> Option<PathBuf> {
    let (bundled, fallback) = candidate_paths(app_dir, name);
    let found = bundled
        .into_iter()
        .find(|p| p.is_file())
        .or_else(|| which::which(name).ok())
        .or_else(|| fallback.into_iter().find(|p| p.is_file()));
    debug!(tool = name, path = ?found, "tool lookup");
    found
}

/// Resolves a prefix's program to an existing file. Bare names go through
/// `PATH`.
fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    which::which(program).ok()
}

/// Runs the tool's version query and reports what it printed.
pub fn check_tool(prefix: &CommandPrefix, version_args: &[&str]) -> ToolStatus {
    let name = prefix.display_name();
    let Some(path) = resolve_program(&prefix.program) else {
        return ToolStatus::Unavailable {
            reason: format!("{} not found", name),
        };
    };

    let spec = CommandSpec::new(prefix).args(version_args);
    let cancel = CancelToken::new();
    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
    let watchdog = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(VERSION_TIMEOUT) {
                cancel.cancel();
            }
        })
    };

    let mut output = String::new();
    let result = run_streaming(&spec, &cancel, |line| {
        output.push_str(line);
        output.push('\n');
    });
    drop(done_tx);
    let _ = watchdog.join();

    match result {
        Ok(exit) if exit.success() => ToolStatus::Available {
            path,
            version_line: first_line(&output),
        },
        Ok(exit) => ToolStatus::Unavailable {
            reason: format!(
                "{} found at {} but not working properly (exit code {:?})",
                name,
                path.display(),
                exit.code
            ),
        },
        Err(ProcessError::Cancelled { .. }) => ToolStatus::Unavailable {
            reason: format!("{} did not answer within {:?}", name, VERSION_TIMEOUT),
        },
        Err(e) => ToolStatus::Unavailable {
            reason: format!("Error checking {}: {}", name, e),
        },
    }
}

impl ToolCommands {
    /// Default prefixes with every tool resolved to a concrete path where
    /// one can be found. A separator missing as a binary falls back to
    /// `python -m demucs`; a missing prober is left out.
    pub fn discover() -> Self {
        let resolve = |kind: ToolKind| {
            discover_tool(kind.binary_name())
                .map(CommandPrefix::new)
                .unwrap_or_else(|| CommandPrefix::new(kind.binary_name()))
        };

        let separator = discover_tool(ToolKind::Separator.binary_name())
            .map(CommandPrefix::new)
            .or_else(|| {
                ["python3", "python"]
                    .into_iter()
                    .find_map(|py| which::which(py).ok())
                    .map(|py| CommandPrefix::with_args(py, ["-m", "demucs"]))
            })
            .unwrap_or_else(|| CommandPrefix::new(ToolKind::Separator.binary_name()));

        Self {
            downloader: resolve(ToolKind::Downloader),
            transcoder: resolve(ToolKind::Transcoder),
            separator,
            prober: discover_tool(ToolKind::Prober.binary_name()).map(CommandPrefix::new),
        }
    }
}

pub fn check_all(commands: &ToolCommands) -> Vec<ToolReport> {
    ToolKind::ALL
        .into_iter()
        .map(|kind| {
            let prefix = commands.get(kind).cloned();
            let status = match &prefix {
                Some(p) => check_tool(p, kind.version_args()),
                None => ToolStatus::Unavailable {
                    reason: format!("{} not configured", kind),
                },
            };
            ToolReport {
                kind,
                prefix,
                status,
            }
        })
        .collect()
}

/// Fails on the first required tool that cannot be found.
pub fn check_dependencies(commands: &ToolCommands) -> Result<()> {
    for kind in ToolKind::ALL.into_iter().filter(|k| k.is_required()) {
        let Some(prefix) = commands.get(kind) else {
            continue;
        };
        if resolve_program(&prefix.program).is_none() {
            bail!(
                "Error: '{}' not found. Install it or put it in a tools/ folder next to ohne.",
                prefix.display_name()
            );
        }
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn bundled_tool_wins_over_path() {
        let app = tempfile::tempdir().unwrap();
        fs::create_dir(app.path().join("tools")).unwrap();
        let bundled = app.path().join("tools").join("sh");
        fs::write(&bundled, b"").unwrap();

        assert_eq!(discover_in(Some(app.path()), "sh"), Some(bundled));
    }

    #[test]
    fn path_is_used_when_nothing_is_bundled() {
        let app = tempfile::tempdir().unwrap();
        let found = discover_in(Some(app.path()), "sh").unwrap();
        assert!(found.ends_with("sh"));
        assert_eq!(discover_in(Some(app.path()), "ohne-no-such-tool"), None);
    }

    #[test]
    fn check_reports_version_line() {
        let prefix = CommandPrefix::with_args("/bin/sh", ["-c", "echo 'tool 1.2.3'; echo more"]);
        match check_tool(&prefix, &[]) {
            ToolStatus::Available { version_line, .. } => {
                assert_eq!(version_line.as_deref(), Some("tool 1.2.3"))
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn check_flags_missing_and_broken_tools() {
        let missing = check_tool(&CommandPrefix::new("/nope/yt-dlp"), &["--version"]);
        assert!(!missing.is_available());

        let broken = check_tool(&CommandPrefix::with_args("/bin/sh", ["-c", "exit 2"]), &[]);
        match broken {
            ToolStatus::Unavailable { reason } => assert!(reason.contains("not working")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn dependency_check_ignores_the_optional_prober() {
        let commands = ToolCommands {
            downloader: CommandPrefix::new("/bin/sh"),
            transcoder: CommandPrefix::new("/bin/sh"),
            separator: CommandPrefix::new("/bin/sh"),
            prober: Some(CommandPrefix::new("/nope/ffprobe")),
        };
        assert!(check_dependencies(&commands).is_ok());

        let commands = ToolCommands {
            separator: CommandPrefix::new("/nope/demucs"),
            ..commands
        };
        let err = check_dependencies(&commands).unwrap_err();
        assert!(err.to_string().contains("demucs"));
    }
}
