use super::types::{CancelToken, CommandSpec, ProcessError, ProcessExit};
use super::utils::spawn_line_reader;
use crossbeam_channel::RecvTimeoutError;
use std::{process::Stdio, time::Duration};
use tracing::{debug, warn};

/// How often a silent child is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs `spec` to completion, handing each line of its combined
/// stdout/stderr to `on_line`.
///
/// `on_line` runs on the calling thread, in arrival order. Lines from the two
/// streams are interleaved as they arrive; order within one stream is kept.
/// If `cancel` fires, the child is killed and `ProcessError::Cancelled` is
/// returned.
pub fn run_streaming<F>(
    spec: &CommandSpec,
    cancel: &CancelToken,
    mut on_line: F,
) -> Result<ProcessExit, ProcessError>
where
    F: FnMut(&str),
{
    let program = spec.program_name();
    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(command = %spec, "spawning");
    let mut child = cmd.spawn().map_err(|source| ProcessError::Launch {
        program: program.clone(),
        source,
    })?;

    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_reader(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_reader(stderr, tx.clone()));
    }
    drop(tx);

    loop {
        if cancel.is_cancelled() {
            warn!(%program, "cancelling");
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::Cancelled { program });
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => on_line(&line),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for reader in readers {
        let _ = reader.join();
    }

    let status = child
        .wait()
        .map_err(|source| ProcessError::Wait {
            program: program.clone(),
            source,
        })?;
    debug!(%program, code = ?status.code(), "exited");

    Ok(ProcessExit {
        code: status.code(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::CommandPrefix;
    use std::{thread, time::Instant};

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(&CommandPrefix::with_args("/bin/sh", ["-c", script]))
    }

    #[test]
    fn streams_both_outputs_and_reports_exit_code() {
        let mut lines = Vec::new();
        let exit = run_streaming(
            &sh("echo out; echo err 1>&2; exit 3"),
            &CancelToken::new(),
            |l| lines.push(l.to_string()),
        )
        .unwrap();

        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
    }

    #[test]
    fn missing_program_fails_before_any_line() {
        let spec = CommandSpec::new(&CommandPrefix::new("/definitely/not/here/yt-dlp"));
        let mut seen = 0;
        let err = run_streaming(&spec, &CancelToken::new(), |_| seen += 1).unwrap_err();
        assert!(matches!(err, ProcessError::Launch { .. }));
        assert_eq!(seen, 0);
    }

    #[test]
    fn runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();
        run_streaming(
            &sh("pwd").current_dir(dir.path()),
            &CancelToken::new(),
            |l| lines.push(l.to_string()),
        )
        .unwrap();
        let reported = std::fs::canonicalize(&lines[0]).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn cancellation_kills_the_child() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });

        let started = Instant::now();
        let err = run_streaming(&sh("sleep 30"), &cancel, |_| {}).unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
