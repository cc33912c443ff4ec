use crate::process::{CommandPrefix, CommandSpec};
use ohne_core::Action;
use std::{
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

/// `<output_dir>/<title>.<wav|mp4>`
pub fn output_path(output_dir: &Path, title: &str, action: Action) -> PathBuf {
    output_dir.join(format!("{}.{}", title, action.extension()))
}

/// Keeps the video stream untouched, takes audio from the vocals file and
/// stops at the shorter input.
pub fn mux_command(
    transcoder: &CommandPrefix,
    video: &Path,
    vocals: &Path,
    output: &Path,
) -> CommandSpec {
    CommandSpec::new(transcoder)
        .arg("-y")
        .arg("-i")
        .arg(video)
        .arg("-i")
        .arg(vocals)
        .args(["-c:v", "copy", "-map", "0:v:0", "-map", "1:a:0", "-shortest"])
        .arg(output)
}

/// Hands `path` to the desktop's default application. Returns once the
/// opener is launched.
pub fn open_with_default_handler(path: &Path) -> io::Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        // The empty argument is the window title `start` expects first.
        c.args(["/C", "start", ""]).arg(path);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(path);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(path);
        c
    };
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}
