use std::{
    env,
    path::{Path, PathBuf},
};

/// Platform file name of a tool binary.
pub fn executable_name(name: &str) -> String {
    if cfg!(windows) && !name.ends_with(".exe") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Directory of the running binary, if it can be determined.
pub fn app_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Install locations checked after `PATH`.
pub fn common_install_dirs() -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![
            PathBuf::from("C:/Program Files/ffmpeg/bin"),
            PathBuf::from("C:/ffmpeg/bin"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/usr/bin"),
            PathBuf::from("/opt/homebrew/bin"),
        ]
    }
}

/// Candidate paths for `name` that are checked before and after `PATH`,
/// in search order: bundled `tools/` dir, the app dir itself, then the
/// common install locations.
pub fn candidate_paths(app_dir: Option<&Path>, name: &str) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let exe = executable_name(name);
    let bundled = app_dir
        .map(|dir| vec![dir.join("tools").join(&exe), dir.join(&exe)])
        .unwrap_or_default();
    let fallback = common_install_dirs()
        .into_iter()
        .map(|dir| dir.join(&exe))
        .collect();
    (bundled, fallback)
}

/// First non-empty line of a version/help dump.
pub fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_tools_dir_is_searched_first() {
        let (bundled, fallback) = candidate_paths(Some(Path::new("/opt/ohne")), "ffmpeg");
        let exe = executable_name("ffmpeg");
        assert_eq!(bundled[0], Path::new("/opt/ohne/tools").join(&exe));
        assert_eq!(bundled[1], Path::new("/opt/ohne").join(&exe));
        assert!(!fallback.is_empty());
    }

    #[test]
    fn first_line_skips_blank_lines() {
        assert_eq!(
            first_line("\n  ffmpeg version 6.1 Copyright\nbuilt with gcc\n"),
            Some("ffmpeg version 6.1 Copyright".to_string())
        );
        assert_eq!(first_line("  \n"), None);
    }
}
