use crate::tools::ToolCommands;
use crate::workspace::WorkspaceLayout;
use serde::{Deserialize, Serialize};
use std::{
    env, fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Everything a run needs besides the job itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tools: ToolCommands,
    /// Final outputs land here as `<title>.wav` / `<title>.mp4`.
    pub output_dir: PathBuf,
    /// Parent of the per-job workspace (or the workspace itself when shared).
    pub work_root: PathBuf,
    pub workspace_layout: WorkspaceLayout,
    /// Ask the platform to open the result when a run succeeds.
    pub open_result: bool,
    /// Forward every download progress line to the log sink.
    pub verbose: bool,
    /// Query the source duration so extraction progress is exact.
    pub probe_duration: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tools: ToolCommands::default(),
            output_dir: PathBuf::from("videos"),
            work_root: env::temp_dir(),
            workspace_layout: WorkspaceLayout::default(),
            open_result: true,
            verbose: false,
            probe_duration: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineConfig {
    /// Loads a JSON config. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
