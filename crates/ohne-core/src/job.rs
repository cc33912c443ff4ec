use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where the input video comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    RemoteUrl(String),
    LocalFile(PathBuf),
}

impl Source {
    /// Builds a source from the two optional user inputs. Blank values count
    /// as unset; setting both is rejected rather than silently preferring one.
    pub fn from_inputs(url: Option<&str>, file: Option<&Path>) -> Result<Option<Self>, JobError> {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        let file = file.filter(|p| !p.as_os_str().is_empty());

        match (url, file) {
            (Some(_), Some(_)) => Err(JobError::AmbiguousSource),
            (Some(u), None) => Ok(Some(Source::RemoteUrl(u.to_string()))),
            (None, Some(p)) => Ok(Some(Source::LocalFile(p.to_path_buf()))),
            (None, None) => Ok(None),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Source::RemoteUrl(u) => u.trim().is_empty(),
            Source::LocalFile(p) => p.as_os_str().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Copy the separated vocals out as `<title>.wav`.
    ExtractVocals,
    /// Put the vocals under the original video as `<title>.mp4`.
    MergeWithVideo,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::ExtractVocals => "extract",
            Action::MergeWithVideo => "merge",
        }
    }

    /// File extension of the artifact this action produces.
    pub const fn extension(self) -> &'static str {
        match self {
            Action::ExtractVocals => "wav",
            Action::MergeWithVideo => "mp4",
        }
    }
}

/// The unit of work submitted by the caller. Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub source: Option<Source>,
    pub output_title: String,
    pub action: Action,
}

/// A job that passed validation: the source is present and the title is a
/// bare file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidJob {
    pub source: Source,
    pub title: String,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("no source given: enter a URL or select a local video file")]
    MissingSource,
    #[error("both a URL and a local file were given; pick one")]
    AmbiguousSource,
    #[error("output title is empty")]
    EmptyTitle,
    #[error("output title {title:?} does not leave a usable file name")]
    InvalidTitle { title: String },
}

impl Job {
    pub fn new(source: Option<Source>, output_title: impl Into<String>, action: Action) -> Self {
        Self {
            source,
            output_title: output_title.into(),
            action,
        }
    }

    pub fn validate(&self) -> Result<ValidJob, JobError> {
        let source = match &self.source {
            Some(s) if !s.is_blank() => s.clone(),
            _ => return Err(JobError::MissingSource),
        };

        if self.output_title.trim().is_empty() {
            return Err(JobError::EmptyTitle);
        }
        let title = sanitize_title(&self.output_title, self.action).ok_or_else(|| {
            JobError::InvalidTitle {
                title: self.output_title.clone(),
            }
        })?;

        Ok(ValidJob {
            source,
            title,
            action: self.action,
        })
    }
}

/// Reduces a user supplied title to a bare file stem.
///
/// Path separators and characters that are reserved on common filesystems are
/// replaced with `_`, leading/trailing dots and whitespace are stripped, and a
/// trailing extension matching the action's output is dropped (users often type
/// `song.wav`). Returns `None` when nothing usable is left.
pub fn sanitize_title(title: &str, action: Action) -> Option<String> {
    let mut stem = title.trim();

    let ext = format!(".{}", action.extension());
    if stem.len() > ext.len() && stem.to_ascii_lowercase().ends_with(&ext) {
        stem = &stem[..stem.len() - ext.len()];
    }

    let cleaned: String = stem
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return None;
    }
    Some(cleaned.to_string())
}
