use crate::stage::Stage;

/// A measurement produced while a stage runs: how far into the stage we are
/// (0.0 - 1.0) and what to show the user.
#[derive(Debug, Clone, PartialEq)]
pub struct StageProgress {
    pub fraction: f32,
    pub label: String,
}

impl StageProgress {
    pub fn new(fraction: f32, label: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            label: label.into(),
        }
    }
}

/// Maps a stage-local fraction onto the global 0-100 scale.
pub fn global_percent(stage: Stage, fraction: f32) -> f32 {
    let (start, end) = stage.progress_range();
    start + (end - start) * fraction.clamp(0.0, 1.0)
}

/// Keeps the percentages handed to the progress sink non-decreasing.
///
/// Tools do not report monotonically: yt-dlp restarts at 0% for the audio
/// stream after the video stream finishes, and the transcode heuristic can
/// undershoot a checkpoint already shown.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last: f32,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> f32 {
        self.last
    }

    /// Records a measurement inside `stage` and returns the percent to display.
    pub fn advance(&mut self, stage: Stage, fraction: f32) -> f32 {
        self.checkpoint(global_percent(stage, fraction))
    }

    /// Records an absolute percent and returns the percent to display.
    pub fn checkpoint(&mut self, percent: f32) -> f32 {
        self.last = self.last.max(percent.clamp(0.0, 100.0));
        self.last
    }

    pub fn reset(&mut self) {
        self.last = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractions_map_into_stage_slices() {
        assert_eq!(global_percent(Stage::AcquireSource, 0.0), 10.0);
        assert_eq!(global_percent(Stage::AcquireSource, 0.5), 20.0);
        assert_eq!(global_percent(Stage::SeparateVocals, 0.55), 72.0);
        assert_eq!(global_percent(Stage::Finalize, 2.0), 100.0);
    }

    #[test]
    fn tracker_never_goes_backwards() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.advance(Stage::AcquireSource, 1.0), 30.0);
        // second stream of a yt-dlp download restarts at 0%
        assert_eq!(tracker.advance(Stage::AcquireSource, 0.1), 30.0);
        assert_eq!(tracker.advance(Stage::ExtractAudio, 0.5), 40.0);
        assert_eq!(tracker.checkpoint(35.0), 40.0);
        tracker.reset();
        assert_eq!(tracker.last(), 0.0);
    }
}
