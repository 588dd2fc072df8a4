//! Clip windows produced by the planner.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum number of clips a single job may produce.
pub const MAX_CLIPS: u32 = 50;

/// Maximum duration of any single clip window, in seconds.
pub const MAX_CLIP_DURATION_SECS: f64 = 60.0;

/// Kind of a planned clip window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    /// Window with the nominal requested duration
    Standard,
    /// Window absorbing footage left over after the standard windows
    Extended,
}

impl ClipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipKind::Standard => "standard",
            ClipKind::Extended => "extended",
        }
    }
}

/// A planned `(start_offset, duration)` slice of the source media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipWindow {
    /// 1-based clip index, unique within a job
    pub index: u32,
    /// Seek position into the source, in seconds
    pub start_offset: f64,
    /// Window duration, in seconds
    pub duration: f64,
    /// Standard or extended
    pub kind: ClipKind,
    /// Extra passes over the source needed to cover the window (looped renders only)
    #[serde(default)]
    pub loops: u32,
}

impl ClipWindow {
    /// Create a window that plays straight through the source.
    pub fn new(index: u32, start_offset: f64, duration: f64, kind: ClipKind) -> Self {
        Self {
            index,
            start_offset,
            duration,
            kind,
            loops: 0,
        }
    }

    /// End of the window on the (possibly looped) source timeline.
    pub fn end_offset(&self) -> f64 {
        self.start_offset + self.duration
    }

    /// Output file name for this window.
    pub fn file_name(&self) -> String {
        clip_file_name(self.index)
    }

    /// Window duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.duration * 1000.0).round() as i64
    }
}

/// Output file name for a clip index (`clip_001.mp4`).
pub fn clip_file_name(index: u32) -> String {
    format!("clip_{:03}.mp4", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_file_name_is_zero_padded() {
        assert_eq!(clip_file_name(1), "clip_001.mp4");
        assert_eq!(clip_file_name(42), "clip_042.mp4");
        assert_eq!(clip_file_name(120), "clip_120.mp4");
    }

    #[test]
    fn test_window_end_offset() {
        let window = ClipWindow::new(3, 6.0, 3.0, ClipKind::Standard);
        assert_eq!(window.end_offset(), 9.0);
        assert_eq!(window.duration_ms(), 3000);
        assert_eq!(window.file_name(), "clip_003.mp4");
    }
}
