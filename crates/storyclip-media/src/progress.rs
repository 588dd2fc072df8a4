//! FFmpeg `-progress` output parsing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Progress block reported by FFmpeg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    /// Set on the final block
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction of `total_ms` encoded so far, capped at 1.0.
    pub fn fraction(&self, total_ms: i64) -> f64 {
        if total_ms <= 0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / total_ms as f64).clamp(0.0, 1.0)
    }
}

/// Callback invoked once per completed progress block.
pub type ProgressCallback = Arc<dyn Fn(FfmpegProgress) + Send + Sync + 'static>;

/// Accumulates `key=value` lines into progress blocks.
///
/// FFmpeg terminates every block with a `progress=continue|end` line.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns a snapshot when a block is complete.
    pub fn feed(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // Despite its name, out_time_ms is also reported in microseconds.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.current.speed = speed;
                }
            }
            "progress" => {
                self.current.is_complete = value == "end";
                return Some(self.current.clone());
            }
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_emitted_on_progress_line() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed("frame=48").is_none());
        assert!(parser.feed("out_time_us=2000000").is_none());
        assert!(parser.feed("speed=1.5x").is_none());

        let block = parser.feed("progress=continue").unwrap();
        assert_eq!(block.frame, 48);
        assert_eq!(block.out_time_ms, 2000);
        assert!((block.speed - 1.5).abs() < f64::EPSILON);
        assert!(!block.is_complete);

        assert!(parser.feed("progress=end").unwrap().is_complete);
    }

    #[test]
    fn test_unparseable_values_are_ignored() {
        let mut parser = ProgressParser::new();
        parser.feed("speed=N/A");
        parser.feed("out_time_us=N/A");
        parser.feed("not a progress line");
        let block = parser.feed("progress=continue").unwrap();
        assert_eq!(block, FfmpegProgress::default());
    }

    #[test]
    fn test_fraction() {
        let progress = FfmpegProgress {
            out_time_ms: 1500,
            ..Default::default()
        };
        assert!((progress.fraction(3000) - 0.5).abs() < 1e-9);
        assert_eq!(progress.fraction(1000), 1.0);
        assert_eq!(progress.fraction(0), 0.0);
    }
}
