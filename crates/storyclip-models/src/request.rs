//! Source media and distribution requests.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::effects::EffectOverrides;

/// Default nominal clip duration, in seconds.
pub const DEFAULT_CLIP_DURATION_SECS: f64 = 3.0;

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true when either side is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A validated source video, as handed over by the ingest side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceMedia {
    /// Local path of the source file
    pub path: PathBuf,
    /// Probed duration in seconds
    pub duration_seconds: f64,
    /// Probed frame dimensions, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

impl SourceMedia {
    pub fn new(path: impl Into<PathBuf>, duration_seconds: f64) -> Self {
        Self {
            path: path.into(),
            duration_seconds,
            dimensions: None,
        }
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Returns true when the probed duration can be planned against.
    pub fn is_playable(&self) -> bool {
        self.duration_seconds.is_finite() && self.duration_seconds > 0.0
    }
}

/// Requested number of clips.
///
/// Serialized as the string `"auto"` or a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawClipCount", into = "RawClipCount")]
pub enum ClipCount {
    /// Cover the available footage with nominal-duration clips
    #[default]
    Auto,
    /// Produce (up to) this many clips
    Exact(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawClipCount {
    Number(u32),
    Text(String),
}

impl TryFrom<RawClipCount> for ClipCount {
    type Error = String;

    fn try_from(raw: RawClipCount) -> Result<Self, Self::Error> {
        match raw {
            RawClipCount::Number(n) => Ok(ClipCount::Exact(n)),
            RawClipCount::Text(s) if s.eq_ignore_ascii_case("auto") => Ok(ClipCount::Auto),
            RawClipCount::Text(s) => s
                .trim()
                .parse::<u32>()
                .map(ClipCount::Exact)
                .map_err(|_| format!("invalid clip count '{}', expected \"auto\" or a number", s)),
        }
    }
}

impl From<ClipCount> for RawClipCount {
    fn from(count: ClipCount) -> Self {
        match count {
            ClipCount::Auto => RawClipCount::Text("auto".to_string()),
            ClipCount::Exact(n) => RawClipCount::Number(n),
        }
    }
}

impl std::str::FromStr for ClipCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClipCount::try_from(RawClipCount::Text(s.to_string()))
    }
}

impl fmt::Display for ClipCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipCount::Auto => write!(f, "auto"),
            ClipCount::Exact(n) => write!(f, "{}", n),
        }
    }
}

/// How a source should be split into clips, and with which effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct DistributionRequest {
    /// Nominal clip duration in seconds
    #[serde(default = "default_clip_duration")]
    #[validate(range(
        exclusive_min = 0.0,
        max = 60.0,
        message = "clip duration must be in (0, 60] seconds"
    ))]
    pub clip_duration_seconds: f64,

    /// `"auto"` or an explicit clip count
    #[serde(default)]
    #[schemars(with = "serde_json::Value")]
    pub clip_count: ClipCount,

    /// Where in the source the first clip starts, in seconds
    #[serde(default)]
    #[validate(range(min = 0.0, message = "start offset cannot be negative"))]
    pub start_offset_seconds: f64,

    /// Allow windows to wrap around the end of the source
    #[serde(default)]
    pub allow_looping: bool,

    /// Effect overrides; absent fields fall back to defaults
    #[serde(default)]
    pub effects: EffectOverrides,
}

fn default_clip_duration() -> f64 {
    DEFAULT_CLIP_DURATION_SECS
}

impl Default for DistributionRequest {
    fn default() -> Self {
        Self {
            clip_duration_seconds: DEFAULT_CLIP_DURATION_SECS,
            clip_count: ClipCount::Auto,
            start_offset_seconds: 0.0,
            allow_looping: false,
            effects: EffectOverrides::default(),
        }
    }
}

impl DistributionRequest {
    /// Auto-count request with the given nominal duration.
    pub fn auto(clip_duration_seconds: f64) -> Self {
        Self {
            clip_duration_seconds,
            ..Default::default()
        }
    }

    /// Explicit-count request with the given nominal duration.
    pub fn exact(clip_duration_seconds: f64, count: u32) -> Self {
        Self {
            clip_duration_seconds,
            clip_count: ClipCount::Exact(count),
            ..Default::default()
        }
    }

    pub fn with_start_offset(mut self, seconds: f64) -> Self {
        self.start_offset_seconds = seconds;
        self
    }

    pub fn with_looping(mut self, allow: bool) -> Self {
        self.allow_looping = allow;
        self
    }

    pub fn with_effects(mut self, effects: EffectOverrides) -> Self {
        self.effects = effects;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_empty_json() {
        let request: DistributionRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.clip_duration_seconds, 3.0);
        assert_eq!(request.clip_count, ClipCount::Auto);
        assert_eq!(request.start_offset_seconds, 0.0);
        assert!(!request.allow_looping);
    }

    #[test]
    fn test_clip_count_accepts_auto_and_numbers() {
        let auto: DistributionRequest = serde_json::from_str(r#"{"clip_count":"AUTO"}"#).unwrap();
        assert_eq!(auto.clip_count, ClipCount::Auto);

        let exact: DistributionRequest = serde_json::from_str(r#"{"clip_count":12}"#).unwrap();
        assert_eq!(exact.clip_count, ClipCount::Exact(12));

        let text: DistributionRequest = serde_json::from_str(r#"{"clip_count":"7"}"#).unwrap();
        assert_eq!(text.clip_count, ClipCount::Exact(7));

        assert!(serde_json::from_str::<DistributionRequest>(r#"{"clip_count":"lots"}"#).is_err());
    }

    #[test]
    fn test_clip_count_serializes_sentinel() {
        assert_eq!(serde_json::to_string(&ClipCount::Auto).unwrap(), r#""auto""#);
        assert_eq!(serde_json::to_string(&ClipCount::Exact(4)).unwrap(), "4");
    }

    #[test]
    fn test_request_validation() {
        assert!(DistributionRequest::auto(3.0).validate().is_ok());
        assert!(DistributionRequest::auto(0.0).validate().is_err());
        assert!(DistributionRequest::auto(61.0).validate().is_err());
        assert!(DistributionRequest::auto(3.0)
            .with_start_offset(-1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_source_playable() {
        assert!(SourceMedia::new("a.mp4", 12.5).is_playable());
        assert!(!SourceMedia::new("a.mp4", 0.0).is_playable());
        assert!(!SourceMedia::new("a.mp4", f64::NAN).is_playable());
    }
}
