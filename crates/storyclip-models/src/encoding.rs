//! Fixed codec and quality parameters for rendered clips.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
pub const DEFAULT_PRESET: &str = "fast";
pub const DEFAULT_CRF: u8 = 23;
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Container extension of every rendered clip.
pub const OUTPUT_FORMAT: &str = "mp4";

/// Encoding parameters applied to every clip of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g. "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoder preset (e.g. "fast", "medium")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Move the moov atom to the front for progressive playback
    #[serde(default = "default_faststart")]
    pub faststart: bool,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}
fn default_faststart() -> bool {
    true
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            preset: default_preset(),
            crf: DEFAULT_CRF,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            pixel_format: default_pixel_format(),
            faststart: true,
        }
    }
}

impl EncodingConfig {
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf.min(51);
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// Output arguments for the encoder.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ];

        if self.faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = EncodingConfig::default().to_ffmpeg_args();
        let joined = args.join(" ");
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-preset fast"));
        assert!(joined.contains("-crf 23"));
        assert!(joined.contains("-pix_fmt yuv420p"));
        assert!(joined.contains("-c:a aac -b:a 128k"));
        assert!(joined.ends_with("-movflags +faststart"));
    }

    #[test]
    fn test_crf_is_capped() {
        assert_eq!(EncodingConfig::default().with_crf(80).crf, 51);
    }
}
