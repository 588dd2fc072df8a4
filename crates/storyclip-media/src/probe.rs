//! FFprobe source inspection.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use storyclip_models::{Dimensions, SourceMedia};

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Probed properties of a video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    pub codec: String,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Probe a video file.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let ffprobe = check_ffprobe()?;
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("ffprobe exited with {:?}", output.status.code()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        });
    }

    let info = parse_probe_output(&output.stdout)?;
    debug!(
        path = %path.display(),
        duration = info.duration,
        width = info.width,
        height = info.height,
        "Probed source"
    );
    Ok(info)
}

/// Probe a file into the ingest-side [`SourceMedia`] record.
pub async fn probe_source(path: impl AsRef<Path>) -> MediaResult<SourceMedia> {
    let path = path.as_ref();
    let info = probe_video(path).await?;
    let mut source = SourceMedia::new(path, info.duration);
    if info.width > 0 && info.height > 0 {
        source = source.with_dimensions(Dimensions::new(info.width, info.height));
    }
    Ok(source)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    // Container duration first; some containers only report it per stream
    let duration = probe
        .format
        .duration
        .as_deref()
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite())
        .unwrap_or(0.0);

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        fps,
        codec: video.codec_name.clone().unwrap_or_default(),
        has_audio: probe.streams.iter().any(|s| s.codec_type == "audio"),
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den > 0.0).then(|| num / den);
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "format": {"duration": "20.480000"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "avg_frame_rate": "25/1"}
            ]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!((info.duration - 20.48).abs() < 1e-9);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.codec, "h264");
        assert!(info.has_audio);
        assert!((info.fps - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_stream_duration_fallback_and_missing_video() {
        let json = br#"{"format": {}, "streams": [
            {"codec_type": "video", "width": 720, "height": 1280, "duration": "5.0"}
        ]}"#;
        assert_eq!(parse_probe_output(json).unwrap().duration, 5.0);

        let audio_only = br#"{"format": {"duration": "5.0"}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(audio_only),
            Err(MediaError::InvalidVideo(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_source("/nonexistent/source.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
