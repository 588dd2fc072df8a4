//! Effect configuration.
//!
//! Requests carry [`EffectOverrides`], where every field may be absent.
//! [`EffectOverrides::resolve`] turns them into a total [`EffectConfig`] in a
//! single pass, so nothing downstream ever sees a partially-present value.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::Dimensions;

/// Default indicator badge size in pixels.
pub const DEFAULT_INDICATOR_SIZE: u32 = 90;
/// Default distance from the frame edge, in pixels.
pub const DEFAULT_INDICATOR_MARGIN: u32 = 20;
/// Default indicator background colour.
pub const DEFAULT_INDICATOR_COLOR: &str = "#000000";
/// Default indicator opacity.
pub const DEFAULT_INDICATOR_OPACITY: f64 = 0.7;

/// Largest output frame side, in pixels. Also bounds indicator geometry.
pub const MAX_FRAME_SIDE: u32 = 8192;

/// Errors raised while resolving effect overrides.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EffectError {
    #[error("Invalid colour '{0}', expected #RRGGBB")]
    InvalidColor(String),

    #[error("Custom colour expression is empty")]
    EmptyExpression,

    #[error("Temporal indicator duration must be positive, got {0}")]
    InvalidTemporalDuration(f64),

    #[error("Effect value '{0}' is not a finite number")]
    NonFinite(&'static str),

    #[error("Aspect ratio {ratio} gives a {width}x{height} frame, larger than {max}px", max = MAX_FRAME_SIDE)]
    FrameTooLarge {
        ratio: AspectRatio,
        width: u32,
        height: u32,
    },

    #[error("Indicator {field} {value} exceeds {max}px", max = MAX_FRAME_SIDE)]
    IndicatorTooLarge { field: &'static str, value: u32 },
}

/// Aspect ratio as `width:height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Vertical story format (9:16)
    pub const PORTRAIT: AspectRatio = AspectRatio::new(9, 16);
    /// Square (1:1)
    pub const SQUARE: AspectRatio = AspectRatio::new(1, 1);
    /// Feed portrait (4:5)
    pub const FEED_PORTRAIT: AspectRatio = AspectRatio::new(4, 5);
    /// Landscape (16:9)
    pub const LANDSCAPE: AspectRatio = AspectRatio::new(16, 9);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_portrait(&self) -> bool {
        self.width <= self.height
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PORTRAIT
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AspectRatioParseError {
    #[error("Invalid aspect ratio format: {0}, expected 'W:H'")]
    InvalidFormat(String),
    #[error("Invalid number in aspect ratio: {0}")]
    InvalidNumber(String),
    #[error("Aspect ratio cannot have zero values")]
    ZeroValue,
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| AspectRatioParseError::InvalidFormat(s.to_string()))?;

        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(w.to_string()))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(h.to_string()))?;

        if width == 0 || height == 0 {
            return Err(AspectRatioParseError::ZeroValue);
        }

        Ok(AspectRatio { width, height })
    }
}

impl JsonSchema for AspectRatio {
    fn schema_name() -> String {
        "AspectRatio".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = AspectRatioParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(ratio: AspectRatio) -> Self {
        ratio.to_string()
    }
}

/// How the source is fitted into the target frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Scale to fit inside, then letterbox
    #[default]
    Pad,
    /// Scale to cover, then crop the overflow
    Crop,
}

/// Output resolution class, expressed as the short side of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    FullHd1080,
}

impl Resolution {
    pub fn short_side(&self) -> u32 {
        match self {
            Resolution::Hd720 => 720,
            Resolution::FullHd1080 => 1080,
        }
    }
}

/// Named colour grading presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColorPreset {
    Vintage,
    BlackWhite,
    Sepia,
    Cool,
    Warm,
    Vivid,
}

/// Colour adjustment stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColorFilter {
    /// No grading; rendered as an explicit identity stage
    #[default]
    None,
    /// Manual adjustment
    Adjust {
        #[serde(default)]
        brightness: f64,
        #[serde(default = "unit")]
        contrast: f64,
        #[serde(default = "unit")]
        saturation: f64,
        #[serde(default)]
        hue: f64,
    },
    /// Named preset
    Preset { preset: ColorPreset },
    /// Raw colour expression supplied by the caller
    Custom { expression: String },
}

fn unit() -> f64 {
    1.0
}

impl ColorFilter {
    /// Clamp values into the ranges the engine accepts.
    fn resolve(self) -> Result<Self, EffectError> {
        match self {
            ColorFilter::Adjust {
                brightness,
                contrast,
                saturation,
                hue,
            } => Ok(ColorFilter::Adjust {
                brightness: finite("brightness", brightness)?.clamp(-1.0, 1.0),
                contrast: finite("contrast", contrast)?.clamp(0.0, 3.0),
                saturation: finite("saturation", saturation)?.clamp(0.0, 3.0),
                hue: finite("hue", hue)?.clamp(-180.0, 180.0),
            }),
            ColorFilter::Custom { expression } => {
                let expression = expression.trim().to_string();
                if expression.is_empty() {
                    Err(EffectError::EmptyExpression)
                } else {
                    Ok(ColorFilter::Custom { expression })
                }
            }
            other => Ok(other),
        }
    }
}

/// Texture overlay kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TextureKind {
    Vignette,
    FilmGrain,
    Vhs,
    Chromatic,
    LightLeak,
    Bokeh,
    Glitch,
}

/// Texture overlay with an intensity between 0 and 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TextureOverlay {
    pub kind: TextureKind,
    #[serde(default = "default_intensity")]
    pub intensity: u8,
}

fn default_intensity() -> u8 {
    50
}

impl TextureOverlay {
    /// Intensity normalised to `0.0..=1.0`.
    pub fn strength(&self) -> f64 {
        f64::from(self.intensity.min(100)) / 100.0
    }
}

/// Named indicator anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum IndicatorPosition {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorStyle {
    /// Filled box
    #[default]
    Badge,
    /// Box outline
    Outline,
}

/// When the indicator is visible.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IndicatorTiming {
    #[default]
    Permanent,
    /// Visible for the first `seconds` of the clip
    Temporal { seconds: f64 },
}

/// Fully resolved clip indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Indicator {
    pub position: IndicatorPosition,
    pub size: u32,
    pub margin: u32,
    /// `#RRGGBB`
    pub color: String,
    pub opacity: f64,
    pub style: IndicatorStyle,
    pub timing: IndicatorTiming,
}

impl Default for Indicator {
    fn default() -> Self {
        Self {
            position: IndicatorPosition::default(),
            size: DEFAULT_INDICATOR_SIZE,
            margin: DEFAULT_INDICATOR_MARGIN,
            color: DEFAULT_INDICATOR_COLOR.to_string(),
            opacity: DEFAULT_INDICATOR_OPACITY,
            style: IndicatorStyle::default(),
            timing: IndicatorTiming::default(),
        }
    }
}

/// Partial indicator settings as they arrive from callers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct IndicatorOverrides {
    pub enabled: Option<bool>,
    pub position: Option<IndicatorPosition>,
    pub size: Option<u32>,
    pub margin: Option<u32>,
    pub color: Option<String>,
    pub opacity: Option<f64>,
    pub style: Option<IndicatorStyle>,
    pub timing: Option<IndicatorTiming>,
}

impl IndicatorOverrides {
    fn resolve(self) -> Result<Option<Indicator>, EffectError> {
        if self.enabled == Some(false) {
            return Ok(None);
        }

        let defaults = Indicator::default();
        let color = match self.color {
            Some(color) => normalize_hex_color(&color)?,
            None => defaults.color,
        };
        let opacity = match self.opacity {
            Some(o) => finite("opacity", o)?.clamp(0.0, 1.0),
            None => defaults.opacity,
        };
        let timing = match self.timing {
            Some(IndicatorTiming::Temporal { seconds }) if !(seconds.is_finite() && seconds > 0.0) => {
                return Err(EffectError::InvalidTemporalDuration(seconds));
            }
            Some(timing) => timing,
            None => defaults.timing,
        };

        let size = bounded_side("size", self.size.unwrap_or(defaults.size))?.max(1);
        let margin = bounded_side("margin", self.margin.unwrap_or(defaults.margin))?;

        Ok(Some(Indicator {
            position: self.position.unwrap_or(defaults.position),
            size,
            margin,
            color,
            opacity,
            style: self.style.unwrap_or(defaults.style),
            timing,
        }))
    }
}

/// Effect settings as requested; every field is optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct EffectOverrides {
    pub mirror: Option<bool>,
    pub color: Option<ColorFilter>,
    pub texture: Option<TextureOverlay>,
    pub indicator: Option<IndicatorOverrides>,
    pub aspect_ratio: Option<AspectRatio>,
    pub fit: Option<FitMode>,
    pub resolution: Option<Resolution>,
}

impl EffectOverrides {
    /// Normalize into a total configuration.
    pub fn resolve(self) -> Result<EffectConfig, EffectError> {
        let color = self.color.unwrap_or_default().resolve()?;
        let texture = self
            .texture
            .map(|t| TextureOverlay {
                kind: t.kind,
                intensity: t.intensity.min(100),
            })
            .filter(|t| t.intensity > 0);
        let indicator = match self.indicator {
            Some(overrides) => overrides.resolve()?,
            None => None,
        };

        let config = EffectConfig {
            mirror: self.mirror.unwrap_or(false),
            color,
            texture,
            indicator,
            aspect_ratio: self.aspect_ratio.unwrap_or_default(),
            fit: self.fit.unwrap_or_default(),
            resolution: self.resolution.unwrap_or_default(),
        };

        let target = config.target_dimensions();
        if target.width > MAX_FRAME_SIDE || target.height > MAX_FRAME_SIDE {
            return Err(EffectError::FrameTooLarge {
                ratio: config.aspect_ratio,
                width: target.width,
                height: target.height,
            });
        }
        Ok(config)
    }
}

/// Fully resolved effect configuration.
///
/// `texture` and `indicator` use `None` to mean "explicitly off".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EffectConfig {
    pub mirror: bool,
    pub color: ColorFilter,
    pub texture: Option<TextureOverlay>,
    pub indicator: Option<Indicator>,
    pub aspect_ratio: AspectRatio,
    pub fit: FitMode,
    pub resolution: Resolution,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            mirror: false,
            color: ColorFilter::None,
            texture: None,
            indicator: None,
            aspect_ratio: AspectRatio::default(),
            fit: FitMode::default(),
            resolution: Resolution::default(),
        }
    }
}

impl EffectConfig {
    /// Output frame size: the short side follows the resolution class and
    /// the long side follows the aspect ratio, rounded to an even number.
    pub fn target_dimensions(&self) -> Dimensions {
        let short = self.resolution.short_side();
        let ratio = self.aspect_ratio;
        let (short_part, long_part) = if ratio.is_portrait() {
            (ratio.width, ratio.height)
        } else {
            (ratio.height, ratio.width)
        };
        let long = even(f64::from(short) * f64::from(long_part) / f64::from(short_part));

        if ratio.is_portrait() {
            Dimensions::new(short, long)
        } else {
            Dimensions::new(long, short)
        }
    }
}

/// Round to an even pixel count, saturating at the largest even `u32`.
fn even(value: f64) -> u32 {
    let rounded = value.round().min(f64::from(u32::MAX - 1)) as u32;
    rounded + rounded % 2
}

fn bounded_side(field: &'static str, value: u32) -> Result<u32, EffectError> {
    if value > MAX_FRAME_SIDE {
        Err(EffectError::IndicatorTooLarge { field, value })
    } else {
        Ok(value)
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, EffectError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EffectError::NonFinite(name))
    }
}

fn normalize_hex_color(color: &str) -> Result<String, EffectError> {
    let trimmed = color.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(format!("#{}", hex.to_ascii_lowercase()))
    } else {
        Err(EffectError::InvalidColor(color.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_overrides_resolve_to_defaults() {
        let config = EffectOverrides::default().resolve().unwrap();
        assert_eq!(config, EffectConfig::default());
        assert_eq!(config.color, ColorFilter::None);
        assert_eq!(config.target_dimensions(), Dimensions::new(720, 1280));
    }

    #[test]
    fn test_adjust_values_are_clamped() {
        let overrides = EffectOverrides {
            color: Some(ColorFilter::Adjust {
                brightness: 4.0,
                contrast: -1.0,
                saturation: 9.0,
                hue: 400.0,
            }),
            ..Default::default()
        };
        let config = overrides.resolve().unwrap();
        assert_eq!(
            config.color,
            ColorFilter::Adjust {
                brightness: 1.0,
                contrast: 0.0,
                saturation: 3.0,
                hue: 180.0,
            }
        );
    }

    #[test]
    fn test_non_finite_adjust_rejected() {
        let overrides = EffectOverrides {
            color: Some(ColorFilter::Adjust {
                brightness: f64::NAN,
                contrast: 1.0,
                saturation: 1.0,
                hue: 0.0,
            }),
            ..Default::default()
        };
        assert_eq!(
            overrides.resolve(),
            Err(EffectError::NonFinite("brightness"))
        );
    }

    #[test]
    fn test_indicator_fills_every_field() {
        let overrides = EffectOverrides {
            indicator: Some(IndicatorOverrides {
                position: Some(IndicatorPosition::BottomRight),
                color: Some("FF8800".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let indicator = overrides.resolve().unwrap().indicator.unwrap();
        assert_eq!(indicator.position, IndicatorPosition::BottomRight);
        assert_eq!(indicator.size, DEFAULT_INDICATOR_SIZE);
        assert_eq!(indicator.margin, DEFAULT_INDICATOR_MARGIN);
        assert_eq!(indicator.color, "#ff8800");
        assert_eq!(indicator.timing, IndicatorTiming::Permanent);
    }

    #[test]
    fn test_disabled_indicator_and_zero_texture_resolve_to_none() {
        let overrides = EffectOverrides {
            texture: Some(TextureOverlay {
                kind: TextureKind::Vhs,
                intensity: 0,
            }),
            indicator: Some(IndicatorOverrides {
                enabled: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = overrides.resolve().unwrap();
        assert!(config.texture.is_none());
        assert!(config.indicator.is_none());
    }

    #[test]
    fn test_invalid_indicator_color() {
        let overrides = EffectOverrides {
            indicator: Some(IndicatorOverrides {
                color: Some("red".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            overrides.resolve(),
            Err(EffectError::InvalidColor(_))
        ));
    }

    #[test]
    fn test_target_dimensions_follow_aspect_ratio() {
        let config = |aspect_ratio, resolution| EffectConfig {
            aspect_ratio,
            resolution,
            ..Default::default()
        };
        assert_eq!(
            config(AspectRatio::PORTRAIT, Resolution::FullHd1080).target_dimensions(),
            Dimensions::new(1080, 1920)
        );
        assert_eq!(
            config(AspectRatio::LANDSCAPE, Resolution::Hd720).target_dimensions(),
            Dimensions::new(1280, 720)
        );
        assert_eq!(
            config(AspectRatio::SQUARE, Resolution::Hd720).target_dimensions(),
            Dimensions::new(720, 720)
        );
        assert_eq!(
            config(AspectRatio::FEED_PORTRAIT, Resolution::FullHd1080).target_dimensions(),
            Dimensions::new(1080, 1350)
        );
    }

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::PORTRAIT);
        assert!("9x16".parse::<AspectRatio>().is_err());
        assert_eq!(
            "0:16".parse::<AspectRatio>(),
            Err(AspectRatioParseError::ZeroValue)
        );
    }

    #[test]
    fn test_overrides_deserialize_from_json() {
        let json = r#"{
            "mirror": true,
            "color": {"type": "preset", "preset": "sepia"},
            "texture": {"kind": "film_grain"},
            "indicator": {"position": "top-right", "timing": {"mode": "temporal", "seconds": 2.0}},
            "aspect_ratio": "1:1",
            "resolution": "1080p"
        }"#;
        let config = serde_json::from_str::<EffectOverrides>(json)
            .unwrap()
            .resolve()
            .unwrap();
        assert!(config.mirror);
        assert_eq!(
            config.color,
            ColorFilter::Preset {
                preset: ColorPreset::Sepia
            }
        );
        assert_eq!(config.texture.as_ref().unwrap().intensity, 50);
        assert_eq!(
            config.indicator.as_ref().unwrap().timing,
            IndicatorTiming::Temporal { seconds: 2.0 }
        );
        assert_eq!(config.target_dimensions(), Dimensions::new(1080, 1080));
    }

    #[test]
    fn test_extreme_aspect_ratio_is_rejected() {
        let overrides: EffectOverrides =
            serde_json::from_str(r#"{ "aspect_ratio": "1:4294967295" }"#).unwrap();
        assert!(matches!(
            overrides.resolve(),
            Err(EffectError::FrameTooLarge { width: 720, .. })
        ));

        let wide = EffectOverrides {
            aspect_ratio: Some(AspectRatio::new(u32::MAX, 1)),
            ..Default::default()
        };
        assert!(matches!(wide.resolve(), Err(EffectError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_tall_but_bounded_aspect_ratio_resolves() {
        let overrides = EffectOverrides {
            aspect_ratio: Some(AspectRatio::new(1, 8)),
            ..Default::default()
        };
        let config = overrides.resolve().unwrap();
        assert_eq!(config.target_dimensions(), Dimensions::new(720, 5760));
    }

    #[test]
    fn test_oversized_indicator_is_rejected() {
        let overrides: EffectOverrides =
            serde_json::from_str(r#"{ "indicator": { "margin": 4294967295 } }"#).unwrap();
        assert!(matches!(
            overrides.resolve(),
            Err(EffectError::IndicatorTooLarge { field: "margin", .. })
        ));

        let overrides = EffectOverrides {
            indicator: Some(IndicatorOverrides {
                size: Some(MAX_FRAME_SIDE + 1),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            overrides.resolve(),
            Err(EffectError::IndicatorTooLarge { field: "size", .. })
        ));
    }
}
