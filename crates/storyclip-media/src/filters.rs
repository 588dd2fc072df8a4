//! Filter graph construction.
//!
//! A [`FilterGraph`] is an ordered list of [`FilterDescriptor`]s with a fixed
//! stage order:
//!
//! 1. aspect-ratio normalization (exactly one)
//! 2. mirror (optional)
//! 3. colour (exactly one; `null` when no grading was requested)
//! 4. texture overlay (optional)
//! 5. indicator (optional)

use serde::Serialize;
use thiserror::Error;

use storyclip_models::{
    ColorFilter, ColorPreset, Dimensions, EffectConfig, FitMode, Indicator, IndicatorPosition,
    IndicatorStyle, IndicatorTiming, TextureKind, TextureOverlay,
};

/// Filters that change frame geometry. Only the normalization stage may use them.
const ASPECT_FILTERS: &[&str] = &["scale", "crop", "pad", "setsar", "setdar", "zoompan"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterGraphError {
    #[error("Target dimensions must be non-zero, got {0}")]
    ZeroDimensions(Dimensions),

    #[error("Colour expression contains a second aspect stage ('{0}')")]
    MultipleAspectStages(String),

    #[error("Filter graph must contain exactly one aspect stage, found {0}")]
    AspectStageCount(usize),

    #[error("Indicator of {size}px with {margin}px margin does not fit in {target}")]
    IndicatorOutOfBounds {
        size: u32,
        margin: u32,
        target: Dimensions,
    },

    #[error("Filter value '{0}' is not finite")]
    NonFinite(&'static str),
}

/// Colour stage variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColorStage {
    /// Explicit pass-through
    Identity,
    Adjust {
        brightness: f64,
        contrast: f64,
        saturation: f64,
        hue: f64,
    },
    Preset {
        preset: ColorPreset,
    },
    Custom {
        expression: String,
    },
}

/// One stage of a filter graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FilterDescriptor {
    AspectNormalize {
        width: u32,
        height: u32,
        fit: FitMode,
    },
    Mirror,
    Color(ColorStage),
    Texture {
        kind: TextureKind,
        /// Normalized intensity, 0.0 to 1.0
        strength: f64,
    },
    Indicator {
        x: u32,
        y: u32,
        size: u32,
        /// `0xRRGGBB`
        color: String,
        opacity: f64,
        style: IndicatorStyle,
        /// Visible for this many seconds from the clip start; always when `None`
        visible_for: Option<f64>,
    },
}

impl FilterDescriptor {
    pub fn is_aspect_stage(&self) -> bool {
        matches!(self, FilterDescriptor::AspectNormalize { .. })
    }

    /// FFmpeg filter text for this stage.
    pub fn to_filter(&self) -> String {
        match self {
            FilterDescriptor::AspectNormalize { width, height, fit } => match fit {
                FitMode::Pad => format!(
                    "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
                    w = width,
                    h = height
                ),
                FitMode::Crop => format!(
                    "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
                    w = width,
                    h = height
                ),
            },
            FilterDescriptor::Mirror => "hflip".to_string(),
            FilterDescriptor::Color(stage) => color_filter(stage),
            FilterDescriptor::Texture { kind, strength } => texture_filter(*kind, *strength),
            FilterDescriptor::Indicator {
                x,
                y,
                size,
                color,
                opacity,
                style,
                visible_for,
            } => {
                let thickness = match style {
                    IndicatorStyle::Badge => "fill".to_string(),
                    IndicatorStyle::Outline => (size / 10).max(2).to_string(),
                };
                let mut filter = format!(
                    "drawbox=x={}:y={}:w={}:h={}:color={}@{:.2}:t={}",
                    x, y, size, size, color, opacity, thickness
                );
                if let Some(seconds) = visible_for {
                    filter.push_str(&format!(":enable='between(t,0,{:.3})'", seconds));
                }
                filter
            }
        }
    }
}

fn color_filter(stage: &ColorStage) -> String {
    match stage {
        ColorStage::Identity => "null".to_string(),
        ColorStage::Adjust {
            brightness,
            contrast,
            saturation,
            hue,
        } => {
            let mut filter = format!(
                "eq=brightness={:.3}:contrast={:.3}:saturation={:.3}",
                brightness, contrast, saturation
            );
            if *hue != 0.0 {
                filter.push_str(&format!(",hue=h={:.1}", hue));
            }
            filter
        }
        ColorStage::Preset { preset } => match preset {
            ColorPreset::Vintage => "curves=preset=vintage".to_string(),
            ColorPreset::BlackWhite => "hue=s=0".to_string(),
            ColorPreset::Sepia => {
                "colorchannelmixer=.393:.769:.189:0:.349:.686:.168:0:.272:.534:.131".to_string()
            }
            ColorPreset::Cool => "colorbalance=rs=-0.1:bs=0.2".to_string(),
            ColorPreset::Warm => "colorbalance=rs=0.2:bs=-0.1".to_string(),
            ColorPreset::Vivid => "eq=saturation=1.4:contrast=1.1".to_string(),
        },
        ColorStage::Custom { expression } => expression.clone(),
    }
}

fn texture_filter(kind: TextureKind, strength: f64) -> String {
    let s = strength.clamp(0.0, 1.0);
    match kind {
        TextureKind::Vignette => format!("vignette=angle={:.3}", 0.3 + 0.5 * s),
        TextureKind::FilmGrain => format!("noise=alls={}:allf=t+u", (10.0 + 40.0 * s).round()),
        TextureKind::Vhs => format!(
            "noise=alls={}:allf=t+u,eq=contrast=1.1:saturation=0.9:gamma=1.1",
            (15.0 + 25.0 * s).round()
        ),
        TextureKind::Chromatic => {
            let shift = 0.02 * s;
            format!(
                "colorchannelmixer=rr=1:rg=0:rb=0:gr={s:.3}:gg=1:gb={s:.3}:br=0:bg={s:.3}:bb=1",
                s = shift
            )
        }
        TextureKind::LightLeak => format!(
            "curves=all='0/0 0.3/{:.3} 0.7/{:.3} 1/1'",
            0.1 + 0.3 * s,
            0.7 + 0.2 * s
        ),
        TextureKind::Bokeh => format!("gblur=sigma={:.1}:steps=2", 5.0 + 15.0 * s),
        TextureKind::Glitch => {
            let shift = 0.05 + 0.15 * s;
            format!(
                "noise=alls={}:allf=t+u,colorchannelmixer=rr={:.3}:rg={c:.3}:gr={c:.3}:gg={:.3}:gb={c:.3}:bg={c:.3}:bb={:.3},eq=saturation={:.3}:contrast={:.3}",
                (20.0 + 30.0 * s).round(),
                1.0 + shift,
                1.0 - shift,
                1.0 + shift,
                1.2 + 0.3 * s,
                1.1 + 0.2 * s,
                c = shift
            )
        }
    }
}

/// Ordered list of filter stages for one target frame size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterGraph {
    target: Dimensions,
    stages: Vec<FilterDescriptor>,
}

impl FilterGraph {
    pub fn target(&self) -> Dimensions {
        self.target
    }

    pub fn stages(&self) -> &[FilterDescriptor] {
        &self.stages
    }

    /// Comma-joined chain for `-vf`.
    pub fn to_filter_chain(&self) -> String {
        self.stages
            .iter()
            .map(FilterDescriptor::to_filter)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Builds filter graphs from a resolved [`EffectConfig`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterGraphBuilder;

impl FilterGraphBuilder {
    /// Build the graph for `effects` rendered at `target`.
    pub fn build(effects: &EffectConfig, target: Dimensions) -> Result<FilterGraph, FilterGraphError> {
        if target.is_empty() {
            return Err(FilterGraphError::ZeroDimensions(target));
        }

        let mut stages = vec![FilterDescriptor::AspectNormalize {
            width: target.width,
            height: target.height,
            fit: effects.fit,
        }];

        if effects.mirror {
            stages.push(FilterDescriptor::Mirror);
        }

        stages.push(FilterDescriptor::Color(color_stage(&effects.color)?));

        if let Some(texture) = effects.texture.filter(|t| t.intensity > 0) {
            stages.push(texture_stage(texture));
        }

        if let Some(indicator) = &effects.indicator {
            stages.push(indicator_stage(indicator, target)?);
        }

        let aspect_count = stages.iter().filter(|s| s.is_aspect_stage()).count();
        if aspect_count != 1 {
            return Err(FilterGraphError::AspectStageCount(aspect_count));
        }

        Ok(FilterGraph { target, stages })
    }
}

fn color_stage(color: &ColorFilter) -> Result<ColorStage, FilterGraphError> {
    Ok(match color {
        ColorFilter::None => ColorStage::Identity,
        ColorFilter::Adjust {
            brightness,
            contrast,
            saturation,
            hue,
        } => ColorStage::Adjust {
            brightness: finite("brightness", *brightness)?,
            contrast: finite("contrast", *contrast)?,
            saturation: finite("saturation", *saturation)?,
            hue: finite("hue", *hue)?,
        },
        ColorFilter::Preset { preset } => ColorStage::Preset { preset: *preset },
        ColorFilter::Custom { expression } => {
            if let Some(name) = aspect_filter_in(expression) {
                return Err(FilterGraphError::MultipleAspectStages(name));
            }
            ColorStage::Custom {
                expression: expression.clone(),
            }
        }
    })
}

/// First geometry-changing filter named in a raw expression.
fn aspect_filter_in(expression: &str) -> Option<String> {
    expression
        .split([',', ';'])
        .map(|part| {
            let part = part.trim().trim_start_matches(|c: char| c == '[' || c == ']');
            let name_end = part.find(['=', '@', '[']).unwrap_or(part.len());
            part[..name_end].trim().to_ascii_lowercase()
        })
        .find(|name| ASPECT_FILTERS.contains(&name.as_str()))
}

fn texture_stage(texture: TextureOverlay) -> FilterDescriptor {
    FilterDescriptor::Texture {
        kind: texture.kind,
        strength: texture.strength(),
    }
}

fn indicator_stage(indicator: &Indicator, target: Dimensions) -> Result<FilterDescriptor, FilterGraphError> {
    let out_of_bounds = || FilterGraphError::IndicatorOutOfBounds {
        size: indicator.size,
        margin: indicator.margin,
        target,
    };

    let (x, y) = match indicator.position {
        IndicatorPosition::Center => (
            target.width.checked_sub(indicator.size).ok_or_else(out_of_bounds)? / 2,
            target.height.checked_sub(indicator.size).ok_or_else(out_of_bounds)? / 2,
        ),
        position => {
            let footprint = indicator
                .margin
                .checked_add(indicator.size)
                .ok_or_else(out_of_bounds)?;
            let far_x = target.width.checked_sub(footprint).ok_or_else(out_of_bounds)?;
            let far_y = target.height.checked_sub(footprint).ok_or_else(out_of_bounds)?;
            if far_x < indicator.margin || far_y < indicator.margin {
                return Err(out_of_bounds());
            }
            match position {
                IndicatorPosition::TopLeft => (indicator.margin, indicator.margin),
                IndicatorPosition::TopRight => (far_x, indicator.margin),
                IndicatorPosition::BottomLeft => (indicator.margin, far_y),
                _ => (far_x, far_y),
            }
        }
    };

    let visible_for = match indicator.timing {
        IndicatorTiming::Permanent => None,
        IndicatorTiming::Temporal { seconds } => {
            let seconds = finite("indicator duration", seconds)?;
            if seconds <= 0.0 {
                return Err(FilterGraphError::NonFinite("indicator duration"));
            }
            Some(seconds)
        }
    };

    Ok(FilterDescriptor::Indicator {
        x,
        y,
        size: indicator.size,
        color: format!("0x{}", indicator.color.trim_start_matches('#')),
        opacity: finite("opacity", indicator.opacity)?.clamp(0.0, 1.0),
        style: indicator.style,
        visible_for,
    })
}

fn finite(name: &'static str, value: f64) -> Result<f64, FilterGraphError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FilterGraphError::NonFinite(name))
    }
}
