//! Clip distribution planning.
//!
//! Decides how many clips a source yields and where each one starts. Pure and
//! deterministic: the same duration and request always give the same windows.

use thiserror::Error;

use storyclip_models::{
    ClipCount, ClipKind, ClipWindow, DistributionRequest, MAX_CLIPS, MAX_CLIP_DURATION_SECS,
};

/// Slack for floating point comparisons against the source end.
const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("{0}")]
    InvalidSource(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InsufficientDuration(String),
}

fn floor_ms(seconds: f64) -> f64 {
    (seconds * 1000.0).floor() / 1000.0
}

/// Plan clip windows for a source of `source_duration` seconds.
pub fn plan(source_duration: f64, request: &DistributionRequest) -> Result<Vec<ClipWindow>, PlanError> {
    if !source_duration.is_finite() || source_duration <= 0.0 {
        return Err(PlanError::InvalidSource(format!(
            "source duration must be positive, got {}",
            source_duration
        )));
    }

    let clip = request.clip_duration_seconds;
    if !clip.is_finite() || clip <= 0.0 || clip > MAX_CLIP_DURATION_SECS {
        return Err(PlanError::InvalidRequest(format!(
            "clip duration must be in (0, {}] seconds, got {}",
            MAX_CLIP_DURATION_SECS, clip
        )));
    }

    let offset = request.start_offset_seconds;
    if !offset.is_finite() || offset < 0.0 {
        return Err(PlanError::InvalidRequest(format!(
            "start offset must be a non-negative number, got {}",
            offset
        )));
    }

    if request.clip_count == ClipCount::Exact(0) {
        return Err(PlanError::InvalidRequest(
            "clip count must be at least 1".to_string(),
        ));
    }

    if offset >= source_duration && !request.allow_looping {
        return Err(PlanError::InsufficientDuration(format!(
            "start offset {:.3}s is past the end of a {:.3}s source",
            offset, source_duration
        )));
    }

    // A looped source always provides at least one full clip of footage
    let mut available = source_duration - offset;
    if request.allow_looping {
        available = available.max(clip);
    }

    let durations = match request.clip_count {
        ClipCount::Auto => auto_durations(available, clip),
        ClipCount::Exact(n) => explicit_durations(available, clip, n),
    };

    let mut windows = Vec::with_capacity(durations.len());
    let mut cursor = offset;
    for (i, (duration, kind)) in durations.into_iter().enumerate() {
        let index = i as u32 + 1;
        windows.push(ClipWindow::new(index, cursor, duration, kind));
        cursor += duration;
    }

    if request.clip_count == ClipCount::Auto {
        shift_final_window(&mut windows, source_duration, offset);
    }

    for window in &mut windows {
        fit_window(window, source_duration, request.allow_looping)?;
    }

    Ok(windows)
}

/// Nominal-duration windows covering the available footage.
fn auto_durations(available: f64, clip: f64) -> Vec<(f64, ClipKind)> {
    let count = ((available / clip - EPSILON).ceil().max(1.0) as u32).min(MAX_CLIPS);
    vec![(clip, ClipKind::Standard); count as usize]
}

/// `max(1, count - 2)` standard windows; the rest of the footage is split
/// evenly over the remaining extended windows.
fn explicit_durations(available: f64, clip: f64, requested: u32) -> Vec<(f64, ClipKind)> {
    let mut count = requested.min(MAX_CLIPS);
    if f64::from(count) * clip > available + EPSILON {
        let fits = (available / clip - EPSILON).ceil().max(1.0) as u32;
        count = count.min(fits);
    }

    let standard = count.saturating_sub(2).max(1);
    let extended = count - standard;

    let mut durations = vec![(clip, ClipKind::Standard); standard as usize];
    if extended > 0 {
        let remaining = (available - f64::from(standard) * clip).max(0.0);
        let each = floor_ms((remaining / f64::from(extended)).min(MAX_CLIP_DURATION_SECS));
        if each > 0.0 {
            durations.extend(std::iter::repeat((each, ClipKind::Extended)).take(extended as usize));
        }
    }
    durations
}

/// Pull an overrunning last window back so it ends at the source end.
fn shift_final_window(windows: &mut [ClipWindow], source_duration: f64, offset: f64) {
    if let Some(last) = windows.last_mut() {
        if last.end_offset() > source_duration + EPSILON {
            last.start_offset = (source_duration - last.duration).max(offset);
        }
    }
}

fn fit_window(window: &mut ClipWindow, source_duration: f64, allow_looping: bool) -> Result<(), PlanError> {
    if window.end_offset() <= source_duration + EPSILON {
        return Ok(());
    }

    if !allow_looping {
        return Err(PlanError::InsufficientDuration(format!(
            "clip {} needs {:.3}s-{:.3}s but the source is only {:.3}s long",
            window.index,
            window.start_offset,
            window.end_offset(),
            source_duration
        )));
    }

    let start = window.start_offset % source_duration;
    let passes = ((start + window.duration - EPSILON) / source_duration).ceil().max(1.0);
    window.start_offset = start;
    window.loops = passes as u32 - 1;
    Ok(())
}
