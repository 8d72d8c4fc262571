use std::fmt;

use serde::Serialize;

use super::error::{EngineError, EngineResult};

/// One operation the media engine applies to a file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterStep {
    StripMetadata,
    /// Centered crop, expressed as percentages of the source frame.
    Crop { width_pct: f64, height_pct: f64 },
    Saturation { factor: f64 },
    Scale { width_factor: f64, height_factor: f64 },
    /// Additive, in the engine's `[-1, 1]` range.
    Brightness { delta: f64 },
    /// Multiplies presentation timestamps; below 1 speeds the video up.
    TimeScale { factor: f64 },
}

impl FilterStep {
    pub fn label(&self) -> &'static str {
        match self {
            FilterStep::StripMetadata => "strip-metadata",
            FilterStep::Crop { .. } => "crop",
            FilterStep::Saturation { .. } => "saturation",
            FilterStep::Scale { .. } => "scale",
            FilterStep::Brightness { .. } => "brightness",
            FilterStep::TimeScale { .. } => "time-scale",
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        match *self {
            FilterStep::StripMetadata => Ok(()),
            FilterStep::Crop {
                width_pct,
                height_pct,
            } => {
                check_range("crop width", width_pct, 0.0, 100.0, false)?;
                check_range("crop height", height_pct, 0.0, 100.0, false)
            }
            FilterStep::Saturation { factor } => check_range("saturation", factor, 0.0, 3.0, false),
            FilterStep::Scale {
                width_factor,
                height_factor,
            } => {
                check_positive("scale width", width_factor)?;
                check_positive("scale height", height_factor)
            }
            FilterStep::Brightness { delta } => check_range("brightness", delta, -1.0, 1.0, true),
            FilterStep::TimeScale { factor } => check_range("time-scale", factor, 0.5, 2.0, true),
        }
    }

    pub fn video_filter(&self) -> Option<String> {
        match *self {
            FilterStep::StripMetadata => None,
            FilterStep::Crop {
                width_pct,
                height_pct,
            } => Some(format!(
                "crop=iw*{}:ih*{}",
                width_pct / 100.0,
                height_pct / 100.0
            )),
            FilterStep::Saturation { factor } => Some(format!("eq=saturation={factor}")),
            // libx264 rejects odd frame dimensions
            FilterStep::Scale {
                width_factor,
                height_factor,
            } => Some(format!(
                "scale=trunc(iw*{width_factor}/2)*2:trunc(ih*{height_factor}/2)*2"
            )),
            FilterStep::Brightness { delta } => Some(format!("eq=brightness={delta}")),
            FilterStep::TimeScale { factor } => Some(format!("setpts={factor}*PTS")),
        }
    }

    pub fn audio_filter(&self) -> Option<String> {
        match *self {
            FilterStep::TimeScale { factor } => Some(format!("atempo={:.6}", 1.0 / factor)),
            _ => None,
        }
    }
}

impl fmt::Display for FilterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStep::StripMetadata => write!(f, "strip-metadata"),
            FilterStep::Crop {
                width_pct,
                height_pct,
            } => write!(f, "crop({width_pct}%, {height_pct}%)"),
            FilterStep::Saturation { factor } => write!(f, "saturation({factor})"),
            FilterStep::Scale {
                width_factor,
                height_factor,
            } => write!(f, "scale({width_factor}, {height_factor})"),
            FilterStep::Brightness { delta } => write!(f, "brightness({delta})"),
            FilterStep::TimeScale { factor } => write!(f, "time-scale({factor})"),
        }
    }
}

fn check_positive(name: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidFilter(format!(
            "{name} factor {value} must be a positive number"
        )))
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64, min_inclusive: bool) -> EngineResult<()> {
    let above_min = if min_inclusive { value >= min } else { value > min };
    if value.is_finite() && above_min && value <= max {
        Ok(())
    } else {
        let open = if min_inclusive { '[' } else { '(' };
        Err(EngineError::InvalidFilter(format!(
            "{name} value {value} outside {open}{min}, {max}]"
        )))
    }
}

/// Engine arguments derived from an ordered list of filter steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    pub video: Vec<String>,
    pub audio: Vec<String>,
    pub strip_metadata: bool,
}

impl FilterChain {
    pub fn build(steps: &[FilterStep]) -> EngineResult<Self> {
        if steps.is_empty() {
            return Err(EngineError::InvalidFilter(
                "at least one filter step is required".to_string(),
            ));
        }
        let mut chain = FilterChain::default();
        for step in steps {
            step.validate()?;
            if matches!(step, FilterStep::StripMetadata) {
                chain.strip_metadata = true;
            }
            chain.video.extend(step.video_filter());
            chain.audio.extend(step.audio_filter());
        }
        Ok(chain)
    }

    pub fn video_graph(&self) -> Option<String> {
        (!self.video.is_empty()).then(|| self.video.join(","))
    }

    pub fn audio_graph(&self) -> Option<String> {
        (!self.audio.is_empty()).then(|| self.audio.join(","))
    }
}
