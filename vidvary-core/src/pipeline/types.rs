use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::FilterStep;

const CROP_SATURATION: [FilterStep; 2] = [
    FilterStep::Crop {
        width_pct: 100.0,
        height_pct: 90.0,
    },
    FilterStep::Saturation { factor: 1.1 },
];

const SCALE_BRIGHTNESS: [FilterStep; 2] = [
    FilterStep::Scale {
        width_factor: 0.95,
        height_factor: 0.95,
    },
    FilterStep::Brightness { delta: 0.07 },
];

const TIME_SHIFT: [FilterStep; 1] = [FilterStep::TimeScale { factor: 0.97 }];

/// Secondary transformation applied between metadata strip and the
/// saturation boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    CropSaturation,
    ScaleBrightness,
    TimeShift,
}

impl Preset {
    pub const ALL: [Preset; 3] = [
        Preset::CropSaturation,
        Preset::ScaleBrightness,
        Preset::TimeShift,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.code() == code)
    }

    pub fn code(self) -> u8 {
        match self {
            Preset::CropSaturation => 1,
            Preset::ScaleBrightness => 2,
            Preset::TimeShift => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::CropSaturation => "crop-saturation",
            Preset::ScaleBrightness => "scale-brightness",
            Preset::TimeShift => "time-shift",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Preset::CropSaturation => "slight crop and saturation",
            Preset::ScaleBrightness => "resize and brightness adjustment",
            Preset::TimeShift => "time shift",
        }
    }

    pub fn steps(self) -> &'static [FilterStep] {
        match self {
            Preset::CropSaturation => &CROP_SATURATION,
            Preset::ScaleBrightness => &SCALE_BRIGHTNESS,
            Preset::TimeShift => &TIME_SHIFT,
        }
    }

    pub fn output_file_name(self) -> String {
        format!("output_video_{}.mp4", self.code())
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.name())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantOutput {
    pub preset: Option<Preset>,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub completed_at: DateTime<Utc>,
}

impl VariantOutput {
    pub fn new(preset: Option<Preset>, path: PathBuf, size_bytes: u64, sha256: String) -> Self {
        Self {
            preset,
            path,
            size_bytes,
            sha256,
            completed_at: Utc::now(),
        }
    }

    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }
}
