//! Execution viewport settings
//!
//! Width and height are always kept within `[MIN_DIMENSION, MAX_DIMENSION]`
//! and the preset always agrees with the dimensions. Ingested JSON is
//! clamped; field-level edits outside the bounds are rejected.

use serde::{Deserialize, Serialize};

use crate::constants::viewport::{DESKTOP, MAX_DIMENSION, MIN_DIMENSION, MOBILE};
use crate::error::{Result, WorkflowSyncError};

/// Named viewport size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewportPreset {
    Desktop,
    Mobile,
    Custom,
}

impl ViewportPreset {
    /// Preset matching the given dimensions exactly, `Custom` otherwise
    pub fn detect(width: u32, height: u32) -> Self {
        match (width, height) {
            DESKTOP => Self::Desktop,
            MOBILE => Self::Mobile,
            _ => Self::Custom,
        }
    }

    /// Fixed dimensions of a known preset
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Desktop => Some(DESKTOP),
            Self::Mobile => Some(MOBILE),
            Self::Custom => None,
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "desktop" => Some(Self::Desktop),
            "mobile" => Some(Self::Mobile),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Browser viewport used when the workflow executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ViewportWire")]
pub struct ViewportSettings {
    width: u32,
    height: u32,
    preset: ViewportPreset,
}

impl ViewportSettings {
    /// Clamp both dimensions into range and derive the preset
    pub fn clamped(width: i64, height: i64) -> Self {
        let width = clamp_dimension(width);
        let height = clamp_dimension(height);
        Self {
            width,
            height,
            preset: ViewportPreset::detect(width, height),
        }
    }

    /// Build from dimensions plus a caller-supplied preset.
    ///
    /// The supplied preset is kept only when it names a known preset whose
    /// dimensions match; otherwise the preset is recomputed.
    pub fn with_preset(width: i64, height: i64, preset: ViewportPreset) -> Self {
        let settings = Self::clamped(width, height);
        if preset.dimensions() == Some((settings.width, settings.height)) {
            return Self { preset, ..settings };
        }
        if preset != settings.preset {
            log::debug!(
                "Viewport preset {:?} does not match {}x{}, using {:?}",
                preset,
                settings.width,
                settings.height,
                settings.preset
            );
        }
        settings
    }

    /// Viewport for a known preset
    pub fn from_preset(preset: ViewportPreset) -> Option<Self> {
        let (width, height) = preset.dimensions()?;
        Some(Self {
            width,
            height,
            preset,
        })
    }

    /// Field-level edit. Out-of-range input is rejected and nothing changes.
    pub fn set_dimensions(&mut self, width: u32, height: u32) -> Result<()> {
        check_dimension("width", width)?;
        check_dimension("height", height)?;
        self.width = width;
        self.height = height;
        self.preset = ViewportPreset::detect(width, height);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn preset(&self) -> ViewportPreset {
        self.preset
    }
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            width: DESKTOP.0,
            height: DESKTOP.1,
            preset: ViewportPreset::Desktop,
        }
    }
}

/// Lenient wire shape; converted through the clamping constructor
#[derive(Deserialize)]
struct ViewportWire {
    width: f64,
    height: f64,
    #[serde(default)]
    preset: Option<String>,
}

impl From<ViewportWire> for ViewportSettings {
    fn from(wire: ViewportWire) -> Self {
        let width = wire.width.round() as i64;
        let height = wire.height.round() as i64;
        match wire.preset.as_deref().and_then(ViewportPreset::parse) {
            Some(preset) => Self::with_preset(width, height, preset),
            None => Self::clamped(width, height),
        }
    }
}

fn clamp_dimension(value: i64) -> u32 {
    value.clamp(MIN_DIMENSION as i64, MAX_DIMENSION as i64) as u32
}

fn check_dimension(field: &str, value: u32) -> Result<()> {
    if (MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
        Ok(())
    } else {
        Err(WorkflowSyncError::Range {
            field: field.to_string(),
            value,
            min: MIN_DIMENSION,
            max: MAX_DIMENSION,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clamps_out_of_range_dimensions() {
        let viewport = ViewportSettings::clamped(50, 20_000);
        assert_eq!(viewport.width(), 200);
        assert_eq!(viewport.height(), 10_000);
        assert_eq!(viewport.preset(), ViewportPreset::Custom);
    }

    #[test]
    fn test_preset_detection() {
        assert_eq!(ViewportSettings::clamped(1920, 1080).preset(), ViewportPreset::Desktop);
        assert_eq!(ViewportSettings::clamped(390, 844).preset(), ViewportPreset::Mobile);
        assert_eq!(ViewportSettings::clamped(1280, 720).preset(), ViewportPreset::Custom);
        assert_eq!(ViewportSettings::clamped(844, 390).preset(), ViewportPreset::Custom);
    }

    #[test]
    fn test_mismatched_preset_is_recomputed() {
        let viewport = ViewportSettings::with_preset(1280, 720, ViewportPreset::Desktop);
        assert_eq!(viewport.preset(), ViewportPreset::Custom);

        let viewport = ViewportSettings::with_preset(390, 844, ViewportPreset::Mobile);
        assert_eq!(viewport.preset(), ViewportPreset::Mobile);
    }

    #[test]
    fn test_deserialize_clamps_and_recomputes() {
        let viewport: ViewportSettings =
            serde_json::from_value(json!({"width": 50, "height": 20000, "preset": "desktop"})).unwrap();
        assert_eq!((viewport.width(), viewport.height()), (200, 10_000));
        assert_eq!(viewport.preset(), ViewportPreset::Custom);

        let viewport: ViewportSettings =
            serde_json::from_value(json!({"width": 1920, "height": 1080})).unwrap();
        assert_eq!(viewport.preset(), ViewportPreset::Desktop);

        let viewport: ViewportSettings =
            serde_json::from_value(json!({"width": 390, "height": 844, "preset": "tablet"})).unwrap();
        assert_eq!(viewport.preset(), ViewportPreset::Mobile);
    }

    #[test]
    fn test_serialize_shape() {
        let value = serde_json::to_value(ViewportSettings::clamped(390, 844)).unwrap();
        assert_eq!(value, json!({"width": 390, "height": 844, "preset": "mobile"}));
    }

    #[test]
    fn test_set_dimensions_rejects_out_of_range() {
        let mut viewport = ViewportSettings::default();
        let err = viewport.set_dimensions(150, 800).unwrap_err();
        assert!(matches!(err, WorkflowSyncError::Range { ref field, value: 150, .. } if field == "width"));
        assert_eq!(viewport, ViewportSettings::default());

        let err = viewport.set_dimensions(800, 10_001).unwrap_err();
        assert!(matches!(err, WorkflowSyncError::Range { ref field, .. } if field == "height"));
        assert_eq!(viewport, ViewportSettings::default());

        viewport.set_dimensions(390, 844).unwrap();
        assert_eq!(viewport.preset(), ViewportPreset::Mobile);
    }

    #[test]
    fn test_from_preset() {
        let viewport = ViewportSettings::from_preset(ViewportPreset::Mobile).unwrap();
        assert_eq!((viewport.width(), viewport.height()), (390, 844));
        assert!(ViewportSettings::from_preset(ViewportPreset::Custom).is_none());
    }
}
