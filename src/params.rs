//! Generation parameters
//!
//! Four bounded, step-quantized sliders applied to a generation request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the four tunable sliders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParameterField {
    FaceAccuracy,
    DetailLevel,
    ColorIntensity,
    BackgroundStyle,
}

/// Inclusive range and quantization step of a slider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: u8,
    pub max: u8,
    pub step: u8,
}

impl ParameterField {
    pub const ALL: [ParameterField; 4] = [
        ParameterField::FaceAccuracy,
        ParameterField::DetailLevel,
        ParameterField::ColorIntensity,
        ParameterField::BackgroundStyle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParameterField::FaceAccuracy => "face-accuracy",
            ParameterField::DetailLevel => "detail-level",
            ParameterField::ColorIntensity => "color-intensity",
            ParameterField::BackgroundStyle => "background-style",
        }
    }

    pub fn bounds(&self) -> Bounds {
        match self {
            ParameterField::FaceAccuracy => Bounds { min: 70, max: 100, step: 5 },
            ParameterField::DetailLevel => Bounds { min: 50, max: 100, step: 5 },
            ParameterField::ColorIntensity => Bounds { min: 30, max: 100, step: 5 },
            ParameterField::BackgroundStyle => Bounds { min: 0, max: 100, step: 10 },
        }
    }
}

impl fmt::Display for ParameterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|field| field.name() == normalized)
            .ok_or_else(|| format!("unknown parameter '{}'", s))
    }
}

impl Bounds {
    /// Clamp into `[min, max]`, then snap to the nearest step (ties round up)
    pub fn quantize(&self, value: i32) -> u8 {
        let (min, max, step) = (i32::from(self.min), i32::from(self.max), i32::from(self.step));
        let clamped = value.clamp(min, max);
        let snapped = min + ((clamped - min + step / 2) / step) * step;
        // max is a multiple of step for every field, but never overshoot
        snapped.min(max) as u8
    }
}

/// Slider values for one generation request
///
/// Deserialized values pass through [`set_parameter`], so every field stays
/// within its bounds and on its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawParameterSet")]
pub struct ParameterSet {
    face_accuracy: u8,
    detail_level: u8,
    color_intensity: u8,
    background_style: u8,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            face_accuracy: 95,
            detail_level: 90,
            color_intensity: 85,
            background_style: 80,
        }
    }
}

impl ParameterSet {
    pub fn get(&self, field: ParameterField) -> u8 {
        match field {
            ParameterField::FaceAccuracy => self.face_accuracy,
            ParameterField::DetailLevel => self.detail_level,
            ParameterField::ColorIntensity => self.color_intensity,
            ParameterField::BackgroundStyle => self.background_style,
        }
    }

    pub fn face_accuracy(&self) -> u8 {
        self.face_accuracy
    }

    pub fn detail_level(&self) -> u8 {
        self.detail_level
    }

    pub fn color_intensity(&self) -> u8 {
        self.color_intensity
    }

    pub fn background_style(&self) -> u8 {
        self.background_style
    }

    /// Return a copy with `field` set to the quantized `value`
    pub fn with(self, field: ParameterField, value: i32) -> Self {
        set_parameter(&self, field, value)
    }
}

/// Unchecked slider values as they appear in config or request input
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawParameterSet {
    face_accuracy: i32,
    detail_level: i32,
    color_intensity: i32,
    background_style: i32,
}

impl Default for RawParameterSet {
    fn default() -> Self {
        let defaults = ParameterSet::default();
        Self {
            face_accuracy: defaults.face_accuracy.into(),
            detail_level: defaults.detail_level.into(),
            color_intensity: defaults.color_intensity.into(),
            background_style: defaults.background_style.into(),
        }
    }
}

impl From<RawParameterSet> for ParameterSet {
    fn from(raw: RawParameterSet) -> Self {
        ParameterSet::default()
            .with(ParameterField::FaceAccuracy, raw.face_accuracy)
            .with(ParameterField::DetailLevel, raw.detail_level)
            .with(ParameterField::ColorIntensity, raw.color_intensity)
            .with(ParameterField::BackgroundStyle, raw.background_style)
    }
}

/// Pure update: clamps and rounds `value` per the field's bounds
pub fn set_parameter(current: &ParameterSet, field: ParameterField, value: i32) -> ParameterSet {
    let quantized = field.bounds().quantize(value);
    let mut next = *current;
    match field {
        ParameterField::FaceAccuracy => next.face_accuracy = quantized,
        ParameterField::DetailLevel => next.detail_level = quantized,
        ParameterField::ColorIntensity => next.color_intensity = quantized,
        ParameterField::BackgroundStyle => next.background_style = quantized,
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let params = ParameterSet::default();
        assert_eq!(
            ParameterField::ALL.map(|f| params.get(f)),
            [95, 90, 85, 80]
        );
    }

    #[test]
    fn test_color_intensity_rounding() {
        let params = ParameterSet::default();
        assert_eq!(set_parameter(&params, ParameterField::ColorIntensity, 47).color_intensity(), 45);
        assert_eq!(set_parameter(&params, ParameterField::ColorIntensity, 48).color_intensity(), 50);
        assert_eq!(set_parameter(&params, ParameterField::ColorIntensity, 99).color_intensity(), 100);
        assert_eq!(set_parameter(&params, ParameterField::ColorIntensity, 5).color_intensity(), 30);
    }

    #[test]
    fn test_background_uses_step_ten() {
        let params = ParameterSet::default();
        assert_eq!(set_parameter(&params, ParameterField::BackgroundStyle, 44).background_style(), 40);
        assert_eq!(set_parameter(&params, ParameterField::BackgroundStyle, 45).background_style(), 50);
        assert_eq!(set_parameter(&params, ParameterField::BackgroundStyle, -20).background_style(), 0);
    }

    #[test]
    fn test_input_untouched() {
        let params = ParameterSet::default();
        let updated = set_parameter(&params, ParameterField::FaceAccuracy, 70);
        assert_eq!(params.face_accuracy(), 95);
        assert_eq!(updated.face_accuracy(), 70);
        assert_eq!(updated.detail_level(), params.detail_level());
    }

    #[test]
    fn test_field_names_parse() {
        assert_eq!("face-accuracy".parse::<ParameterField>(), Ok(ParameterField::FaceAccuracy));
        assert_eq!("Detail_Level".parse::<ParameterField>(), Ok(ParameterField::DetailLevel));
        assert!("sharpness".parse::<ParameterField>().is_err());
    }

    #[test]
    fn test_deserialize_quantizes_fields() {
        let params: ParameterSet = toml::from_str(
            "face_accuracy = 3\ndetail_level = 255\ncolor_intensity = 47\nbackground_style = 55",
        )
        .unwrap();
        assert_eq!(ParameterField::ALL.map(|f| params.get(f)), [70, 100, 45, 60]);

        let partial: ParameterSet = toml::from_str("detail_level = 62").unwrap();
        assert_eq!(ParameterField::ALL.map(|f| partial.get(f)), [95, 60, 85, 80]);
    }

    fn any_field() -> impl Strategy<Value = ParameterField> {
        prop::sample::select(ParameterField::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_quantized_values_in_bounds_and_on_step(field in any_field(), value in -1000i32..1000) {
            let updated = set_parameter(&ParameterSet::default(), field, value);
            let bounds = field.bounds();
            let stored = updated.get(field);
            prop_assert!(stored >= bounds.min && stored <= bounds.max);
            prop_assert_eq!(stored % bounds.step, 0);
        }

        #[test]
        fn prop_quantize_is_nearest_step(field in any_field(), value in 0i32..=100) {
            let bounds = field.bounds();
            let stored = i32::from(bounds.quantize(value));
            if value >= i32::from(bounds.min) {
                prop_assert!((stored - value).abs() <= i32::from(bounds.step) / 2);
            }
        }

        #[test]
        fn prop_quantize_idempotent(field in any_field(), value in -500i32..500) {
            let once = set_parameter(&ParameterSet::default(), field, value);
            let twice = set_parameter(&once, field, i32::from(once.get(field)));
            prop_assert_eq!(once, twice);
        }
    }
}
