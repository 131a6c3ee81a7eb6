//! Conversion settings.

use serde::{Deserialize, Serialize};

/// Default output frame rate.
pub const DEFAULT_FPS: f64 = 15.0;
/// Default character aspect ratio correction.
pub const DEFAULT_ASPECT_RATIO: f64 = 2.0;
/// Default black-clip threshold.
pub const DEFAULT_BLACK_CLIP_THRESHOLD: f64 = 10.0;
/// Default motion-filter strength (disabled).
pub const DEFAULT_MOTION_FILTER_STRENGTH: f64 = 0.0;

/// Numeric settings forwarded to the conversion tool.
///
/// Values arrive as untrusted form fields. Anything missing, unparsable,
/// non-finite or out of range falls back to its default instead of failing
/// the request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSettings {
    /// Output frames per second (> 0)
    pub fps: f64,
    /// Aspect ratio correction (> 0)
    pub aspect_ratio: f64,
    /// Black-clip threshold (>= 0)
    pub black_clip_threshold: f64,
    /// Motion-filter strength (>= 0)
    pub motion_filter_strength: f64,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            black_clip_threshold: DEFAULT_BLACK_CLIP_THRESHOLD,
            motion_filter_strength: DEFAULT_MOTION_FILTER_STRENGTH,
        }
    }
}

impl ConversionSettings {
    /// Build settings from raw form values (`fps`, `aspect`, `threshold`, `motion`).
    pub fn from_form(
        fps: Option<&str>,
        aspect: Option<&str>,
        threshold: Option<&str>,
        motion: Option<&str>,
    ) -> Self {
        Self {
            fps: parse_positive(fps).unwrap_or(DEFAULT_FPS),
            aspect_ratio: parse_positive(aspect).unwrap_or(DEFAULT_ASPECT_RATIO),
            black_clip_threshold: parse_non_negative(threshold)
                .unwrap_or(DEFAULT_BLACK_CLIP_THRESHOLD),
            motion_filter_strength: parse_non_negative(motion)
                .unwrap_or(DEFAULT_MOTION_FILTER_STRENGTH),
        }
    }

    /// Command-line rendering of the frame rate.
    pub fn fps_arg(&self) -> String {
        self.fps.to_string()
    }

    /// Command-line rendering of the aspect ratio.
    pub fn aspect_arg(&self) -> String {
        self.aspect_ratio.to_string()
    }

    /// Command-line rendering of the black-clip threshold.
    pub fn threshold_arg(&self) -> String {
        self.black_clip_threshold.to_string()
    }

    /// Command-line rendering of the motion-filter strength.
    pub fn motion_arg(&self) -> String {
        self.motion_filter_strength.to_string()
    }
}

fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_positive(raw: Option<&str>) -> Option<f64> {
    parse_number(raw).filter(|v| *v > 0.0)
}

fn parse_non_negative(raw: Option<&str>) -> Option<f64> {
    parse_number(raw).filter(|v| *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let settings = ConversionSettings::from_form(None, None, None, None);
        assert_eq!(settings, ConversionSettings::default());
    }

    #[test]
    fn test_parses_valid_values() {
        let settings =
            ConversionSettings::from_form(Some("24"), Some("1.5"), Some("0"), Some(" 3 "));
        assert_eq!(settings.fps, 24.0);
        assert_eq!(settings.aspect_ratio, 1.5);
        assert_eq!(settings.black_clip_threshold, 0.0);
        assert_eq!(settings.motion_filter_strength, 3.0);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let settings = ConversionSettings::from_form(
            Some("abc"),
            Some("-2"),
            Some("NaN"),
            Some("-0.5"),
        );
        assert_eq!(settings, ConversionSettings::default());

        let zero_fps = ConversionSettings::from_form(Some("0"), Some("inf"), None, None);
        assert_eq!(zero_fps.fps, DEFAULT_FPS);
        assert_eq!(zero_fps.aspect_ratio, DEFAULT_ASPECT_RATIO);
    }

    #[test]
    fn test_argument_rendering() {
        let settings = ConversionSettings::default();
        assert_eq!(settings.fps_arg(), "15");
        assert_eq!(settings.aspect_arg(), "2");
        assert_eq!(settings.threshold_arg(), "10");
        assert_eq!(settings.motion_arg(), "0");
    }
}
