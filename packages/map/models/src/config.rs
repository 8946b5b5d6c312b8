//! Engine configuration.
//!
//! Every field has a default, so a TOML file only needs to list what it
//! overrides:
//!
//! ```toml
//! style_policy = "severity"
//!
//! [highlight]
//! pulse_ms = 2000
//! ```

use std::time::Duration;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::{StylePolicy, Viewport};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Initial viewport of a freshly mounted canvas.
    pub viewport: ViewportConfig,
    /// Clustering parameters for renderers that cluster themselves.
    pub cluster: ClusterConfig,
    /// Focus/highlight animation parameters.
    pub highlight: HighlightConfig,
    /// How multi-incident locations pick their marker preset.
    pub style_policy: StylePolicy,
}

/// Initial viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Center latitude.
    pub center_lat: f64,
    /// Center longitude.
    pub center_lng: f64,
    /// Zoom level.
    pub zoom: u8,
    /// Width in pixels.
    pub width_px: u32,
    /// Height in pixels.
    pub height_px: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            center_lat: 51.660_781,
            center_lng: 39.200_296,
            zoom: 12,
            width_px: 1280,
            height_px: 720,
        }
    }
}

impl ViewportConfig {
    /// The configured viewport.
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        Viewport {
            center: Point::new(self.center_lng, self.center_lat),
            zoom: self.zoom,
            width_px: self.width_px,
            height_px: self.height_px,
        }
    }
}

/// Clustering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Markers closer than this many screen pixels are grouped.
    pub radius_px: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { radius_px: 80.0 }
    }
}

/// Focus/highlight animation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    /// Duration of the animated recenter, in milliseconds.
    pub pan_ms: u64,
    /// Duration of the pulse, in milliseconds.
    pub pulse_ms: u64,
    /// How long the highlight marker lingers after the pulse, in milliseconds.
    pub linger_ms: u64,
    /// Pulse circle radius at the start, in metres.
    pub start_radius_m: f64,
    /// Pulse circle radius at the end, in metres.
    pub end_radius_m: f64,
    /// Initial stroke opacity.
    pub stroke_opacity: f64,
    /// Initial fill opacity.
    pub fill_opacity: f64,
    /// Stacking order of the highlight marker.
    pub marker_z_index: i32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            pan_ms: 500,
            pulse_ms: 1500,
            linger_ms: 1000,
            start_radius_m: 10.0,
            end_radius_m: 60.0,
            stroke_opacity: 0.9,
            fill_opacity: 0.4,
            marker_z_index: 1000,
        }
    }
}

impl HighlightConfig {
    /// Recenter duration.
    #[must_use]
    pub const fn pan(&self) -> Duration {
        Duration::from_millis(self.pan_ms)
    }

    /// Pulse duration.
    #[must_use]
    pub const fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }

    /// Highlight marker linger time.
    #[must_use]
    pub const fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config: MapConfig = toml::de::from_str("").unwrap();
        assert_eq!(config, MapConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config: MapConfig = toml::de::from_str(
            r#"
            style_policy = "severity"

            [highlight]
            pulse_ms = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.style_policy, StylePolicy::Severity);
        assert_eq!(config.highlight.pulse(), Duration::from_millis(2000));
        assert_eq!(config.highlight.pan(), Duration::from_millis(500));
        assert_eq!(config.viewport, ViewportConfig::default());
    }
}
