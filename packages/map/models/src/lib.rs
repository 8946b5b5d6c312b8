#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Plain data types shared between the incident map engine and the
//! renderers that implement its ports.
//!
//! Nothing in here talks to a renderer or keeps state; see the
//! `incident_map_map` crate for the engine itself.

pub mod config;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use geo::Point;
use incident_map_incident_models::IncidentCategory;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use config::{ClusterConfig, HighlightConfig, MapConfig, ViewportConfig};

/// Number of decimal places coordinates are rounded to before bucketing.
pub const COORDINATE_PRECISION: u32 = 6;

const MICRO: f64 = 1_000_000.0;

/// Canonical key of one map location.
///
/// Coordinates are rounded to [`COORDINATE_PRECISION`] decimal places and
/// stored as integer micro-degrees, so equal coordinates always compare
/// (and print) equal. Displays as `"<lat>,<lng>"`, e.g.
/// `"51.660770,39.200280"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BucketKey {
    lat_e6: i64,
    lng_e6: i64,
}

impl BucketKey {
    /// Rounds a latitude/longitude pair (degrees) into a key.
    ///
    /// Returns `None` if either value is not finite. Out-of-range values
    /// still produce a key; renderers clamp them when projecting.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_degrees(lat: f64, lng: f64) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        Some(Self {
            lat_e6: (lat * MICRO).round() as i64,
            lng_e6: (lng * MICRO).round() as i64,
        })
    }

    /// Latitude in micro-degrees.
    #[must_use]
    pub const fn lat_e6(self) -> i64 {
        self.lat_e6
    }

    /// Longitude in micro-degrees.
    #[must_use]
    pub const fn lng_e6(self) -> i64 {
        self.lng_e6
    }

    /// Rounded latitude in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lat(self) -> f64 {
        self.lat_e6 as f64 / MICRO
    }

    /// Rounded longitude in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lng(self) -> f64 {
        self.lng_e6 as f64 / MICRO
    }

    /// The key as a point (`x` = longitude, `y` = latitude).
    #[must_use]
    pub fn point(self) -> Point<f64> {
        Point::new(self.lng(), self.lat())
    }
}

fn write_micro(f: &mut fmt::Formatter<'_>, value: i64) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    write!(f, "{sign}{}.{:06}", abs / 1_000_000, abs % 1_000_000)
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_micro(f, self.lat_e6)?;
        f.write_str(",")?;
        write_micro(f, self.lng_e6)
    }
}

/// Error returned when a string is not a valid `"<lat>,<lng>"` key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid bucket key {input:?}: expected \"<lat>,<lng>\"")]
pub struct ParseBucketKeyError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for BucketKey {
    type Err = ParseBucketKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseBucketKeyError {
            input: s.to_string(),
        };
        let (lat, lng) = s.split_once(',').ok_or_else(err)?;
        let lat: f64 = lat.trim().parse().map_err(|_| err())?;
        let lng: f64 = lng.trim().parse().map_err(|_| err())?;
        Self::from_degrees(lat, lng).ok_or_else(err)
    }
}

impl From<BucketKey> for String {
    fn from(key: BucketKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for BucketKey {
    type Error = ParseBucketKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Named icon/color style applied to a marker or a cluster.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MarkerPreset {
    /// Unplanned incidents.
    Red,
    /// Planned works.
    Orange,
    /// Seasonal works.
    Green,
    /// Everything else.
    Blue,
}

impl MarkerPreset {
    /// Presets in strict priority order, highest first.
    pub const PRIORITY: [Self; 4] = [Self::Red, Self::Orange, Self::Green, Self::Blue];

    /// Preset used for an incident category.
    #[must_use]
    pub const fn for_category(category: IncidentCategory) -> Self {
        match category {
            IncidentCategory::Incident => Self::Red,
            IncidentCategory::Planned => Self::Orange,
            IncidentCategory::Seasonal => Self::Green,
            IncidentCategory::Other => Self::Blue,
        }
    }
}

/// How a multi-incident location picks its marker preset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StylePolicy {
    /// The first incident in insertion order decides.
    #[default]
    FirstInList,
    /// The most important category present decides (same rule as clusters).
    Severity,
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// Renderer-assigned id of a placed marker.
    MarkerId
);
handle!(
    /// Renderer-assigned id of a cluster.
    ClusterId
);
handle!(
    /// Renderer-assigned id of transient geometry (circles).
    ShapeId
);
handle!(
    /// Renderer-assigned id of a registered event listener.
    ListenerId
);
handle!(
    /// Pending animation-frame request.
    FrameHandle
);
handle!(
    /// Pending one-shot timer.
    TimerHandle
);

/// What a marker stands for. Handed to the renderer at creation and
/// reported back with click events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerPayload {
    /// The marker of one location bucket.
    Bucket(BucketKey),
    /// The transient marker drawn while an incident is highlighted.
    Highlight,
}

/// Everything a renderer needs to place a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    /// Position (`x` = longitude, `y` = latitude).
    pub position: Point<f64>,
    /// Icon/color preset.
    pub preset: MarkerPreset,
    /// Hover tooltip.
    pub tooltip: String,
    /// Callout content, one line per entry.
    pub callout: Vec<String>,
    /// What the marker stands for.
    pub payload: MarkerPayload,
    /// Stacking order; higher draws on top.
    pub z_index: i32,
    /// Whether the marker participates in clustering.
    pub clustered: bool,
}

/// A filled circle drawn on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleSpec {
    /// Center (`x` = longitude, `y` = latitude).
    pub center: Point<f64>,
    /// Radius in metres.
    pub radius_m: f64,
    /// Stroke opacity in `[0, 1]`.
    pub stroke_opacity: f64,
    /// Fill opacity in `[0, 1]`.
    pub fill_opacity: f64,
    /// Color preset.
    pub preset: MarkerPreset,
}

/// The rectangle a canvas is bound to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Map center (`x` = longitude, `y` = latitude).
    pub center: Point<f64>,
    /// Zoom level.
    pub zoom: u8,
    /// Width in pixels.
    pub width_px: u32,
    /// Height in pixels.
    pub height_px: u32,
}

/// Renderer event families the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum MapEventKind {
    /// Clusters were (re)built after markers were added to the map.
    ClustersAdded,
    /// The viewport moved or zoomed.
    ViewportChanged,
    /// A marker was clicked.
    MarkerClick,
    /// A cluster was clicked.
    ClusterClick,
}

/// An event reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapEvent {
    /// Clusters were (re)built after markers were added to the map.
    ClustersAdded,
    /// The viewport moved or zoomed.
    ViewportChanged(Viewport),
    /// A marker was clicked.
    MarkerClicked(MarkerId),
    /// A cluster was clicked.
    ClusterClicked(ClusterId),
}

impl MapEvent {
    /// The listener family this event is delivered to.
    #[must_use]
    pub const fn kind(&self) -> MapEventKind {
        match self {
            Self::ClustersAdded => MapEventKind::ClustersAdded,
            Self::ViewportChanged(_) => MapEventKind::ViewportChanged,
            Self::MarkerClicked(_) => MapEventKind::MarkerClick,
            Self::ClusterClicked(_) => MapEventKind::ClusterClick,
        }
    }
}

/// A cluster as currently maintained by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    /// Renderer id.
    pub id: ClusterId,
    /// Member markers.
    pub members: Vec<MarkerId>,
}

/// Phase of the focus/highlight animation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum HighlightState {
    /// No animation running.
    #[default]
    Idle,
    /// Viewport is animating toward the target.
    Centering,
    /// Pulse circle is expanding.
    Pulsing,
    /// Pulse finished; highlight marker is about to be removed.
    Fading,
}

/// Radius and opacities of the pulse circle at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseFrame {
    /// Radius in metres.
    pub radius_m: f64,
    /// Stroke opacity.
    pub stroke_opacity: f64,
    /// Fill opacity.
    pub fill_opacity: f64,
}

impl HighlightConfig {
    /// Pulse geometry at elapsed fraction `f` (clamped to `[0, 1]`).
    ///
    /// Radius grows linearly from start to end; both opacities decay
    /// linearly to zero.
    #[must_use]
    pub fn pulse_at(&self, f: f64) -> PulseFrame {
        let f = f.clamp(0.0, 1.0);
        PulseFrame {
            radius_m: (self.end_radius_m - self.start_radius_m).mul_add(f, self.start_radius_m),
            stroke_opacity: self.stroke_opacity * (1.0 - f),
            fill_opacity: self.fill_opacity * (1.0 - f),
        }
    }

    /// Elapsed fraction of the pulse, `elapsed / pulse duration`.
    #[must_use]
    pub fn fraction(&self, elapsed: Duration) -> f64 {
        let total = self.pulse().as_secs_f64();
        if total <= 0.0 {
            return 1.0;
        }
        elapsed.as_secs_f64() / total
    }
}
