//! Marker and cluster presets.
//!
//! A location marker takes the preset of the first incident in its bucket
//! under [`StylePolicy::FirstInList`], or the most important preset under
//! [`StylePolicy::Severity`]. Clusters always use the priority scan, so a
//! cluster holding one real incident is never shown as planned or seasonal
//! works.

use std::collections::BTreeSet;

use incident_map_incident_models::{Address, Incident};
use incident_map_map_models::{MarkerPreset, StylePolicy};

use crate::index::LocationBucket;

/// Preset and tooltip for one location marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerStyle {
    /// Icon/color preset.
    pub preset: MarkerPreset,
    /// Incident title for a single incident, `"N incidents"` otherwise.
    pub tooltip: String,
}

/// Preset of a single incident.
#[must_use]
pub fn incident_preset(incident: &Incident) -> MarkerPreset {
    MarkerPreset::for_category(incident.category())
}

/// Picks the preset and tooltip of a location marker.
#[must_use]
pub fn resolve_marker_style(bucket: &LocationBucket, policy: StylePolicy) -> MarkerStyle {
    let preset = match policy {
        StylePolicy::FirstInList => bucket.first().map_or(MarkerPreset::Blue, incident_preset),
        StylePolicy::Severity => {
            resolve_cluster_preset(bucket.incidents().iter().map(incident_preset))
        }
    };

    let tooltip = match bucket.incidents() {
        [only] => only.title.clone(),
        incidents => format!("{} incidents", incidents.len()),
    };

    MarkerStyle { preset, tooltip }
}

/// Aggregate preset of a cluster: red if any member is red, else orange,
/// else green, else blue.
#[must_use]
pub fn resolve_cluster_preset(presets: impl IntoIterator<Item = MarkerPreset>) -> MarkerPreset {
    let present: BTreeSet<MarkerPreset> = presets.into_iter().collect();

    MarkerPreset::PRIORITY
        .into_iter()
        .find(|preset| present.contains(preset))
        .unwrap_or(MarkerPreset::Blue)
}

/// Callout content of a location marker: one line per incident.
#[must_use]
pub fn callout_lines(bucket: &LocationBucket) -> Vec<String> {
    bucket
        .incidents()
        .iter()
        .map(|incident| {
            let mut line = format!(
                "#{} {} [{}]",
                incident.id,
                incident.title,
                incident.category()
            );
            if let Some(status) = incident.status_name() {
                line.push_str(" (");
                line.push_str(status);
                line.push(')');
            }
            if let Some(address) = incident
                .addresses
                .iter()
                .map(Address::display_line)
                .find(|line| !line.is_empty())
            {
                line.push_str(" - ");
                line.push_str(&address);
            }
            line
        })
        .collect()
}
