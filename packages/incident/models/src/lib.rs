#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident, address and category types.
//!
//! These mirror the records served by the incident tracking backend. The
//! map engine treats them as immutable values for the duration of one
//! rendering pass; coordinates are kept raw (number, numeric string or
//! missing) and validated by the engine before use.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Backend identifier of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub i64);

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for IncidentId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Incident category, derived from the `type.slug` reference.
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
pub enum IncidentCategory {
    /// Unplanned incident (accident, failure).
    Incident,
    /// Planned works.
    Planned,
    /// Seasonal works.
    Seasonal,
    /// Anything else, including a missing or unrecognized slug.
    Other,
}

impl IncidentCategory {
    /// Maps a raw slug to a category. Unknown slugs become [`Self::Other`].
    #[must_use]
    pub fn from_slug(slug: Option<&str>) -> Self {
        slug.and_then(|s| s.parse().ok()).unwrap_or(Self::Other)
    }
}

/// A plain `{ id, name }` reference (resource type, status, city).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    /// Backend primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
}

/// Reference to the incident type, carrying the category slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentTypeRef {
    /// Backend primary key.
    pub id: i64,
    /// Display name (e.g. "Accident").
    pub name: String,
    /// Category slug: `incident`, `planned`, `seasonal` or something else.
    #[serde(default)]
    pub slug: Option<String>,
}

/// A street within the city/street hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetRef {
    /// Backend primary key.
    pub id: i64,
    /// Street name.
    pub name: String,
    /// City the street belongs to.
    #[serde(default)]
    pub city: Option<NamedRef>,
}

/// A coordinate as delivered by the backend: a JSON number or a string.
///
/// Strings are not guaranteed to be numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    /// JSON number.
    Number(f64),
    /// JSON string, possibly numeric.
    Text(String),
}

impl From<f64> for RawCoordinate {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawCoordinate {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One address touched by an incident.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// Latitude. `None` when missing or `null`.
    #[serde(default)]
    pub latitude: Option<RawCoordinate>,
    /// Longitude. `None` when missing or `null`.
    #[serde(default)]
    pub longitude: Option<RawCoordinate>,
    /// Street (with its city).
    #[serde(default)]
    pub street: Option<StreetRef>,
    /// House number.
    #[serde(default)]
    pub house_number: Option<String>,
    /// Building qualifier.
    #[serde(default)]
    pub building: Option<String>,
    /// Structure qualifier.
    #[serde(default)]
    pub structure: Option<String>,
    /// Literature (letter) qualifier.
    #[serde(default)]
    pub literature: Option<String>,
}

impl Address {
    /// Human-readable address line, e.g. `"Voronezh, Lenina St, 5, bldg. 2, lit. A"`.
    ///
    /// Empty components are skipped. Returns an empty string when nothing
    /// is known about the address.
    #[must_use]
    pub fn display_line(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(street) = &self.street {
            if let Some(city) = &street.city {
                push_non_empty(&mut parts, &city.name, "");
            }
            push_non_empty(&mut parts, &street.name, "");
        }
        if let Some(house) = &self.house_number {
            push_non_empty(&mut parts, house, "");
        }
        if let Some(building) = &self.building {
            push_non_empty(&mut parts, building, "bldg. ");
        }
        if let Some(structure) = &self.structure {
            push_non_empty(&mut parts, structure, "str. ");
        }
        if let Some(literature) = &self.literature {
            push_non_empty(&mut parts, literature, "lit. ");
        }

        parts.join(", ")
    }
}

fn push_non_empty(parts: &mut Vec<String>, value: &str, prefix: &str) {
    let value = value.trim();
    if !value.is_empty() {
        parts.push(format!("{prefix}{value}"));
    }
}

/// An incident, outage or works record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Backend identifier.
    pub id: IncidentId,
    /// Short title.
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Incident type reference (carries the category slug).
    #[serde(rename = "type", default)]
    pub kind: Option<IncidentTypeRef>,
    /// Affected resource type (water, heating, power...).
    #[serde(default)]
    pub resource_type: Option<NamedRef>,
    /// Workflow status.
    #[serde(default)]
    pub status: Option<NamedRef>,
    /// Whether the incident originated from a citizen complaint.
    #[serde(default)]
    pub is_complaint: bool,
    /// Affected addresses, in backend order.
    #[serde(default)]
    pub addresses: Vec<Address>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Category resolved from the type slug.
    #[must_use]
    pub fn category(&self) -> IncidentCategory {
        IncidentCategory::from_slug(self.kind.as_ref().and_then(|k| k.slug.as_deref()))
    }

    /// Status name, if any.
    #[must_use]
    pub fn status_name(&self) -> Option<&str> {
        self.status.as_ref().map(|s| s.name.as_str())
    }
}
