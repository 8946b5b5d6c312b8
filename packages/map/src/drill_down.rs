//! Drill-down: every incident reachable from a set of markers.

use std::collections::BTreeSet;

use incident_map_incident_models::Incident;
use incident_map_map_models::BucketKey;

use crate::index::LocationIndex;

/// Unions the incident lists of the buckets behind `keys`, deduplicated by
/// incident id and ordered first-seen. Unknown keys are ignored.
#[must_use]
pub fn aggregate<'a>(
    index: &'a LocationIndex,
    keys: impl IntoIterator<Item = BucketKey>,
) -> Vec<&'a Incident> {
    let mut seen = BTreeSet::new();
    let mut incidents = Vec::new();

    for key in keys {
        let Some(bucket) = index.get(&key) else {
            log::debug!("Drill-down skipped unknown location {key}");
            continue;
        };
        for incident in bucket.incidents() {
            if seen.insert(incident.id) {
                incidents.push(incident);
            }
        }
    }

    incidents
}

/// Result of a user interacting with a marker or a cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    /// Exactly one incident: open it directly.
    Select(Box<Incident>),
    /// Several incidents: show the "incidents at this point" list.
    DrillDown(Vec<Incident>),
}

impl Interaction {
    /// Builds the interaction for an aggregated list. `None` when empty;
    /// a one-item list short-circuits to [`Self::Select`].
    #[must_use]
    pub fn from_incidents(incidents: Vec<&Incident>) -> Option<Self> {
        match incidents.as_slice() {
            [] => None,
            [only] => Some(Self::Select(Box::new((*only).clone()))),
            _ => Some(Self::DrillDown(incidents.into_iter().cloned().collect())),
        }
    }
}
