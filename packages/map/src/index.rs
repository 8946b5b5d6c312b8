//! Location index: incidents grouped by rounded coordinates.
//!
//! Built in one pass from the current incident list and never mutated
//! afterwards. A new incident list means a new index; callers swap the
//! whole value, so a half-built index is never visible.

use std::collections::{BTreeMap, BTreeSet};

use incident_map_incident_models::{Incident, IncidentId};
use incident_map_map_models::BucketKey;

use crate::normalize::address_key;

/// The incidents observed at one rounded point, in insertion order and
/// without duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationBucket {
    key: BucketKey,
    incidents: Vec<Incident>,
}

impl LocationBucket {
    /// The bucket key.
    #[must_use]
    pub const fn key(&self) -> BucketKey {
        self.key
    }

    /// Incidents at this point, first-seen first.
    #[must_use]
    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// The insertion-order winner.
    #[must_use]
    pub fn first(&self) -> Option<&Incident> {
        self.incidents.first()
    }

    /// Number of incidents at this point.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.incidents.len()
    }

    /// Always `false` for buckets produced by [`LocationIndex::build`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Identifiers of the incidents at this point, in order.
    #[must_use]
    pub fn incident_ids(&self) -> Vec<IncidentId> {
        self.incidents.iter().map(|i| i.id).collect()
    }
}

/// Mapping from bucket key to [`LocationBucket`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationIndex {
    buckets: BTreeMap<BucketKey, LocationBucket>,
    /// incident -> key of its first usable address
    incident_keys: BTreeMap<IncidentId, BucketKey>,
}

impl LocationIndex {
    /// Builds the index from `incidents`.
    ///
    /// Addresses without usable coordinates are skipped. An incident is
    /// listed at most once per bucket even when several of its addresses
    /// round to the same key.
    #[must_use]
    pub fn build(incidents: &[Incident]) -> Self {
        let mut buckets: BTreeMap<BucketKey, LocationBucket> = BTreeMap::new();
        let mut seen: BTreeMap<BucketKey, BTreeSet<IncidentId>> = BTreeMap::new();
        let mut incident_keys = BTreeMap::new();
        let mut unplaced = 0_usize;

        for incident in incidents {
            let mut placed = false;

            for key in incident.addresses.iter().filter_map(address_key) {
                placed = true;
                incident_keys.entry(incident.id).or_insert(key);

                if !seen.entry(key).or_default().insert(incident.id) {
                    continue;
                }

                buckets
                    .entry(key)
                    .or_insert_with(|| LocationBucket {
                        key,
                        incidents: Vec::new(),
                    })
                    .incidents
                    .push(incident.clone());
            }

            if !placed {
                unplaced += 1;
            }
        }

        log::debug!(
            "Indexed {} incidents into {} locations ({unplaced} without coordinates)",
            incidents.len(),
            buckets.len()
        );

        Self {
            buckets,
            incident_keys,
        }
    }

    /// Looks up one bucket.
    #[must_use]
    pub fn get(&self, key: &BucketKey) -> Option<&LocationBucket> {
        self.buckets.get(key)
    }

    /// All buckets, ordered by key.
    pub fn buckets(&self) -> impl Iterator<Item = &LocationBucket> {
        self.buckets.values()
    }

    /// All keys, ordered.
    pub fn keys(&self) -> impl Iterator<Item = BucketKey> + '_ {
        self.buckets.keys().copied()
    }

    /// Key of the first usable address of an indexed incident.
    #[must_use]
    pub fn key_for(&self, incident: IncidentId) -> Option<BucketKey> {
        self.incident_keys.get(&incident).copied()
    }

    /// Looks up an indexed incident by id.
    #[must_use]
    pub fn incident(&self, id: IncidentId) -> Option<&Incident> {
        let key = self.key_for(id)?;
        self.buckets
            .get(&key)?
            .incidents
            .iter()
            .find(|incident| incident.id == id)
    }

    /// Number of buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no incident had usable coordinates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
