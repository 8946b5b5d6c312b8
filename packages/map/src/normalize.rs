//! Coordinate normalization: raw latitude/longitude values to bucket keys.
//!
//! Anything that does not yield two finite numbers is rejected with
//! `None`. Missing coordinates are a normal state for incidents that
//! have not been geocoded yet, so nothing here logs above `trace`.

use incident_map_incident_models::{Address, RawCoordinate};
use incident_map_map_models::BucketKey;

/// Parses one raw coordinate. Numeric strings are trimmed first.
#[must_use]
pub fn parse_coordinate(raw: &RawCoordinate) -> Option<f64> {
    let value = match raw {
        RawCoordinate::Number(value) => *value,
        RawCoordinate::Text(text) => text.trim().parse().ok()?,
    };
    value.is_finite().then_some(value)
}

/// Normalizes a latitude/longitude pair into a [`BucketKey`].
#[must_use]
pub fn normalize(lat: Option<&RawCoordinate>, lng: Option<&RawCoordinate>) -> Option<BucketKey> {
    let lat = parse_coordinate(lat?)?;
    let lng = parse_coordinate(lng?)?;
    BucketKey::from_degrees(lat, lng)
}

/// Bucket key of an address, if its coordinates are usable.
#[must_use]
pub fn address_key(address: &Address) -> Option<BucketKey> {
    let key = normalize(address.latitude.as_ref(), address.longitude.as_ref());
    if key.is_none() {
        log::trace!(
            "Skipping address without usable coordinates: {:?}/{:?}",
            address.latitude,
            address.longitude
        );
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(lat: impl Into<RawCoordinate>, lng: impl Into<RawCoordinate>) -> Option<BucketKey> {
        normalize(Some(&lat.into()), Some(&lng.into()))
    }

    #[test]
    fn numbers_and_strings_agree() {
        assert_eq!(key(51.66077, 39.20028), key("51.66077", "39.20028"));
        assert_eq!(key(51.66077, 39.20028), key(" 51.660770 ", "39.2002800"));
    }

    #[test]
    fn produces_canonical_string() {
        assert_eq!(
            key("51.6607700004", 39.20028).unwrap().to_string(),
            "51.660770,39.200280"
        );
    }

    #[test]
    fn rejects_missing_values() {
        assert_eq!(normalize(None, Some(&RawCoordinate::Number(39.2))), None);
        assert_eq!(normalize(Some(&RawCoordinate::Number(51.6)), None), None);
        assert_eq!(normalize(None, None), None);
    }

    #[test]
    fn rejects_non_numeric_strings() {
        assert_eq!(key("", 39.2), None);
        assert_eq!(key("n/a", 39.2), None);
        assert_eq!(key(51.6, "NaN"), None);
        assert_eq!(key(51.6, "inf"), None);
    }

    #[test]
    fn keeps_out_of_range_values() {
        assert_eq!(key(95.0, 39.2).unwrap().to_string(), "95.000000,39.200000");
        assert_eq!(
            key("51.66", "181.0").unwrap().to_string(),
            "51.660000,181.000000"
        );
    }

    #[test]
    fn address_key_uses_both_fields() {
        let address = Address {
            latitude: Some(RawCoordinate::Number(51.66077)),
            longitude: Some("39.20028".into()),
            ..Address::default()
        };
        assert_eq!(address_key(&address), key(51.66077, 39.20028));
        assert_eq!(address_key(&Address::default()), None);
    }
}
