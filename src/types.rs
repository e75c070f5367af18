use serde::{Deserialize, Serialize};

use crate::errors::{MapError, Result};
use crate::mercator::LATITUDE_MAX;

/// Axis-aligned latitude/longitude rectangle. Containment and intersection
/// are inclusive of the boundary.
///
/// A box whose minimum exceeds its maximum on either axis is *empty*: it
/// contains nothing and intersects nothing. `BoundingBox::empty()` builds one,
/// and it is also the starting point for boxes grown with [`expand`].
///
/// [`expand`]: BoundingBox::expand
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub min_longitude: f64,
    pub max_latitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    pub fn new(
        min_latitude: f64,
        min_longitude: f64,
        max_latitude: f64,
        max_longitude: f64,
    ) -> Result<Self> {
        let any_nan = [min_latitude, min_longitude, max_latitude, max_longitude]
            .iter()
            .any(|v| v.is_nan());
        if any_nan || min_latitude > max_latitude || min_longitude > max_longitude {
            return Err(MapError::InvalidBoundingBox);
        }
        Ok(Self {
            min_latitude,
            min_longitude,
            max_latitude,
            max_longitude,
        })
    }

    /// Box spanning two arbitrary corners, whichever order they come in.
    pub fn from_corners(a: LatLong, b: LatLong) -> Self {
        Self {
            min_latitude: a.latitude.min(b.latitude),
            min_longitude: a.longitude.min(b.longitude),
            max_latitude: a.latitude.max(b.latitude),
            max_longitude: a.longitude.max(b.longitude),
        }
    }

    /// Inverted box, min holds the largest possible values and max the smallest.
    pub fn empty() -> Self {
        Self {
            min_latitude: 90.0,
            min_longitude: 180.0,
            max_latitude: -90.0,
            max_longitude: -180.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.min_latitude <= self.max_latitude && self.min_longitude <= self.max_longitude)
    }

    /// Grow the box to include a position.
    pub fn expand(&mut self, position: LatLong) {
        self.min_latitude = self.min_latitude.min(position.latitude);
        self.max_latitude = self.max_latitude.max(position.latitude);
        self.min_longitude = self.min_longitude.min(position.longitude);
        self.max_longitude = self.max_longitude.max(position.longitude);
    }

    pub fn get_center_point(&self) -> LatLong {
        LatLong {
            latitude: (self.min_latitude + self.max_latitude) / 2.0,
            longitude: (self.min_longitude + self.max_longitude) / 2.0,
        }
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_latitude
            && latitude <= self.max_latitude
            && longitude >= self.min_longitude
            && longitude <= self.max_longitude
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        !(other.min_latitude > self.max_latitude
            || other.max_latitude < self.min_latitude
            || other.min_longitude > self.max_longitude
            || other.max_longitude < self.min_longitude)
    }

    /// Overlap of two boxes, empty when they are disjoint.
    pub fn intersection(&self, other: &BoundingBox) -> BoundingBox {
        if !self.intersects(other) {
            return BoundingBox::empty();
        }
        BoundingBox {
            min_latitude: self.min_latitude.max(other.min_latitude),
            min_longitude: self.min_longitude.max(other.min_longitude),
            max_latitude: self.max_latitude.min(other.max_latitude),
            max_longitude: self.max_longitude.min(other.max_longitude),
        }
    }

    /// Pull the box inside the range the slippy-tile projection accepts.
    /// Latitudes stop just short of the projection limit since the limit
    /// itself is excluded.
    pub fn clamp_to_mercator(&self) -> BoundingBox {
        if self.is_empty() {
            return *self;
        }
        let lat_limit = LATITUDE_MAX - 1e-9;
        BoundingBox {
            min_latitude: self.min_latitude.clamp(-lat_limit, lat_limit),
            min_longitude: self.min_longitude.clamp(-180.0, 180.0),
            max_latitude: self.max_latitude.clamp(-lat_limit, lat_limit),
            max_longitude: self.max_longitude.clamp(-180.0, 180.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLong {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLong {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Key/value pair attached to points and ways. Tag lists keep document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<(&str, &str)> for Tag {
    fn from((key, value): (&str, &str)) -> Self {
        Tag::new(key, value)
    }
}

/// Value of the first tag with `key`.
pub fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_box_is_empty_until_expanded() {
        let mut bbox = BoundingBox::empty();
        assert!(bbox.is_empty());
        assert!(!bbox.contains(0.0, 0.0));

        bbox.expand(LatLong::new(10.0, 20.0));
        bbox.expand(LatLong::new(30.0, 40.0));
        assert!(!bbox.is_empty());
        assert_eq!(bbox, BoundingBox::new(10.0, 20.0, 30.0, 40.0).unwrap());
    }

    #[test]
    fn boundary_is_inclusive() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0).unwrap();
        assert!(bbox.contains(1.0, 2.0));
        assert!(bbox.contains(3.0, 4.0));
        assert!(!bbox.contains(3.0000001, 4.0));

        let touching = BoundingBox::new(3.0, 4.0, 5.0, 6.0).unwrap();
        assert!(bbox.intersects(&touching));
        assert_eq!(
            bbox.intersection(&touching),
            BoundingBox::new(3.0, 4.0, 3.0, 4.0).unwrap()
        );
    }

    #[test]
    fn rejects_inverted_corners() {
        assert!(BoundingBox::new(2.0, 0.0, 1.0, 1.0).is_err());
        assert!(BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn first_tag_wins() {
        let tags = vec![Tag::from(("highway", "primary")), Tag::from(("highway", "x"))];
        assert_eq!(tag_value(&tags, "highway"), Some("primary"));
        assert_eq!(tag_value(&tags, "name"), None);
    }
}
