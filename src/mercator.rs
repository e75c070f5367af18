use crate::errors::{MapError, Result};
use crate::types::LatLong;

pub struct MercatorProjection;

// Constants
pub const LATITUDE_MAX: f64 = 85.05112877980659;
pub const LATITUDE_MIN: f64 = -LATITUDE_MAX;
pub const MAX_ZOOM_LEVEL: u8 = 30;
pub const TILE_SIZE: i32 = 256; // Standard tile size
const PI: f64 = std::f64::consts::PI;

impl MercatorProjection {
    /// Slippy-tile indices of the tile containing a position.
    ///
    /// Latitudes at or beyond the projection limit have no vertical tile
    /// index and fail with `MapError::Domain`; clamping is left to the caller
    /// (see `BoundingBox::clamp_to_mercator`). Longitude 180 belongs to the
    /// last column.
    pub fn project(latitude: f64, longitude: f64, zoom_level: u8) -> Result<(i64, i64)> {
        Self::check_zoom(zoom_level)?;
        if latitude.is_nan() || latitude <= LATITUDE_MIN || latitude >= LATITUDE_MAX {
            return Err(MapError::Domain {
                quantity: "latitude",
                value: latitude,
            });
        }
        if longitude.is_nan() || !(-180.0..=180.0).contains(&longitude) {
            return Err(MapError::Domain {
                quantity: "longitude",
                value: longitude,
            });
        }
        Ok((
            Self::longitude_to_tile_x(longitude, zoom_level),
            Self::latitude_to_tile_y(latitude, zoom_level),
        ))
    }

    /// North-west corner of a tile. Inverse of [`project`] up to the
    /// truncation to integer indices.
    ///
    /// [`project`]: MercatorProjection::project
    pub fn unproject(tile_x: i64, tile_y: i64, zoom_level: u8) -> LatLong {
        LatLong::new(
            Self::tile_y_to_latitude(tile_y, zoom_level),
            Self::tile_x_to_longitude(tile_x, zoom_level),
        )
    }

    pub fn tile_x_to_longitude(tile_x: i64, zoom_level: u8) -> f64 {
        let n = Self::tile_count(zoom_level);
        (tile_x as f64 * 360.0 / n as f64) - 180.0
    }

    pub fn tile_y_to_latitude(tile_y: i64, zoom_level: u8) -> f64 {
        let n = Self::tile_count(zoom_level);
        let y = PI * (1.0 - 2.0 * tile_y as f64 / n as f64);
        y.sinh().atan().to_degrees()
    }

    fn longitude_to_tile_x(longitude: f64, zoom_level: u8) -> i64 {
        let n = Self::tile_count(zoom_level);
        let tile_x = ((longitude + 180.0) / 360.0 * n as f64).floor() as i64;
        tile_x.clamp(0, n - 1)
    }

    fn latitude_to_tile_y(latitude: f64, zoom_level: u8) -> i64 {
        let n = Self::tile_count(zoom_level);
        let lat_rad = latitude.to_radians();
        let secant = 1.0 / lat_rad.cos();
        let y = (1.0 - (lat_rad.tan() + secant).ln() / PI) / 2.0;
        let tile_y = (y * n as f64).floor() as i64;
        tile_y.clamp(0, n - 1)
    }

    pub fn latitude_to_pixel_y(latitude: f64, zoom_level: u8) -> f64 {
        let map_size = Self::get_map_size(zoom_level);
        let latitude = latitude.clamp(LATITUDE_MIN, LATITUDE_MAX);
        let sin_latitude = latitude.to_radians().sin();
        let pixel_y = (0.5 - ((1.0 + sin_latitude) / (1.0 - sin_latitude)).ln() / (4.0 * PI))
            * map_size as f64;
        pixel_y.min(map_size as f64).max(0.0)
    }

    pub fn longitude_to_pixel_x(longitude: f64, zoom_level: u8) -> f64 {
        let map_size = Self::get_map_size(zoom_level);
        (longitude + 180.0) / 360.0 * map_size as f64
    }

    pub fn pixel_y_to_latitude(pixel_y: f64, zoom_level: u8) -> f64 {
        let map_size = Self::get_map_size(zoom_level) as f64;
        let y = 0.5 - pixel_y.clamp(0.0, map_size) / map_size;
        90.0 - 360.0 * (-y * 2.0 * PI).exp().atan() / PI
    }

    pub fn pixel_x_to_longitude(pixel_x: f64, zoom_level: u8) -> f64 {
        let map_size = Self::get_map_size(zoom_level) as f64;
        360.0 * (pixel_x.clamp(0.0, map_size) / map_size) - 180.0
    }

    pub fn get_map_size(zoom_level: u8) -> i64 {
        (TILE_SIZE as i64) << zoom_level
    }

    pub fn tile_count(zoom_level: u8) -> i64 {
        1i64 << zoom_level
    }

    fn check_zoom(zoom_level: u8) -> Result<()> {
        if zoom_level > MAX_ZOOM_LEVEL {
            return Err(MapError::Domain {
                quantity: "zoom level",
                value: zoom_level as f64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tiles() {
        assert_eq!(MercatorProjection::project(0.0, 0.0, 1).unwrap(), (1, 1));
        assert_eq!(MercatorProjection::project(51.5, -0.12, 12).unwrap(), (2046, 1362));
        assert_eq!(MercatorProjection::project(31.23, 121.47, 10).unwrap(), (857, 418));
        assert_eq!(MercatorProjection::project(10.0, 180.0, 3).unwrap(), (7, 3));
    }

    #[test]
    fn latitude_outside_projection_is_a_domain_error() {
        for lat in [85.06, -85.06, 90.0, f64::NAN] {
            match MercatorProjection::project(lat, 0.0, 5) {
                Err(MapError::Domain { quantity, .. }) => assert_eq!(quantity, "latitude"),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(MercatorProjection::project(0.0, 180.5, 5).is_err());
        assert!(MercatorProjection::project(0.0, 0.0, MAX_ZOOM_LEVEL + 1).is_err());
    }

    #[test]
    fn round_trip_stays_within_one_tile() {
        for zoom in [0u8, 3, 10, 17] {
            for &(lat, lon) in &[(31.23, 121.47), (-33.9, 18.4), (64.1, -21.9), (0.0, 0.0)] {
                let (x, y) = MercatorProjection::project(lat, lon, zoom).unwrap();
                let north_west = MercatorProjection::unproject(x, y, zoom);
                let south_east = MercatorProjection::unproject(x + 1, y + 1, zoom);
                assert!(lat <= north_west.latitude && lat >= south_east.latitude);
                assert!(lon >= north_west.longitude && lon <= south_east.longitude);
            }
        }
    }

    #[test]
    fn projection_is_reproducible() {
        let a = MercatorProjection::project(47.376887, 8.541694, 16).unwrap();
        let b = MercatorProjection::project(47.376887, 8.541694, 16).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            MercatorProjection::unproject(a.0, a.1, 16),
            MercatorProjection::unproject(a.0, a.1, 16)
        );
    }

    #[test]
    fn pixel_inverse() {
        let zoom = 14;
        let x = MercatorProjection::longitude_to_pixel_x(121.47, zoom);
        let y = MercatorProjection::latitude_to_pixel_y(31.23, zoom);
        assert!((MercatorProjection::pixel_x_to_longitude(x, zoom) - 121.47).abs() < 1e-9);
        assert!((MercatorProjection::pixel_y_to_latitude(y, zoom) - 31.23).abs() < 1e-9);
    }
}
