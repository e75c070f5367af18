use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::mercator::MercatorProjection;
use crate::types::BoundingBox;

/// Slippy-map tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tile {
    pub zoom_level: u8,
    pub tile_x: i64,
    pub tile_y: i64,
}

impl Tile {
    pub fn new(tile_x: i64, tile_y: i64, zoom_level: u8) -> Self {
        Self {
            zoom_level,
            tile_x,
            tile_y,
        }
    }

    /// Tile containing a position, see `MercatorProjection::project`.
    pub fn containing(latitude: f64, longitude: f64, zoom_level: u8) -> Result<Self> {
        let (tile_x, tile_y) = MercatorProjection::project(latitude, longitude, zoom_level)?;
        Ok(Self::new(tile_x, tile_y, zoom_level))
    }

    /// Every tile intersecting `bbox` at `zoom_level`.
    ///
    /// Both corners are projected and the resulting indices normalised, since
    /// tile rows grow southwards while latitudes grow northwards. A corner
    /// lying exactly on a tile edge pulls in the tile on the far side of
    /// that edge. An empty box covers nothing.
    pub fn covering(bbox: &BoundingBox, zoom_level: u8) -> Result<BTreeSet<Tile>> {
        let mut tiles = BTreeSet::new();
        if bbox.is_empty() {
            return Ok(tiles);
        }

        let (x1, y1) =
            MercatorProjection::project(bbox.min_latitude, bbox.min_longitude, zoom_level)?;
        let (x2, y2) =
            MercatorProjection::project(bbox.max_latitude, bbox.max_longitude, zoom_level)?;

        for x in x1.min(x2)..=x1.max(x2) {
            for y in y1.min(y2)..=y1.max(y2) {
                tiles.insert(Tile::new(x, y, zoom_level));
            }
        }
        Ok(tiles)
    }

    pub fn get_bounding_box(&self) -> BoundingBox {
        let min_lon = MercatorProjection::tile_x_to_longitude(self.tile_x, self.zoom_level);
        let max_lon = MercatorProjection::tile_x_to_longitude(self.tile_x + 1, self.zoom_level);
        let min_lat = MercatorProjection::tile_y_to_latitude(self.tile_y + 1, self.zoom_level);
        let max_lat = MercatorProjection::tile_y_to_latitude(self.tile_y, self.zoom_level);

        BoundingBox {
            min_latitude: min_lat,
            min_longitude: min_lon,
            max_latitude: max_lat,
            max_longitude: max_lon,
        }
    }

    /// Content address of the rendered image, `{zoom}/{x}_{y}`.
    pub fn cache_key(&self) -> String {
        format!("{}/{}_{}", self.zoom_level, self.tile_x, self.tile_y)
    }

    pub fn cache_path(&self, root: &Path) -> PathBuf {
        root.join(self.zoom_level.to_string())
            .join(format!("{}_{}.png", self.tile_x, self.tile_y))
    }

    /// Line the renderer process expects on standard input.
    pub fn render_request_line(&self) -> String {
        format!("{} {} {}\n", self.zoom_level, self.tile_x, self.tile_y)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_bounds_contain_projected_point() {
        let tile = Tile::containing(31.23, 121.47, 15).unwrap();
        assert!(tile.get_bounding_box().contains(31.23, 121.47));
    }

    #[test]
    fn cache_layout() {
        let tile = Tile::new(6743, 3104, 13);
        assert_eq!(tile.cache_key(), "13/6743_3104");
        assert_eq!(
            tile.cache_path(Path::new("cache")),
            Path::new("cache").join("13").join("6743_3104.png")
        );
        assert_eq!(tile.render_request_line(), "13 6743 3104\n");
    }
}
