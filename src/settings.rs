use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{MapError, Result};
use crate::mercator::MAX_ZOOM_LEVEL;
use crate::types::LatLong;

/// Viewer and loader configuration, read from a YAML file.
///
/// Every field is optional in the file and falls back to [`Settings::default`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub map_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub tag_colors_path: Option<PathBuf>,
    /// Grid cell edge, in degrees.
    pub cell_size: f64,
    pub tile_cache_root: PathBuf,
    pub tile_cache_capacity: usize,
    pub renderer_program: Option<PathBuf>,
    pub pathfinder_program: Option<PathBuf>,
    pub start_position: Option<LatLong>,
    pub start_zoom: u8,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            map_path: PathBuf::from("map.osm"),
            snapshot_path: PathBuf::from("map.sgrd"),
            tag_colors_path: None,
            cell_size: 0.01,
            tile_cache_root: PathBuf::from("cache"),
            tile_cache_capacity: 1024,
            renderer_program: None,
            pathfinder_program: None,
            start_position: None,
            start_zoom: 15,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(MapError::Config(format!(
                "cell_size must be positive, got {}",
                self.cell_size
            )));
        }
        if self.start_zoom > MAX_ZOOM_LEVEL {
            return Err(MapError::Config(format!(
                "start_zoom {} exceeds the maximum zoom level {}",
                self.start_zoom, MAX_ZOOM_LEVEL
            )));
        }
        if let Some(position) = self.start_position {
            if !(-90.0..=90.0).contains(&position.latitude)
                || !(-180.0..=180.0).contains(&position.longitude)
            {
                return Err(MapError::Config(format!(
                    "start_position {:?} is not a valid coordinate",
                    position
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings = Settings::from_yaml("map_path: data/shanghai.osm\ncell_size: 0.005\n").unwrap();
        assert_eq!(settings.map_path, PathBuf::from("data/shanghai.osm"));
        assert_eq!(settings.cell_size, 0.005);
        assert_eq!(settings.start_zoom, 15);
        assert!(settings.renderer_program.is_none());
    }

    #[test]
    fn start_position_is_a_mapping() {
        let settings =
            Settings::from_yaml("start_position:\n  latitude: 31.23\n  longitude: 121.47\n").unwrap();
        assert_eq!(settings.start_position, Some(LatLong::new(31.23, 121.47)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Settings::from_yaml("cell_size: 0"),
            Err(MapError::Config(_))
        ));
        assert!(matches!(
            Settings::from_yaml("start_zoom: 31"),
            Err(MapError::Config(_))
        ));
        assert!(matches!(
            Settings::from_yaml("cell_size: [1, 2]"),
            Err(MapError::Config(_))
        ));
    }
}
