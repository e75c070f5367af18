use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::errors::Result;
use crate::types::Tag;

/// Tag keys whose closed ways are drawn as filled areas.
pub const ENCLOSED_KEYS: [&str; 7] = [
    "building", "park", "garden", "leisure", "landuse", "natural", "historic",
];

const PEDESTRIAN_CLASSES: [&str; 5] = ["pedestrian", "footway", "steps", "path", "living_street"];
const RIDING_CLASSES: [&str; 3] = ["cycleway", "path", "track"];
const DRIVING_CLASSES: [&str; 11] = [
    "motorway",
    "trunk",
    "primary",
    "secondary",
    "tertiary",
    "service",
    "motorway_link",
    "trunk_link",
    "primary_link",
    "secondary_link",
    "residential",
];
const PUBLIC_TRANSPORT_CLASSES: [&str; 4] =
    ["bus_stop", "motorway_junction", "traffic_signals", "crossing"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().strip_prefix('#')?;
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Packed `0x00RRGGBB`, the pixel format of the viewer's frame buffer.
    pub fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

/// Travel modes a routing request allows. At least one is normally set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TravelModes {
    pub pedestrian: bool,
    pub riding: bool,
    pub driving: bool,
    pub public_transport: bool,
}

impl TravelModes {
    pub const ALL: TravelModes = TravelModes {
        pedestrian: true,
        riding: true,
        driving: true,
        public_transport: true,
    };

    pub fn walking() -> Self {
        Self {
            pedestrian: true,
            ..Self::default()
        }
    }

    pub fn driving() -> Self {
        Self {
            driving: true,
            ..Self::default()
        }
    }
}

/// Read-only tag vocabulary: render colours, enclosed-area keys and the
/// highway classes each travel mode may use.
///
/// Built once at startup and passed by reference to whatever makes rendering
/// or routing decisions.
#[derive(Debug, Clone)]
pub struct TagDictionary {
    colors: Vec<(String, Rgb)>,
    enclosed: Vec<String>,
}

impl Default for TagDictionary {
    fn default() -> Self {
        Self {
            colors: Vec::new(),
            enclosed: ENCLOSED_KEYS.iter().map(|key| key.to_string()).collect(),
        }
    }
}

impl TagDictionary {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let dictionary = Self::parse(&text);
        info!(
            "Loaded {} tag colours from {}",
            dictionary.colors.len(),
            path.display()
        );
        Ok(dictionary)
    }

    /// One `key:#rrggbb` entry per line. Blank lines and `#` comments are
    /// ignored; anything else that does not parse is skipped with a warning.
    pub fn parse(text: &str) -> Self {
        let mut dictionary = Self::default();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed = line
                .split_once(':')
                .and_then(|(key, hex)| Some((key.trim(), Rgb::from_hex(hex)?)))
                .filter(|(key, _)| !key.is_empty());
            match parsed {
                Some((key, color)) => dictionary.colors.push((key.to_string(), color)),
                None => warn!("Skipping tag colour line {}: '{}'", number + 1, line),
            }
        }
        dictionary
    }

    /// Colour of the first configured key present in `tags`, in file order.
    pub fn color_for(&self, tags: &[Tag]) -> Option<Rgb> {
        self.colors
            .iter()
            .find(|(key, _)| tags.iter().any(|tag| &tag.key == key))
            .map(|(_, color)| *color)
    }

    pub fn is_enclosed(&self, tags: &[Tag]) -> bool {
        tags.iter().any(|tag| self.enclosed.contains(&tag.key))
    }

    /// Whether a road of `highway_class` may be used under any of `modes`.
    pub fn allows(&self, highway_class: &str, modes: TravelModes) -> bool {
        (modes.pedestrian && PEDESTRIAN_CLASSES.contains(&highway_class))
            || (modes.riding && RIDING_CLASSES.contains(&highway_class))
            || (modes.driving && DRIVING_CLASSES.contains(&highway_class))
            || (modes.public_transport && PUBLIC_TRANSPORT_CLASSES.contains(&highway_class))
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colour_lines_and_skips_junk() {
        let dictionary = TagDictionary::parse(
            "building:#d9d0c9\n\n# comment\nhighway:#FFFFFF\nbroken line\nwater:#12345\npark:#c8facc\n",
        );
        assert_eq!(dictionary.color_count(), 3);

        let tags = vec![Tag::new("park", "yes"), Tag::new("building", "yes")];
        assert_eq!(dictionary.color_for(&tags), Some(Rgb::new(0xd9, 0xd0, 0xc9)));
        assert_eq!(
            dictionary.color_for(&[Tag::new("highway", "primary")]),
            Some(Rgb::new(255, 255, 255))
        );
        assert_eq!(dictionary.color_for(&[Tag::new("amenity", "cafe")]), None);
    }

    #[test]
    fn enclosed_keys() {
        let dictionary = TagDictionary::default();
        assert!(dictionary.is_enclosed(&[Tag::new("landuse", "grass")]));
        assert!(!dictionary.is_enclosed(&[Tag::new("highway", "primary")]));
    }

    #[test]
    fn travel_mode_whitelist() {
        let dictionary = TagDictionary::default();
        assert!(dictionary.allows("footway", TravelModes::walking()));
        assert!(!dictionary.allows("motorway", TravelModes::walking()));
        assert!(dictionary.allows("primary_link", TravelModes::driving()));
        assert!(dictionary.allows("path", TravelModes { riding: true, ..Default::default() }));
        assert!(!dictionary.allows("footway", TravelModes::default()));
        assert!(dictionary.allows("crossing", TravelModes::ALL));
    }

    #[test]
    fn packs_rgb() {
        assert_eq!(Rgb::from_hex("#0a0b0c").map(Rgb::to_u32), Some(0x000a0b0c));
        assert_eq!(Rgb::from_hex("0a0b0c"), None);
    }
}
