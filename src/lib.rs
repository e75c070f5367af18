mod dictionary;
mod errors;
mod grid;
mod ingest;
mod map_data;
mod mercator;
pub mod pathfinder;
pub mod renderer;
mod scene;
mod settings;
pub mod snapshot;
mod store;
mod tile;
mod tile_planner;
mod types;
mod viewport;

// Create a single, consistent public API
pub use dictionary::{Rgb, TagDictionary, TravelModes, ENCLOSED_KEYS};
pub use errors::{MapError, Result};
pub use grid::{CellEntities, CellKey, GridIndex};
pub use ingest::{ingest, ingest_path};
pub use map_data::{EntityId, Point, PointId, Way, WayId};
pub use mercator::{MercatorProjection, LATITUDE_MAX, LATITUDE_MIN, MAX_ZOOM_LEVEL, TILE_SIZE};
pub use pathfinder::{
    Algorithm, PathEvent, PathFinder, PathRequest, RouteAssembler, RouteOutcome,
};
pub use renderer::{RenderOutcome, TileRenderer};
pub use scene::{SceneChange, SceneLedger};
pub use settings::Settings;
pub use store::{EntityStore, EntityStoreBuilder};
pub use tile::Tile;
pub use tile_planner::{TileCache, TilePlan, TilePlanner};
pub use types::{tag_value, BoundingBox, LatLong, Tag};
pub use viewport::{Viewport, ViewportDelta, ViewportTracker};
