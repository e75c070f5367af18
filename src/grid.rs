use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;

use tracing::info;

use crate::errors::{MapError, Result};
use crate::map_data::{PointId, WayId};
use crate::store::EntityStore;
use crate::types::BoundingBox;

/// Quotients this close to an integer are snapped to it before flooring, so
/// that a coordinate printed on a cell edge (`0.29` with `0.01` cells) lands
/// in the cell it names rather than the one below.
const SNAP_EPSILON: f64 = 1e-9;

static NO_POINTS: BTreeSet<PointId> = BTreeSet::new();
static NO_WAYS: BTreeSet<WayId> = BTreeSet::new();

/// Integer address of a grid cell: `x` counts cells along longitude, `y`
/// along latitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: i64,
    pub y: i64,
}

impl CellKey {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i64, i64)> for CellKey {
    fn from((x, y): (i64, i64)) -> Self {
        CellKey::new(x, y)
    }
}

#[derive(Debug, Default)]
struct Cell {
    points: BTreeSet<PointId>,
    ways: BTreeSet<WayId>,
}

/// Entities registered in one cell.
#[derive(Debug, Clone, Copy)]
pub struct CellEntities<'a> {
    pub points: &'a BTreeSet<PointId>,
    pub ways: &'a BTreeSet<WayId>,
}

impl CellEntities<'_> {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.ways.is_empty()
    }
}

/// Uniform grid over the dataset, in degrees.
///
/// Each point sits in exactly one cell. A way is registered in the cell of
/// every vertex it has, so a way crossing several cells is reachable from all
/// of them and consumers must deduplicate by way id before drawing. The index
/// is immutable once built; a reloaded dataset needs a new index.
#[derive(Debug)]
pub struct GridIndex {
    cell_size: f64,
    cells: HashMap<CellKey, Cell>,
}

impl GridIndex {
    pub fn build(store: &EntityStore, cell_size: f64) -> Result<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(MapError::Config(format!(
                "cell size must be a positive number of degrees, got {}",
                cell_size
            )));
        }

        let started = Instant::now();
        let mut grid = GridIndex {
            cell_size,
            cells: HashMap::new(),
        };

        for point in store.points() {
            let key = grid.cell_key(point.position.latitude, point.position.longitude);
            grid.cells.entry(key).or_default().points.insert(point.id);
        }

        for way in store.ways() {
            for position in store.way_geometry(way) {
                let key = grid.cell_key(position.latitude, position.longitude);
                grid.cells.entry(key).or_default().ways.insert(way.id);
            }
        }

        info!(
            "Built grid of {} cells ({} degrees) in {:?}",
            grid.cells.len(),
            cell_size,
            started.elapsed()
        );
        Ok(grid)
    }

    /// `(floor(lon / cell_size), floor(lat / cell_size))`.
    pub fn cell_key(&self, latitude: f64, longitude: f64) -> CellKey {
        CellKey::new(
            cell_index(longitude, self.cell_size),
            cell_index(latitude, self.cell_size),
        )
    }

    /// Every cell whose rectangle meets `bbox`, populated or not. An empty box
    /// yields no cells.
    ///
    /// The result grows with the area of `bbox`; callers passing unbounded
    /// viewports should intersect them with the dataset bounds first.
    pub fn cells_in_box(&self, bbox: &BoundingBox) -> BTreeSet<CellKey> {
        let mut keys = BTreeSet::new();
        if bbox.is_empty() {
            return keys;
        }
        let low = self.cell_key(bbox.min_latitude, bbox.min_longitude);
        let high = self.cell_key(bbox.max_latitude, bbox.max_longitude);
        for x in low.x..=high.x {
            for y in low.y..=high.y {
                keys.insert(CellKey::new(x, y));
            }
        }
        keys
    }

    /// Entities of a cell; both sets are empty for unpopulated keys.
    pub fn entities_of(&self, key: CellKey) -> CellEntities<'_> {
        match self.cells.get(&key) {
            Some(cell) => CellEntities {
                points: &cell.points,
                ways: &cell.ways,
            },
            None => CellEntities {
                points: &NO_POINTS,
                ways: &NO_WAYS,
            },
        }
    }

    /// Geographic rectangle covered by a cell.
    pub fn cell_bounds(&self, key: CellKey) -> BoundingBox {
        BoundingBox {
            min_latitude: key.y as f64 * self.cell_size,
            min_longitude: key.x as f64 * self.cell_size,
            max_latitude: (key.y + 1) as f64 * self.cell_size,
            max_longitude: (key.x + 1) as f64 * self.cell_size,
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of cells holding at least one entity.
    pub fn populated_cells(&self) -> usize {
        self.cells.len()
    }
}

fn cell_index(degrees: f64, cell_size: f64) -> i64 {
    let quotient = degrees / cell_size;
    let nearest = quotient.round();
    if (quotient - nearest).abs() < SNAP_EPSILON {
        nearest as i64
    } else {
        quotient.floor() as i64
    }
}
