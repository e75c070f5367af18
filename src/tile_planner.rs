use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use lru::LruCache;
use tracing::debug;

use crate::errors::Result;
use crate::tile::Tile;
use crate::types::BoundingBox;

/// Rendered tile images on disk, laid out as `{root}/{zoom}/{x}_{y}.png`.
///
/// Confirmed hits are remembered in an LRU so a panning view does not stat
/// the same files over and over. Misses are always re-checked since the
/// renderer fills the cache behind our back.
pub struct TileCache {
    root: PathBuf,
    known: LruCache<Tile, PathBuf>,
}

impl TileCache {
    pub fn new<P: Into<PathBuf>>(root: P, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            root: root.into(),
            known: LruCache::new(capacity),
        }
    }

    pub fn path_for(&self, tile: &Tile) -> PathBuf {
        tile.cache_path(&self.root)
    }

    pub fn already_cached(&mut self, tile: &Tile) -> bool {
        if self.known.get(tile).is_some() {
            return true;
        }
        let path = self.path_for(tile);
        if path.is_file() {
            self.known.put(*tile, path);
            true
        } else {
            false
        }
    }

    /// Record a tile the renderer reported as written.
    pub fn mark_rendered(&mut self, tile: Tile) {
        let path = self.path_for(&tile);
        self.known.put(tile, path);
    }

    pub fn clear(&mut self) {
        self.known.clear();
    }
}

/// Tiles covering a viewport, split by whether an image already exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TilePlan {
    pub cached: Vec<(Tile, PathBuf)>,
    pub needs_render: Vec<Tile>,
}

impl TilePlan {
    pub fn len(&self) -> usize {
        self.cached.len() + self.needs_render.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns a viewport into tile requests. Performs no rendering and never
/// blocks on the renderer; deduplicating in-flight renders is up to the
/// caller.
pub struct TilePlanner {
    cache: TileCache,
}

impl TilePlanner {
    pub fn new(cache: TileCache) -> Self {
        Self { cache }
    }

    /// Tiles covering `bbox`, which is first clamped to the projectable
    /// latitude and longitude range.
    pub fn plan_tiles(bbox: &BoundingBox, zoom_level: u8) -> Result<BTreeSet<Tile>> {
        Tile::covering(&bbox.clamp_to_mercator(), zoom_level)
    }

    pub fn plan(&mut self, bbox: &BoundingBox, zoom_level: u8) -> Result<TilePlan> {
        let mut plan = TilePlan::default();
        for tile in Self::plan_tiles(bbox, zoom_level)? {
            if self.cache.already_cached(&tile) {
                plan.cached.push((tile, self.cache.path_for(&tile)));
            } else {
                plan.needs_render.push(tile);
            }
        }
        debug!(
            "Planned {} tiles at zoom {} ({} to render)",
            plan.len(),
            zoom_level,
            plan.needs_render.len()
        );
        Ok(plan)
    }

    /// Whether a tile delivered late still belongs to the current view.
    pub fn is_still_wanted(tile: &Tile, bbox: &BoundingBox, zoom_level: u8) -> bool {
        tile.zoom_level == zoom_level
            && Self::plan_tiles(bbox, zoom_level)
                .map(|tiles| tiles.contains(tile))
                .unwrap_or(false)
    }

    pub fn cache_mut(&mut self) -> &mut TileCache {
        &mut self.cache
    }
}
