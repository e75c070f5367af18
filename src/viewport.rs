use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::grid::{CellKey, GridIndex};
use crate::types::BoundingBox;

/// Visible geographic rectangle and zoom level of a map view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub bounds: BoundingBox,
    pub zoom_level: u8,
}

impl Viewport {
    pub fn new(bounds: BoundingBox, zoom_level: u8) -> Self {
        Self { bounds, zoom_level }
    }
}

/// Cells to materialise and cells to evict after a viewport change. The two
/// sets are always disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewportDelta {
    pub added: BTreeSet<CellKey>,
    pub removed: BTreeSet<CellKey>,
}

impl ViewportDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug)]
enum TrackerState {
    Uninitialized,
    Tracking {
        viewport: Viewport,
        cells: BTreeSet<CellKey>,
    },
}

/// Keeps the set of displayed cells in step with the viewport and reports
/// only what changed.
///
/// Shares the grid read-only, so any number of trackers may run over one
/// index. Each tracker expects its updates from a single thread.
#[derive(Debug)]
pub struct ViewportTracker {
    grid: Arc<GridIndex>,
    state: TrackerState,
}

impl ViewportTracker {
    pub fn new(grid: Arc<GridIndex>) -> Self {
        Self {
            grid,
            state: TrackerState::Uninitialized,
        }
    }

    /// Move to `viewport`, returning the cells that appeared and disappeared.
    /// Repeating the same viewport returns an empty delta; an empty bounding
    /// box evicts everything.
    pub fn update(&mut self, viewport: Viewport) -> ViewportDelta {
        let next = self.grid.cells_in_box(&viewport.bounds);
        let delta = match &self.state {
            TrackerState::Uninitialized => ViewportDelta {
                added: next.clone(),
                removed: BTreeSet::new(),
            },
            TrackerState::Tracking { cells, .. } => ViewportDelta {
                added: next.difference(cells).copied().collect(),
                removed: cells.difference(&next).copied().collect(),
            },
        };
        debug!(
            "Viewport at zoom {}: {} cells, +{} -{}",
            viewport.zoom_level,
            next.len(),
            delta.added.len(),
            delta.removed.len()
        );
        self.state = TrackerState::Tracking {
            viewport,
            cells: next,
        };
        delta
    }

    /// Forget the displayed cells without reporting an eviction.
    pub fn reset(&mut self) {
        self.state = TrackerState::Uninitialized;
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackerState::Tracking { .. })
    }

    pub fn current_cells(&self) -> Option<&BTreeSet<CellKey>> {
        match &self.state {
            TrackerState::Tracking { cells, .. } => Some(cells),
            TrackerState::Uninitialized => None,
        }
    }

    pub fn current_viewport(&self) -> Option<Viewport> {
        match &self.state {
            TrackerState::Tracking { viewport, .. } => Some(*viewport),
            TrackerState::Uninitialized => None,
        }
    }

    pub fn grid(&self) -> &Arc<GridIndex> {
        &self.grid
    }
}
