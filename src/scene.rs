use std::collections::HashMap;

use crate::grid::GridIndex;
use crate::map_data::{PointId, WayId};
use crate::viewport::ViewportDelta;

/// Entity-level drawing instructions derived from a cell delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneChange {
    pub draw_points: Vec<PointId>,
    pub draw_ways: Vec<WayId>,
    pub erase_points: Vec<PointId>,
    pub erase_ways: Vec<WayId>,
}

impl SceneChange {
    pub fn is_empty(&self) -> bool {
        self.draw_points.is_empty()
            && self.draw_ways.is_empty()
            && self.erase_points.is_empty()
            && self.erase_ways.is_empty()
    }
}

/// Tracks which entities are on screen so that a way spanning many cells is
/// drawn once and erased only when its last displayed cell goes away.
#[derive(Debug, Default)]
pub struct SceneLedger {
    /// Displayed cells holding each way.
    way_refs: HashMap<WayId, usize>,
    displayed_points: usize,
}

impl SceneLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Additions are counted before removals, so a way that stays visible
    /// while the cells under it change is neither erased nor redrawn.
    pub fn apply(&mut self, delta: &ViewportDelta, grid: &GridIndex) -> SceneChange {
        let mut change = SceneChange::default();

        for &key in &delta.added {
            let entities = grid.entities_of(key);
            change.draw_points.extend(entities.points.iter().copied());
            for &way_id in entities.ways {
                let count = self.way_refs.entry(way_id).or_insert(0);
                *count += 1;
                if *count == 1 {
                    change.draw_ways.push(way_id);
                }
            }
        }

        for &key in &delta.removed {
            let entities = grid.entities_of(key);
            change.erase_points.extend(entities.points.iter().copied());
            for way_id in entities.ways {
                if let Some(count) = self.way_refs.get_mut(way_id) {
                    *count -= 1;
                    if *count == 0 {
                        self.way_refs.remove(way_id);
                        change.erase_ways.push(*way_id);
                    }
                }
            }
        }

        self.displayed_points += change.draw_points.len();
        self.displayed_points = self
            .displayed_points
            .saturating_sub(change.erase_points.len());
        change
    }

    /// Drop all bookkeeping, paired with `ViewportTracker::reset`.
    pub fn clear(&mut self) {
        self.way_refs.clear();
        self.displayed_points = 0;
    }

    pub fn is_way_displayed(&self, way_id: WayId) -> bool {
        self.way_refs.contains_key(&way_id)
    }

    pub fn displayed_ways(&self) -> impl Iterator<Item = WayId> + '_ {
        self.way_refs.keys().copied()
    }

    pub fn displayed_way_count(&self) -> usize {
        self.way_refs.len()
    }

    pub fn displayed_point_count(&self) -> usize {
        self.displayed_points
    }
}
