use std::env;
use std::sync::Arc;

use streetgrid::{
    ingest_path, BoundingBox, GridIndex, SceneLedger, TilePlanner, Viewport, ViewportTracker,
};

const ZOOM_LEVEL: u8 = 16;
const STEPS: usize = 10;

fn main() {
    let args: Vec<String> = env::args().collect();
    let Some(map_path) = args.get(1) else {
        println!("usage: walk <map.osm>");
        return;
    };

    let store = match ingest_path(map_path) {
        Ok(store) => store,
        Err(e) => {
            println!("Error reading map document: {}", e);
            return;
        }
    };
    let Some(bounds) = store.bounds() else {
        println!("Map document has no points");
        return;
    };
    let grid = match GridIndex::build(&store, 0.01) {
        Ok(grid) => Arc::new(grid),
        Err(e) => {
            println!("Error building grid: {}", e);
            return;
        }
    };

    // A viewport a fifth of the dataset wide, sliding west to east.
    let height = (bounds.max_latitude - bounds.min_latitude) / 5.0;
    let width = (bounds.max_longitude - bounds.min_longitude) / 5.0;
    let center = bounds.get_center_point();
    let step = (bounds.max_longitude - bounds.min_longitude - width) / STEPS as f64;

    let mut tracker = ViewportTracker::new(grid.clone());
    let mut ledger = SceneLedger::new();
    for i in 0..=STEPS {
        let min_longitude = bounds.min_longitude + step * i as f64;
        let view = BoundingBox {
            min_latitude: center.latitude - height / 2.0,
            min_longitude,
            max_latitude: center.latitude + height / 2.0,
            max_longitude: min_longitude + width,
        };
        let delta = tracker.update(Viewport::new(view, ZOOM_LEVEL));
        let change = ledger.apply(&delta, &grid);
        let tiles = TilePlanner::plan_tiles(&view, ZOOM_LEVEL)
            .map(|tiles| tiles.len())
            .unwrap_or(0);
        println!(
            "step {:2}: +{} -{} cells, +{} -{} ways, +{} -{} points, {} ways shown, {} tiles",
            i,
            delta.added.len(),
            delta.removed.len(),
            change.draw_ways.len(),
            change.erase_ways.len(),
            change.draw_points.len(),
            change.erase_points.len(),
            ledger.displayed_way_count(),
            tiles
        );
    }
}
