#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::thread;

    use streetgrid::{
        ingest, BoundingBox, CellKey, EntityStoreBuilder, GridIndex, SceneLedger, Viewport,
        ViewportTracker,
    };
    use tracing::info;

    const SHANGHAI: &str = include_str!("data/shanghai.osm");

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn keys(pairs: &[(i64, i64)]) -> BTreeSet<CellKey> {
        pairs.iter().map(|&pair| CellKey::from(pair)).collect()
    }

    fn empty_grid() -> Arc<GridIndex> {
        Arc::new(GridIndex::build(&EntityStoreBuilder::new().build(), 0.01).unwrap())
    }

    fn view(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Viewport {
        Viewport::new(
            BoundingBox::new(min_lat, min_lon, max_lat, max_lon).unwrap(),
            15,
        )
    }

    /// One way crossing three cells along latitude 0.005.
    const LONG_ROAD: &str = r#"<osm>
        <node id="1" lat="0.005" lon="0.005"/>
        <node id="2" lat="0.005" lon="0.015"/>
        <node id="3" lat="0.005" lon="0.025"/>
        <way id="7">
            <nd ref="1"/><nd ref="2"/><nd ref="3"/>
            <tag k="highway" v="residential"/>
        </way>
    </osm>"#;

    #[test]
    fn pan_reports_only_the_difference() {
        init();
        let mut tracker = ViewportTracker::new(empty_grid());
        assert!(!tracker.is_tracking());

        let first = tracker.update(view(0.001, 0.001, 0.019, 0.009));
        assert_eq!(first.added, keys(&[(0, 0), (0, 1)]));
        assert!(first.removed.is_empty());

        let second = tracker.update(view(0.011, 0.001, 0.029, 0.009));
        assert_eq!(second.added, keys(&[(0, 2)]));
        assert_eq!(second.removed, keys(&[(0, 0)]));
        assert!(second.added.is_disjoint(&second.removed));
        assert_eq!(tracker.current_cells(), Some(&keys(&[(0, 1), (0, 2)])));
    }

    #[test]
    fn same_viewport_twice_is_a_no_op() {
        let mut tracker = ViewportTracker::new(empty_grid());
        let viewport = view(0.001, 0.001, 0.039, 0.019);
        assert!(!tracker.update(viewport).is_empty());
        assert!(tracker.update(viewport).is_empty());
        assert!(tracker.update(viewport).is_empty());
        assert_eq!(tracker.current_viewport(), Some(viewport));
    }

    #[test]
    fn empty_viewport_evicts_everything() {
        let mut tracker = ViewportTracker::new(empty_grid());
        tracker.update(view(0.001, 0.001, 0.019, 0.009));

        let delta = tracker.update(Viewport::new(BoundingBox::empty(), 15));
        assert!(delta.added.is_empty());
        assert_eq!(delta.removed, keys(&[(0, 0), (0, 1)]));
        assert!(tracker.is_tracking());
        assert_eq!(tracker.current_cells(), Some(&BTreeSet::new()));
    }

    #[test]
    fn reset_forgets_without_evicting() {
        let mut tracker = ViewportTracker::new(empty_grid());
        let viewport = view(0.001, 0.001, 0.019, 0.009);
        tracker.update(viewport);

        tracker.reset();
        assert!(!tracker.is_tracking());
        assert_eq!(tracker.current_cells(), None);

        let delta = tracker.update(viewport);
        assert_eq!(delta.added, keys(&[(0, 0), (0, 1)]));
        assert!(delta.removed.is_empty());
    }

    #[test]
    fn way_spanning_cells_is_drawn_once() {
        init();
        let store = ingest(LONG_ROAD.as_bytes()).unwrap();
        let grid = Arc::new(GridIndex::build(&store, 0.01).unwrap());
        let mut tracker = ViewportTracker::new(grid.clone());
        let mut ledger = SceneLedger::new();

        let delta = tracker.update(view(0.001, 0.001, 0.009, 0.029));
        assert_eq!(delta.added, keys(&[(0, 0), (1, 0), (2, 0)]));
        let change = ledger.apply(&delta, &grid);
        info!("{:?}", change);
        assert_eq!(change.draw_ways, vec![7]);
        assert_eq!(change.draw_points.len(), 3);
        assert!(change.erase_ways.is_empty());

        // Only the eastern cell stays on screen: the way must survive.
        let delta = tracker.update(view(0.001, 0.021, 0.009, 0.029));
        let change = ledger.apply(&delta, &grid);
        assert!(change.draw_ways.is_empty());
        assert!(change.erase_ways.is_empty());
        assert_eq!(change.erase_points.len(), 2);
        assert!(ledger.is_way_displayed(7));

        let delta = tracker.update(view(0.001, 0.041, 0.009, 0.049));
        let change = ledger.apply(&delta, &grid);
        assert_eq!(change.erase_ways, vec![7]);
        assert!(!ledger.is_way_displayed(7));
        assert_eq!(ledger.displayed_point_count(), 0);
    }

    #[test]
    fn shifting_cells_under_a_visible_way_does_not_redraw_it() {
        let store = ingest(LONG_ROAD.as_bytes()).unwrap();
        let grid = Arc::new(GridIndex::build(&store, 0.01).unwrap());
        let mut tracker = ViewportTracker::new(grid.clone());
        let mut ledger = SceneLedger::new();

        ledger.apply(&tracker.update(view(0.001, 0.001, 0.009, 0.009)), &grid);
        assert!(ledger.is_way_displayed(7));

        let change = ledger.apply(&tracker.update(view(0.001, 0.011, 0.009, 0.019)), &grid);
        assert!(change.draw_ways.is_empty());
        assert!(change.erase_ways.is_empty());
        assert_eq!(ledger.displayed_way_count(), 1);

        tracker.reset();
        ledger.clear();
        let change = ledger.apply(&tracker.update(view(0.001, 0.011, 0.009, 0.019)), &grid);
        assert_eq!(change.draw_ways, vec![7]);
    }

    #[test]
    fn trackers_share_one_index_across_threads() {
        let store = ingest(SHANGHAI.as_bytes()).unwrap();
        let grid = Arc::new(GridIndex::build(&store, 0.01).unwrap());
        let bounds = store.bounds().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let grid = grid.clone();
                thread::spawn(move || {
                    let mut tracker = ViewportTracker::new(grid);
                    tracker.update(Viewport::new(bounds, 14)).added
                })
            })
            .collect();

        let results: Vec<BTreeSet<CellKey>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(results[0], grid.cells_in_box(&bounds));
    }
}
