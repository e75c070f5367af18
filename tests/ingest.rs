#[cfg(test)]
mod tests {
    use std::io::Write;

    use env_logger;
    use streetgrid::{ingest, ingest_path, BoundingBox, EntityId, LatLong, MapError, Tag};
    use tracing::info;

    const SHANGHAI: &str = include_str!("data/shanghai.osm");

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn reads_points_ways_and_tags() {
        init();
        let store = ingest(SHANGHAI.as_bytes()).unwrap();
        info!("{:?}", store.bounds());

        assert_eq!(store.point_count(), 7);
        assert_eq!(store.way_count(), 3);

        let cafe = store.point(7).unwrap();
        assert_eq!(cafe.position, LatLong::new(31.225, 121.466));
        assert_eq!(
            cafe.tags,
            vec![Tag::new("amenity", "cafe"), Tag::new("name", "Tea & Cake")]
        );
        assert!(store.point(1).unwrap().tags.is_empty());

        let road = store.way(100).unwrap();
        assert_eq!(road.node_ids, vec![1, 2, 3]);
        assert_eq!(road.tag("name"), Some("Nanjing Road"));
        assert_eq!(
            road.bounding_box,
            Some(BoundingBox::new(31.23, 121.47, 31.235, 121.485).unwrap())
        );

        let building = store.way(102).unwrap();
        assert!(building.is_closed());
        assert!(!building.is_road());
    }

    #[test]
    fn declared_bounds_win_over_point_extent() {
        let store = ingest(SHANGHAI.as_bytes()).unwrap();
        assert_eq!(
            store.bounds(),
            Some(BoundingBox::new(31.22, 121.46, 31.24, 121.49).unwrap())
        );

        let xml = r#"<osm>
            <node id="1" lat="1.5" lon="2.5"/>
            <node id="2" lat="-1.0" lon="3.0"/>
        </osm>"#;
        let store = ingest(xml.as_bytes()).unwrap();
        assert_eq!(
            store.bounds(),
            Some(BoundingBox::new(-1.0, 2.5, 1.5, 3.0).unwrap())
        );
    }

    #[test]
    fn missing_reference_keeps_the_way() {
        init();
        let store = ingest(SHANGHAI.as_bytes()).unwrap();

        let footway = store.way(101).unwrap();
        assert_eq!(footway.node_ids, vec![2, 99, 1]);
        assert_eq!(
            footway.bounding_box,
            Some(BoundingBox::new(31.23, 121.47, 31.235, 121.475).unwrap())
        );
        assert_eq!(store.unresolved_references(), 1);
        assert_eq!(
            store.way_geometry(footway),
            vec![LatLong::new(31.235, 121.475), LatLong::new(31.23, 121.47)]
        );
    }

    #[test]
    fn way_without_resolved_vertices_has_no_box() {
        let xml = r#"<osm>
            <node id="1" lat="1.0" lon="1.0"/>
            <way id="10"><nd ref="7"/><nd ref="8"/><tag k="highway" v="path"/></way>
        </osm>"#;
        let store = ingest(xml.as_bytes()).unwrap();
        let way = store.way(10).unwrap();
        assert_eq!(way.bounding_box, None);
        assert_eq!(store.unresolved_references(), 2);

        let everywhere = BoundingBox::new(-90.0, -180.0, 90.0, 180.0).unwrap();
        assert_eq!(store.ways_in_box(&everywhere).count(), 0);
    }

    #[test]
    fn reverse_indexes() {
        let store = ingest(SHANGHAI.as_bytes()).unwrap();

        assert_eq!(store.owner_way(1), Some(100));
        assert_eq!(store.owner_ways(1), &[100, 101]);
        assert_eq!(store.owner_ways(4), &[102]);
        assert_eq!(store.owner_way(99), None);
        assert_eq!(store.owner_ways(12345), &[] as &[i64]);

        assert!(store.is_road_node(3));
        assert!(!store.is_road_node(5));
        assert!(!store.is_road_node(99));
        assert_eq!(store.road_class(2), Some("primary"));
        assert_eq!(store.road_class(7), None);

        assert_eq!(store.tags_of(EntityId::Way(102)), &[Tag::new("building", "yes")]);
        assert!(store.tags_of(EntityId::Point(424242)).is_empty());
        assert!(store.tags_of(EntityId::Way(424242)).is_empty());
    }

    #[test]
    fn malformed_documents_fail() {
        init();
        let cases = [
            "",
            "<osm><node id=\"1\" lat=\"1\" lon=\"1\"></osm>",
            "<osm><way id=\"x\"></way></osm>",
            "<osm><node id=\"1\" lat=\"95.0\" lon=\"1\"/></osm>",
            "<osm><way id=\"1\"><nd/></way></osm>",
            "<osm><bounds minlat=\"2\" minlon=\"0\" maxlat=\"1\" maxlon=\"1\"/></osm>",
        ];
        for xml in cases {
            match ingest(xml.as_bytes()) {
                Err(MapError::MalformedDocument { line, message }) => {
                    info!("line {}: {}", line, message);
                    assert!(line >= 1);
                }
                other => panic!("expected a malformed document for {:?}, got {:?}", xml, other),
            }
        }
    }

    #[test]
    fn reads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SHANGHAI.as_bytes()).unwrap();
        let store = ingest_path(file.path()).unwrap();
        assert_eq!(store.point_count(), 7);

        let missing = file.path().with_extension("does-not-exist");
        assert!(matches!(ingest_path(missing), Err(MapError::Io(_))));
    }
}
