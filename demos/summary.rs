use std::env;

use streetgrid::{ingest_path, GridIndex, TagDictionary, TravelModes};

fn main() {
    let args: Vec<String> = env::args().collect();
    let Some(map_path) = args.get(1) else {
        println!("usage: summary <map.osm> [cell size in degrees]");
        return;
    };
    let cell_size = args
        .get(2)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0.01);

    let store = match ingest_path(map_path) {
        Ok(store) => store,
        Err(e) => {
            println!("Error reading map document: {}", e);
            return;
        }
    };

    println!("Map document: {}", map_path);
    println!("  Points: {}", store.point_count());
    println!("  Ways: {}", store.way_count());
    println!("  Unresolved references: {}", store.unresolved_references());
    match store.bounds() {
        Some(bounds) => println!("  Bounds: {:?}", bounds),
        None => println!("  Bounds: none"),
    }

    let dictionary = TagDictionary::default();
    let roads = store.ways().filter(|way| way.is_road()).count();
    let areas = store
        .ways()
        .filter(|way| way.is_closed() && dictionary.is_enclosed(&way.tags))
        .count();
    let walkable = store
        .points()
        .filter(|point| store.is_routable(point.id, TravelModes::walking(), &dictionary))
        .count();
    println!("  Roads: {}", roads);
    println!("  Enclosed areas: {}", areas);
    println!("  Walkable nodes: {}", walkable);

    match GridIndex::build(&store, cell_size) {
        Ok(grid) => {
            println!("Grid ({} degrees):", grid.cell_size());
            println!("  Populated cells: {}", grid.populated_cells());
            if let Some(bounds) = store.bounds() {
                println!("  Cells over bounds: {}", grid.cells_in_box(&bounds).len());
            }
        }
        Err(e) => println!("Error building grid: {}", e),
    }
}
