use std::collections::HashMap;

use tracing::debug;

use crate::dictionary::{TagDictionary, TravelModes};
use crate::errors::MapError;
use crate::map_data::{EntityId, Point, PointId, Way, WayId};
use crate::types::{BoundingBox, LatLong, Tag};

/// Normalized, read-only entity tables with their secondary indexes.
///
/// A store only exists once ingestion (or a snapshot load) has finished:
/// the sole way to obtain one is [`EntityStoreBuilder::build`], so readers
/// never observe a partially populated store. Every query is total.
#[derive(Debug)]
pub struct EntityStore {
    points: Vec<Point>,
    point_index: HashMap<PointId, usize>,
    ways: Vec<Way>,
    way_index: HashMap<WayId, usize>,
    /// Point slots ordered by latitude, for range scans.
    by_latitude: Vec<usize>,
    /// Slots of ways with a bounding box, ordered by their minimum latitude.
    ways_by_min_latitude: Vec<usize>,
    owners: HashMap<PointId, Vec<WayId>>,
    road_classes: HashMap<PointId, String>,
    bounds: Option<BoundingBox>,
    unresolved_references: usize,
}

/// Exclusive writer used while a dataset is being loaded.
///
/// Ways resolve their vertices against the points added so far, so point
/// definitions must precede the ways referencing them. References that do not
/// resolve are counted and left out of the way's bounding box.
#[derive(Debug, Default)]
pub struct EntityStoreBuilder {
    points: Vec<Point>,
    point_index: HashMap<PointId, usize>,
    ways: Vec<Way>,
    way_index: HashMap<WayId, usize>,
    declared_bounds: Option<BoundingBox>,
    unresolved_references: usize,
}

impl EntityStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_declared_bounds(&mut self, bounds: BoundingBox) {
        self.declared_bounds = Some(bounds);
    }

    /// A repeated id replaces the earlier definition.
    pub fn add_point(&mut self, point: Point) {
        match self.point_index.get(&point.id) {
            Some(&slot) => self.points[slot] = point,
            None => {
                self.point_index.insert(point.id, self.points.len());
                self.points.push(point);
            }
        }
    }

    pub fn position_of(&self, id: PointId) -> Option<LatLong> {
        self.point_index
            .get(&id)
            .map(|&slot| self.points[slot].position)
    }

    pub fn add_way(&mut self, id: WayId, node_ids: Vec<PointId>, tags: Vec<Tag>) -> &Way {
        let mut bbox = BoundingBox::empty();
        for &node_id in &node_ids {
            match self.position_of(node_id) {
                Some(position) => bbox.expand(position),
                None => {
                    self.unresolved_references += 1;
                    debug!(
                        "{}",
                        MapError::MissingReference {
                            way_id: id,
                            node_id
                        }
                    );
                }
            }
        }
        let bounding_box = if bbox.is_empty() { None } else { Some(bbox) };
        let way = Way::new(id, node_ids, tags, bounding_box);

        let slot = match self.way_index.get(&id) {
            Some(&slot) => {
                self.ways[slot] = way;
                slot
            }
            None => {
                self.way_index.insert(id, self.ways.len());
                self.ways.push(way);
                self.ways.len() - 1
            }
        };
        &self.ways[slot]
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    /// Build the reverse and range indexes and publish the store.
    pub fn build(self) -> EntityStore {
        let mut owners: HashMap<PointId, Vec<WayId>> = HashMap::new();
        let mut road_classes: HashMap<PointId, String> = HashMap::new();
        for way in &self.ways {
            let highway = way.tag("highway");
            for &node_id in &way.node_ids {
                // Unresolved references stay out of the reverse indexes.
                if !self.point_index.contains_key(&node_id) {
                    continue;
                }
                let owning = owners.entry(node_id).or_default();
                if owning.last() != Some(&way.id) && !owning.contains(&way.id) {
                    owning.push(way.id);
                }
                if let Some(class) = highway {
                    road_classes
                        .entry(node_id)
                        .or_insert_with(|| class.to_string());
                }
            }
        }

        let mut by_latitude: Vec<usize> = (0..self.points.len()).collect();
        by_latitude.sort_by(|&a, &b| {
            let (pa, pb) = (&self.points[a], &self.points[b]);
            pa.position
                .latitude
                .total_cmp(&pb.position.latitude)
                .then(pa.id.cmp(&pb.id))
        });

        let mut ways_by_min_latitude: Vec<usize> = self
            .ways
            .iter()
            .enumerate()
            .filter(|(_, way)| way.bounding_box.is_some())
            .map(|(slot, _)| slot)
            .collect();
        ways_by_min_latitude.sort_by(|&a, &b| {
            let min_lat = |slot: usize| {
                self.ways[slot]
                    .bounding_box
                    .map_or(f64::INFINITY, |bbox| bbox.min_latitude)
            };
            min_lat(a).total_cmp(&min_lat(b))
        });

        let bounds = self.declared_bounds.or_else(|| {
            let mut bbox = BoundingBox::empty();
            for point in &self.points {
                bbox.expand(point.position);
            }
            (!bbox.is_empty()).then_some(bbox)
        });

        EntityStore {
            points: self.points,
            point_index: self.point_index,
            ways: self.ways,
            way_index: self.way_index,
            by_latitude,
            ways_by_min_latitude,
            owners,
            road_classes,
            bounds,
            unresolved_references: self.unresolved_references,
        }
    }
}

impl EntityStore {
    /// Every point inside `bbox`, boundary included. Backed by a range scan
    /// over the latitude index.
    pub fn points_in_box<'a>(&'a self, bbox: &BoundingBox) -> impl Iterator<Item = &'a Point> + 'a {
        let bbox = *bbox;
        let start = if bbox.is_empty() {
            self.by_latitude.len()
        } else {
            self.by_latitude
                .partition_point(|&slot| self.points[slot].position.latitude < bbox.min_latitude)
        };
        self.by_latitude[start..]
            .iter()
            .map(move |&slot| &self.points[slot])
            .take_while(move |point| point.position.latitude <= bbox.max_latitude)
            .filter(move |point| bbox.contains(point.position.latitude, point.position.longitude))
    }

    /// Every way whose bounding box intersects `bbox`. This over-approximates
    /// the ways with geometry inside `bbox`. Ways without any resolved vertex
    /// never match.
    pub fn ways_in_box<'a>(&'a self, bbox: &BoundingBox) -> impl Iterator<Item = &'a Way> + 'a {
        let bbox = *bbox;
        self.ways_by_min_latitude
            .iter()
            .map(move |&slot| &self.ways[slot])
            .take_while(move |way| {
                way.bounding_box
                    .map_or(false, |own| own.min_latitude <= bbox.max_latitude)
            })
            .filter(move |way| way.bounding_box.map_or(false, |own| own.intersects(&bbox)))
    }

    /// Tags of an entity, empty for unknown ids.
    pub fn tags_of(&self, id: EntityId) -> &[Tag] {
        match id {
            EntityId::Point(id) => self.point(id).map(|p| p.tags.as_slice()),
            EntityId::Way(id) => self.way(id).map(|w| w.tags.as_slice()),
        }
        .unwrap_or(&[])
    }

    /// First way, in document order, that references the point.
    pub fn owner_way(&self, point_id: PointId) -> Option<WayId> {
        self.owner_ways(point_id).first().copied()
    }

    pub fn owner_ways(&self, point_id: PointId) -> &[WayId] {
        self.owners
            .get(&point_id)
            .map(|ways| ways.as_slice())
            .unwrap_or(&[])
    }

    pub fn point(&self, id: PointId) -> Option<&Point> {
        self.point_index.get(&id).map(|&slot| &self.points[slot])
    }

    pub fn way(&self, id: WayId) -> Option<&Way> {
        self.way_index.get(&id).map(|&slot| &self.ways[slot])
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    pub fn ways(&self) -> impl Iterator<Item = &Way> {
        self.ways.iter()
    }

    /// Resolved vertices of a way, in order. Unresolved references are skipped.
    pub fn way_geometry(&self, way: &Way) -> Vec<LatLong> {
        way.node_ids
            .iter()
            .filter_map(|&id| self.point(id).map(|p| p.position))
            .collect()
    }

    /// Whether any `highway` way references the point.
    pub fn is_road_node(&self, point_id: PointId) -> bool {
        self.road_classes.contains_key(&point_id)
    }

    /// `highway` value of the first road way referencing the point.
    pub fn road_class(&self, point_id: PointId) -> Option<&str> {
        self.road_classes.get(&point_id).map(|class| class.as_str())
    }

    pub fn is_routable(
        &self,
        point_id: PointId,
        modes: TravelModes,
        dictionary: &TagDictionary,
    ) -> bool {
        self.road_class(point_id)
            .map_or(false, |class| dictionary.allows(class, modes))
    }

    /// Closest routable point within a square window of `radius` degrees
    /// around `position`.
    pub fn nearest_routable(
        &self,
        position: LatLong,
        radius: f64,
        modes: TravelModes,
        dictionary: &TagDictionary,
    ) -> Option<&Point> {
        let window = BoundingBox {
            min_latitude: position.latitude - radius,
            min_longitude: position.longitude - radius,
            max_latitude: position.latitude + radius,
            max_longitude: position.longitude + radius,
        };
        let distance = |point: &Point| {
            let d_lat = point.position.latitude - position.latitude;
            let d_lon = point.position.longitude - position.longitude;
            d_lat * d_lat + d_lon * d_lon
        };
        self.points_in_box(&window)
            .filter(|point| self.is_routable(point.id, modes, dictionary))
            .min_by(|a, b| distance(a).total_cmp(&distance(b)))
    }

    /// Declared `<bounds>` of the document, or the box over all points.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    /// Way vertices that named no known point at ingestion time.
    pub fn unresolved_references(&self) -> usize {
        self.unresolved_references
    }
}
