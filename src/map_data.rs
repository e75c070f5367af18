use crate::types::{tag_value, BoundingBox, LatLong, Tag};

pub type PointId = i64;
pub type WayId = i64;

/// Points and ways live in separate id spaces, as in the source documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Point(PointId),
    Way(WayId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: PointId,
    pub position: LatLong,
    pub tags: Vec<Tag>,
}

impl Point {
    pub fn new(id: PointId, position: LatLong, tags: Vec<Tag>) -> Self {
        Self { id, position, tags }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        tag_value(&self.tags, key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: WayId,
    /// Vertex references in document order. Duplicates are allowed.
    pub node_ids: Vec<PointId>,
    pub tags: Vec<Tag>,
    /// Box over the vertices that resolved at ingestion time, `None` when
    /// none did.
    pub bounding_box: Option<BoundingBox>,
}

impl Way {
    pub fn new(
        id: WayId,
        node_ids: Vec<PointId>,
        tags: Vec<Tag>,
        bounding_box: Option<BoundingBox>,
    ) -> Self {
        Self {
            id,
            node_ids,
            tags,
            bounding_box,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        tag_value(&self.tags, key)
    }

    /// First vertex repeated as the last one.
    pub fn is_closed(&self) -> bool {
        self.node_ids.len() > 2 && self.node_ids.first() == self.node_ids.last()
    }

    /// Ways carrying a `highway` tag form the road network.
    pub fn is_road(&self) -> bool {
        self.tag("highway").is_some()
    }
}
