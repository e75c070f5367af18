use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info};

use crate::errors::{MapError, Result};
use crate::map_data::{Point, PointId, WayId};
use crate::store::{EntityStore, EntityStoreBuilder};
use crate::types::{BoundingBox, LatLong, Tag};

const PROGRESS_INTERVAL: usize = 100_000;

type Parsed<T> = std::result::Result<T, String>;

/// Read a map document in one forward pass and publish the finished store.
///
/// Point elements must precede the ways that reference them. A way vertex
/// naming an unknown point is counted and skipped; it never fails the load.
/// Any parse failure discards everything read so far.
pub fn ingest<R: BufRead>(source: R) -> Result<EntityStore> {
    let started = Instant::now();
    let store = OsmXmlReader::new(source).read()?;
    info!(
        "Ingested {} points and {} ways in {:?} ({} unresolved references)",
        store.point_count(),
        store.way_count(),
        started.elapsed(),
        store.unresolved_references()
    );
    Ok(store)
}

pub fn ingest_path<P: AsRef<Path>>(path: P) -> Result<EntityStore> {
    let path = path.as_ref();
    info!("Reading map document {}", path.display());
    let file = File::open(path)?;
    ingest(BufReader::new(file))
}

/// Attribute values of one element, unescaped.
struct Attributes {
    map: HashMap<String, String>,
}

impl Attributes {
    fn from(element: &BytesStart) -> Parsed<Self> {
        let mut map = HashMap::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            map.insert(
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value.into_owned(),
            );
        }
        Ok(Attributes { map })
    }

    fn get_required(&self, key: &str) -> Parsed<&str> {
        self.map
            .get(key)
            .map(|value| value.as_str())
            .ok_or_else(|| format!("Required attribute '{}' missing.", key))
    }

    fn get_parse<F: FromStr>(&self, field: &str) -> Parsed<F> {
        let raw = self.get_required(field)?;
        raw.trim().parse().map_err(|_| {
            format!(
                "The '{}' attribute contains invalid data '{}'.",
                field, raw
            )
        })
    }

    fn get_degrees(&self, field: &str, limit: f64) -> Parsed<f64> {
        let value: f64 = self.get_parse(field)?;
        if !value.is_finite() || value.abs() > limit {
            return Err(format!(
                "The '{}' attribute is out of range: {}.",
                field, value
            ));
        }
        Ok(value)
    }

    fn create_position(&self) -> Parsed<LatLong> {
        Ok(LatLong::new(
            self.get_degrees("lat", 90.0)?,
            self.get_degrees("lon", 180.0)?,
        ))
    }

    fn create_boundary(&self) -> Parsed<BoundingBox> {
        BoundingBox::new(
            self.get_degrees("minlat", 90.0)?,
            self.get_degrees("minlon", 180.0)?,
            self.get_degrees("maxlat", 90.0)?,
            self.get_degrees("maxlon", 180.0)?,
        )
        .map_err(|e| e.to_string())
    }

    fn create_tag(&self) -> Parsed<Tag> {
        Ok(Tag::new(self.get_required("k")?, self.get_required("v")?))
    }
}

/// Element whose children are still being read.
enum Pending {
    Point {
        id: PointId,
        position: LatLong,
        tags: Vec<Tag>,
    },
    Way {
        id: WayId,
        node_ids: Vec<PointId>,
        tags: Vec<Tag>,
    },
    /// Relations and unknown containers, opened at `depth`. Everything
    /// inside them is read and dropped.
    Skipped { depth: usize },
}

struct OsmXmlReader<R: BufRead> {
    reader: Reader<R>,
    line: u64,
    depth: usize,
    pending: Option<Pending>,
    builder: EntityStoreBuilder,
}

impl<R: BufRead> OsmXmlReader<R> {
    fn new(inner: R) -> Self {
        OsmXmlReader {
            reader: Reader::from_reader(inner),
            line: 1,
            depth: 0,
            pending: None,
            builder: EntityStoreBuilder::new(),
        }
    }

    fn read(mut self) -> Result<EntityStore> {
        let mut buf = Vec::new();
        let mut seen_root = false;
        loop {
            let event = match self.reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(quick_xml::Error::Io(e)) => {
                    return Err(MapError::Io(io::Error::new(e.kind(), e.to_string())))
                }
                Err(e) => return Err(MapError::malformed(self.line, e.to_string())),
            };
            let outcome = match event {
                Event::Start(ref element) => {
                    seen_root = true;
                    self.depth += 1;
                    self.open(element, false)
                }
                Event::Empty(ref element) => {
                    seen_root = true;
                    self.open(element, true)
                }
                Event::End(ref element) => {
                    self.depth = self.depth.saturating_sub(1);
                    self.close(element)
                }
                Event::Eof => break,
                _ => Ok(()),
            };
            outcome.map_err(|message| MapError::malformed(self.line, message))?;

            self.line += buf.iter().filter(|b| **b == b'\n').count() as u64;
            buf.clear();
        }

        if !seen_root {
            return Err(MapError::malformed(self.line, "document has no elements"));
        }
        if self.depth > 0 || self.pending.is_some() {
            return Err(MapError::malformed(
                self.line,
                "unexpected end of document inside an open element",
            ));
        }
        Ok(self.builder.build())
    }

    fn open(&mut self, element: &BytesStart, is_empty: bool) -> Parsed<()> {
        if let Some(Pending::Skipped { .. }) = self.pending {
            return Ok(());
        }
        match element.name().as_ref() {
            b"node" => {
                self.expect_top_level("node")?;
                let attributes = Attributes::from(element)?;
                let id = attributes.get_parse("id")?;
                let position = attributes.create_position()?;
                if is_empty {
                    self.add_point(Point::new(id, position, Vec::new()));
                } else {
                    self.pending = Some(Pending::Point {
                        id,
                        position,
                        tags: Vec::new(),
                    });
                }
            }
            b"way" => {
                self.expect_top_level("way")?;
                let id = Attributes::from(element)?.get_parse("id")?;
                if is_empty {
                    self.builder.add_way(id, Vec::new(), Vec::new());
                } else {
                    self.pending = Some(Pending::Way {
                        id,
                        node_ids: Vec::new(),
                        tags: Vec::new(),
                    });
                }
            }
            b"bounds" => {
                let bounds = Attributes::from(element)?.create_boundary()?;
                self.builder.set_declared_bounds(bounds);
            }
            b"tag" => {
                let tag = Attributes::from(element)?.create_tag()?;
                match self.pending.as_mut() {
                    Some(Pending::Point { tags, .. }) | Some(Pending::Way { tags, .. }) => {
                        tags.push(tag)
                    }
                    _ => {}
                }
            }
            b"nd" => {
                let node_id = Attributes::from(element)?.get_parse("ref")?;
                if let Some(Pending::Way { node_ids, .. }) = self.pending.as_mut() {
                    node_ids.push(node_id);
                }
            }
            b"osm" => {}
            _ => {
                // Containers we do not model are consumed up to their end tag.
                if !is_empty && self.pending.is_none() && self.depth > 1 {
                    self.pending = Some(Pending::Skipped { depth: self.depth });
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, element: &BytesEnd) -> Parsed<()> {
        let name = element.name();
        let finishes = match &self.pending {
            Some(Pending::Point { .. }) => name.as_ref() == b"node",
            Some(Pending::Way { .. }) => name.as_ref() == b"way",
            Some(Pending::Skipped { depth }) => self.depth + 1 == *depth,
            None => false,
        };
        if !finishes {
            return Ok(());
        }

        match self.pending.take() {
            Some(Pending::Point { id, position, tags }) => {
                self.add_point(Point::new(id, position, tags))
            }
            Some(Pending::Way { id, node_ids, tags }) => {
                self.builder.add_way(id, node_ids, tags);
                let ways = self.builder.way_count();
                if ways % PROGRESS_INTERVAL == 0 {
                    debug!("Read {} ways", ways);
                }
            }
            Some(Pending::Skipped { .. }) | None => {}
        }
        Ok(())
    }

    fn add_point(&mut self, point: Point) {
        self.builder.add_point(point);
        let points = self.builder.point_count();
        if points % PROGRESS_INTERVAL == 0 {
            debug!("Read {} points", points);
        }
    }

    fn expect_top_level(&self, name: &str) -> Parsed<()> {
        match self.pending {
            None => Ok(()),
            Some(_) => Err(format!("Unexpected <{}> nested inside another element.", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_line_of_bad_attribute() {
        let xml = "<osm>\n<node id=\"1\" lat=\"1.0\" lon=\"2.0\"/>\n<node id=\"2\" lat=\"north\" lon=\"2.0\"/>\n</osm>";
        match ingest(xml.as_bytes()) {
            Err(MapError::MalformedDocument { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("'lat'"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_attribute_is_malformed() {
        let xml = r#"<osm><node id="1" lat="1.0"/></osm>"#;
        assert!(matches!(
            ingest(xml.as_bytes()),
            Err(MapError::MalformedDocument { .. })
        ));
    }

    #[test]
    fn truncated_document_is_malformed() {
        let xml = r#"<osm><way id="1"><nd ref="1"/>"#;
        assert!(matches!(
            ingest(xml.as_bytes()),
            Err(MapError::MalformedDocument { .. })
        ));
    }

    #[test]
    fn relation_children_are_skipped() {
        let xml = r#"<osm>
            <node id="1" lat="1.0" lon="1.0"/>
            <relation id="9">
                <member type="node" ref="1" role=""/>
                <tag k="type" v="route"/>
            </relation>
        </osm>"#;
        let store = ingest(xml.as_bytes()).unwrap();
        assert_eq!(store.point_count(), 1);
        assert_eq!(store.way_count(), 0);
        assert!(store.point(1).unwrap().tags.is_empty());
    }

    #[test]
    fn entities_inside_unknown_containers_are_skipped() {
        let xml = r#"<osm>
            <node id="1" lat="1.0" lon="1.0"/>
            <extension>
                <node id="2" lat="2.0" lon="2.0"/>
                <way id="3"><nd ref="1"/><nd ref="2"/></way>
                <extension><node id="4" lat="4.0" lon="4.0"/></extension>
                <node id="5" lat="5.0" lon="5.0"/>
            </extension>
            <node id="6" lat="6.0" lon="6.0"/>
        </osm>"#;
        let store = ingest(xml.as_bytes()).unwrap();
        let mut ids: Vec<PointId> = store.points().map(|point| point.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 6]);
        assert_eq!(store.way_count(), 0);
    }
}
