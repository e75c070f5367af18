//! Binary snapshot of a finished entity store.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! magic "SGRD" | version u16
//! bounds flag u8 | [min_lat min_lon max_lat max_lon: f64]
//! point count u64 | { id i64 | lat f64 | lon f64 | tags }*
//! way count u64   | { id i64 | ref count u32 | ref i64* | tags }*
//! tags = count u32 | { key string | value string }*
//! string = length u32 | UTF-8 bytes
//! ```
//!
//! Loading replays the tables through [`EntityStoreBuilder`], so way boxes and
//! every secondary index are rebuilt rather than read back.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Instant;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::{info, warn};

use crate::errors::{MapError, Result};
use crate::ingest::ingest_path;
use crate::map_data::Point;
use crate::store::{EntityStore, EntityStoreBuilder};
use crate::types::{BoundingBox, LatLong, Tag};

const MAGIC: &[u8; 4] = b"SGRD";
const VERSION: u16 = 1;
const MAXIMUM_STRING_LENGTH: usize = 1024 * 1024;
const PREALLOCATION_LIMIT: usize = 1 << 16;

pub fn write<W: Write>(store: &EntityStore, writer: &mut W) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_u16::<BigEndian>(VERSION)?;

    match store.bounds() {
        Some(bounds) => {
            writer.write_u8(1)?;
            for value in [
                bounds.min_latitude,
                bounds.min_longitude,
                bounds.max_latitude,
                bounds.max_longitude,
            ] {
                writer.write_f64::<BigEndian>(value)?;
            }
        }
        None => writer.write_u8(0)?,
    }

    writer.write_u64::<BigEndian>(store.point_count() as u64)?;
    for point in store.points() {
        writer.write_i64::<BigEndian>(point.id)?;
        writer.write_f64::<BigEndian>(point.position.latitude)?;
        writer.write_f64::<BigEndian>(point.position.longitude)?;
        write_tags(writer, &point.tags)?;
    }

    writer.write_u64::<BigEndian>(store.way_count() as u64)?;
    for way in store.ways() {
        writer.write_i64::<BigEndian>(way.id)?;
        writer.write_u32::<BigEndian>(way.node_ids.len() as u32)?;
        for &node_id in &way.node_ids {
            writer.write_i64::<BigEndian>(node_id)?;
        }
        write_tags(writer, &way.tags)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read<R: Read>(reader: &mut R) -> Result<EntityStore> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(truncated)?;
    if &magic != MAGIC {
        return Err(MapError::InvalidSnapshot(format!(
            "unexpected magic {:?}",
            String::from_utf8_lossy(&magic)
        )));
    }
    let version = reader.read_u16::<BigEndian>().map_err(truncated)?;
    if version != VERSION {
        return Err(MapError::InvalidSnapshot(format!(
            "unsupported version {}",
            version
        )));
    }

    let mut builder = EntityStoreBuilder::new();
    if reader.read_u8().map_err(truncated)? == 1 {
        let mut corners = [0f64; 4];
        for value in corners.iter_mut() {
            *value = reader.read_f64::<BigEndian>().map_err(truncated)?;
        }
        let bounds = BoundingBox::new(corners[0], corners[1], corners[2], corners[3])
            .map_err(|e| MapError::InvalidSnapshot(e.to_string()))?;
        builder.set_declared_bounds(bounds);
    }

    let point_count = reader.read_u64::<BigEndian>().map_err(truncated)?;
    for _ in 0..point_count {
        let id = reader.read_i64::<BigEndian>().map_err(truncated)?;
        let latitude = reader.read_f64::<BigEndian>().map_err(truncated)?;
        let longitude = reader.read_f64::<BigEndian>().map_err(truncated)?;
        let tags = read_tags(reader)?;
        builder.add_point(Point::new(id, LatLong::new(latitude, longitude), tags));
    }

    let way_count = reader.read_u64::<BigEndian>().map_err(truncated)?;
    for _ in 0..way_count {
        let id = reader.read_i64::<BigEndian>().map_err(truncated)?;
        let ref_count = reader.read_u32::<BigEndian>().map_err(truncated)? as usize;
        let mut node_ids = Vec::with_capacity(ref_count.min(PREALLOCATION_LIMIT));
        for _ in 0..ref_count {
            node_ids.push(reader.read_i64::<BigEndian>().map_err(truncated)?);
        }
        let tags = read_tags(reader)?;
        builder.add_way(id, node_ids, tags);
    }

    Ok(builder.build())
}

/// Reuse the snapshot at `snapshot_path` when it loads, otherwise ingest
/// `map_path` and leave a fresh snapshot behind. Failing to write the snapshot
/// only costs the next start-up time, so it is logged and not returned.
pub fn load_or_ingest<P: AsRef<Path>, Q: AsRef<Path>>(
    snapshot_path: P,
    map_path: Q,
) -> Result<EntityStore> {
    let snapshot_path = snapshot_path.as_ref();
    if snapshot_path.is_file() {
        let started = Instant::now();
        let loaded = File::open(snapshot_path)
            .map_err(MapError::from)
            .and_then(|file| read(&mut BufReader::new(file)));
        match loaded {
            Ok(store) => {
                info!(
                    "Loaded snapshot {} ({} points, {} ways) in {:?}",
                    snapshot_path.display(),
                    store.point_count(),
                    store.way_count(),
                    started.elapsed()
                );
                return Ok(store);
            }
            Err(e) => warn!(
                "Ignoring snapshot {}: {}",
                snapshot_path.display(),
                e
            ),
        }
    }

    let store = ingest_path(map_path)?;
    let written = File::create(snapshot_path)
        .map_err(MapError::from)
        .and_then(|file| write(&store, &mut BufWriter::new(file)));
    match written {
        Ok(()) => info!("Wrote snapshot {}", snapshot_path.display()),
        Err(e) => warn!(
            "Could not write snapshot {}: {}",
            snapshot_path.display(),
            e
        ),
    }
    Ok(store)
}

fn write_tags<W: Write>(writer: &mut W, tags: &[Tag]) -> Result<()> {
    writer.write_u32::<BigEndian>(tags.len() as u32)?;
    for tag in tags {
        write_string(writer, &tag.key)?;
        write_string(writer, &tag.value)?;
    }
    Ok(())
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    writer.write_u32::<BigEndian>(value.len() as u32)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn read_tags<R: Read>(reader: &mut R) -> Result<Vec<Tag>> {
    let count = reader.read_u32::<BigEndian>().map_err(truncated)? as usize;
    let mut tags = Vec::with_capacity(count.min(PREALLOCATION_LIMIT));
    for _ in 0..count {
        let key = read_string(reader)?;
        let value = read_string(reader)?;
        tags.push(Tag { key, value });
    }
    Ok(tags)
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let length = reader.read_u32::<BigEndian>().map_err(truncated)? as usize;
    if length > MAXIMUM_STRING_LENGTH {
        return Err(MapError::InvalidSnapshot(format!(
            "invalid string length: {}",
            length
        )));
    }
    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes).map_err(truncated)?;
    String::from_utf8(bytes).map_err(|e| MapError::InvalidSnapshot(e.to_string()))
}

fn truncated(err: io::Error) -> MapError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        MapError::InvalidSnapshot("unexpected end of snapshot".to_string())
    } else {
        MapError::Io(err)
    }
}
