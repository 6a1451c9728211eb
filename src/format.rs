//! On-disk layout of the two-level grid index.
//!
//! Two files make up an index, both little-endian throughout:
//!
//! * The **ram directory** file is exactly 4 MiB: one u32 per ram cell,
//!   holding the absolute offset of that cell's super-bucket in the
//!   payload file, or [`EMPTY_SLOT`] when the cell holds no edges.
//! * The **payload** file is a concatenation of super-buckets. Each
//!   super-bucket starts with a 1024-entry child directory (u32 absolute
//!   offset of the first edge record for each of the cell's 32 x 32
//!   file cells, or [`EMPTY_SLOT`]), followed by the per-file-cell
//!   payloads: 24-byte edge records terminated by a 4-byte
//!   [`BUCKET_SENTINEL`].

use crate::grid::{CHILD_SLOT_COUNT, RAM_CELL_COUNT};
use crate::types::{Coordinate, Edge};
use bytes::{Buf, BufMut, BytesMut};

/// Marker for an unused directory slot, both levels.
pub const EMPTY_SLOT: u32 = u32::MAX;

/// Leading u32 of the synthetic trailer record closing every
/// per-file-cell payload.
pub const BUCKET_SENTINEL: u32 = u32::MAX;

/// Serialized size of one edge record.
pub const EDGE_RECORD_LEN: usize = 24;

/// Serialized size of a super-bucket's child directory.
pub const CHILD_DIRECTORY_LEN: usize = CHILD_SLOT_COUNT * 4;

/// Exact size of the ram directory file.
pub const RAM_DIRECTORY_LEN: usize = RAM_CELL_COUNT * 4;

/// Append one edge record to `buf`.
pub fn put_edge(buf: &mut BytesMut, edge: &Edge) {
    buf.put_u32_le(edge.start);
    buf.put_u32_le(edge.target);
    buf.put_i32_le(edge.start_coord.lat);
    buf.put_i32_le(edge.start_coord.lon);
    buf.put_i32_le(edge.target_coord.lat);
    buf.put_i32_le(edge.target_coord.lon);
}

/// Decode one edge record. The caller must hand in at least
/// [`EDGE_RECORD_LEN`] bytes.
pub fn get_edge(buf: &mut impl Buf) -> Edge {
    let start = buf.get_u32_le();
    let target = buf.get_u32_le();
    let start_lat = buf.get_i32_le();
    let start_lon = buf.get_i32_le();
    let target_lat = buf.get_i32_le();
    let target_lon = buf.get_i32_le();
    Edge {
        start,
        target,
        start_coord: Coordinate::new(start_lat, start_lon),
        target_coord: Coordinate::new(target_lat, target_lon),
    }
}
