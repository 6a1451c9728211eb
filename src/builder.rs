//! Index construction: rasterize edges, sort the entry stream by ram
//! cell, and write the two index files.
//!
//! The builder is a single-threaded pipeline. `add_edge` appends one
//! entry per file cell the edge crosses to the sort backend; `build`
//! drains the backend in ram-cell order, groups entries into
//! super-buckets, and serializes them. All build failures are fatal:
//! partially written index files are invalid and must be discarded.

use crate::error::{Result, SnapError};
use crate::format::{put_edge, BUCKET_SENTINEL, CHILD_DIRECTORY_LEN, EMPTY_SLOT};
use crate::grid::{
    base_file_cell_of, child_slot_of, ram_cell_of, rasterize, CHILDREN_PER_AXIS, CHILD_SLOT_COUNT,
    FILE_GRID_DIM, RAM_CELL_COUNT,
};
use crate::sort::{ExternalSorter, SortBackend, Spill};
use crate::types::{Config, Coordinate, Edge, INVALID_NODE_ID};
use bytes::{Buf, BufMut, BytesMut};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// One rasterized cell of an edge. Ordering is by ram cell first, so a
/// fully sorted entry stream arrives grouped by super-bucket with each
/// group already in payload order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GridEntry {
    ram_cell: u32,
    file_cell: u32,
    edge: Edge,
}

impl Spill for GridEntry {
    const SPILL_LEN: usize = 32;

    fn spill(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.ram_cell);
        buf.put_u32_le(self.file_cell);
        put_edge(buf, &self.edge);
    }

    fn restore(bytes: &[u8]) -> Self {
        let mut bytes = bytes;
        let ram_cell = bytes.get_u32_le();
        let file_cell = bytes.get_u32_le();
        let edge = crate::format::get_edge(&mut bytes);
        Self {
            ram_cell,
            file_cell,
            edge,
        }
    }
}

/// Diagnostics gathered while writing an index. Not part of the on-disk
/// contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStats {
    /// Entries handed to the sort backend (one per edge and crossed cell).
    pub entries_sorted: u64,
    /// Entries remaining after per-bucket deduplication.
    pub entries_written: u64,
    /// Super-buckets written to the payload file.
    pub super_buckets: u32,
    /// Size of the largest super-bucket in bytes.
    pub largest_super_bucket_bytes: u32,
    /// Most edges stored under a single file cell.
    pub max_edges_per_file_cell: u32,
    /// Final size of the payload file.
    pub payload_bytes: u64,
}

/// Builder for the two-level grid index.
///
/// Generic over the sort backend; [`ExternalSorter`] is the default and
/// handles edge streams much larger than RAM.
///
/// # Examples
///
/// ```rust
/// use snapgrid::{Coordinate, Edge, GridBuilder};
///
/// let dir = tempfile::tempdir()?;
/// let mut builder = GridBuilder::open_write()?;
/// builder.add_edge(
///     Edge::new(1, 2),
///     Coordinate::new(0, 0),
///     Coordinate::new(1_000, 1_000),
/// )?;
/// builder.build(dir.path().join("grid.ramIndex"), dir.path().join("grid.fileIndex"))?;
/// # Ok::<(), snapgrid::SnapError>(())
/// ```
pub struct GridBuilder<S: SortBackend<GridEntry> = ExternalSorter<GridEntry>> {
    entries: S,
}

impl GridBuilder {
    /// Create a builder with default configuration.
    pub fn open_write() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Create a builder with a custom configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self {
            entries: ExternalSorter::new(&config)?,
        })
    }
}

impl<S: SortBackend<GridEntry>> GridBuilder<S> {
    /// Create a builder on top of a specific sort backend.
    pub fn with_backend(entries: S) -> Self {
        Self { entries }
    }

    /// Number of grid entries accumulated so far.
    pub fn len(&self) -> u64 {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rasterize one edge and queue an entry for every file cell it
    /// crosses.
    ///
    /// The supplied coordinates replace whatever the edge carried.
    /// Coordinates outside the world bounds and the reserved node id
    /// `u32::MAX` are rejected.
    pub fn add_edge(
        &mut self,
        edge: Edge,
        start_coord: Coordinate,
        target_coord: Coordinate,
    ) -> Result<()> {
        if !start_coord.is_valid() {
            return Err(SnapError::InvalidCoordinate {
                lat: start_coord.lat,
                lon: start_coord.lon,
            });
        }
        if !target_coord.is_valid() {
            return Err(SnapError::InvalidCoordinate {
                lat: target_coord.lat,
                lon: target_coord.lon,
            });
        }
        if edge.start == INVALID_NODE_ID || edge.target == INVALID_NODE_ID {
            return Err(SnapError::InvalidInput(
                "node id u32::MAX is reserved for the bucket terminator".into(),
            ));
        }

        let edge = Edge {
            start_coord,
            target_coord,
            ..edge
        };
        for (file_cell, ram_cell) in rasterize(start_coord, target_coord) {
            self.entries.push(GridEntry {
                ram_cell,
                file_cell,
                edge,
            })?;
        }
        Ok(())
    }

    /// Sort all accumulated entries and write the index files.
    ///
    /// Terminal operation. An empty builder still produces a valid
    /// index: an all-empty ram directory and a zero-length payload file.
    pub fn build<P, Q>(self, ram_index_path: P, file_index_path: Q) -> Result<BuildStats>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let mut stats = BuildStats {
            entries_sorted: self.entries.len(),
            ..Default::default()
        };
        info!(entries = stats.entries_sorted, "sorting grid entries");

        let mut ram_directory = vec![EMPTY_SLOT; RAM_CELL_COUNT];
        let mut writer = BufWriter::new(File::create(file_index_path.as_ref())?);
        let mut scratch = BytesMut::new();
        let mut offset: u32 = 0;
        let mut group: Vec<GridEntry> = Vec::new();
        let mut current: Option<u32> = None;

        for entry in self.entries.into_sorted()? {
            let entry = entry?;
            if current != Some(entry.ram_cell) {
                if let Some(ram_cell) = current {
                    let written =
                        write_super_bucket(&mut writer, &mut group, offset, &mut scratch, &mut stats)?;
                    ram_directory[ram_cell as usize] = offset;
                    offset = advance(offset, written)?;
                }
                current = Some(entry.ram_cell);
            }
            group.push(entry);
        }
        if let Some(ram_cell) = current {
            let written =
                write_super_bucket(&mut writer, &mut group, offset, &mut scratch, &mut stats)?;
            ram_directory[ram_cell as usize] = offset;
            offset = advance(offset, written)?;
        }
        writer.flush()?;
        stats.payload_bytes = offset as u64;

        debug_assert_eq!(
            ram_directory.iter().filter(|&&slot| slot != EMPTY_SLOT).count(),
            stats.super_buckets as usize
        );

        let mut ram_writer = BufWriter::new(File::create(ram_index_path.as_ref())?);
        scratch.clear();
        scratch.reserve(ram_directory.len() * 4);
        for &slot in &ram_directory {
            scratch.put_u32_le(slot);
        }
        ram_writer.write_all(&scratch)?;
        ram_writer.flush()?;

        info!(
            super_buckets = stats.super_buckets,
            entries_written = stats.entries_written,
            largest_super_bucket_bytes = stats.largest_super_bucket_bytes,
            max_edges_per_file_cell = stats.max_edges_per_file_cell,
            payload_bytes = stats.payload_bytes,
            "grid index written"
        );
        Ok(stats)
    }
}

fn advance(offset: u32, written: u32) -> Result<u32> {
    offset.checked_add(written).ok_or_else(offset_overflow)
}

fn offset_overflow() -> SnapError {
    SnapError::InvalidInput("payload file exceeds the 4 GiB offset range".into())
}

/// Serialize one super-bucket: a 1024-entry child directory followed by
/// the per-file-cell payloads. Returns the number of bytes written and
/// leaves `group` empty.
fn write_super_bucket<W: Write>(
    writer: &mut W,
    group: &mut Vec<GridEntry>,
    bucket_start: u32,
    scratch: &mut BytesMut,
    stats: &mut BuildStats,
) -> Result<u32> {
    debug_assert!(!group.is_empty());
    // The backend contract delivers entries fully ordered, so the group
    // is already sorted by file cell and duplicates are adjacent.
    debug_assert!(group.windows(2).all(|pair| pair[0] <= pair[1]));
    group.dedup();

    let ram_cell = group[0].ram_cell;
    let payload_base = advance(bucket_start, CHILD_DIRECTORY_LEN as u32)?;
    let mut directory = [EMPTY_SLOT; CHILD_SLOT_COUNT];
    scratch.clear();

    let mut i = 0;
    while i < group.len() {
        let file_cell = group[i].file_cell;
        debug_assert_eq!(ram_cell_of(file_cell), ram_cell);
        let slot = child_slot_of(file_cell) as usize;
        debug_assert_eq!(
            base_file_cell_of(ram_cell)
                + (slot as u32 / CHILDREN_PER_AXIS) * FILE_GRID_DIM
                + slot as u32 % CHILDREN_PER_AXIS,
            file_cell
        );

        directory[slot] = advance(payload_base, scratch.len() as u32)?;
        let run_start = i;
        while i < group.len() && group[i].file_cell == file_cell {
            put_edge(scratch, &group[i].edge);
            i += 1;
        }
        scratch.put_u32_le(BUCKET_SENTINEL);
        stats.max_edges_per_file_cell = stats.max_edges_per_file_cell.max((i - run_start) as u32);
    }

    let mut dir_buf = BytesMut::with_capacity(CHILD_DIRECTORY_LEN);
    for slot in directory {
        dir_buf.put_u32_le(slot);
    }
    writer.write_all(&dir_buf)?;
    writer.write_all(scratch)?;

    let written = u32::try_from(CHILD_DIRECTORY_LEN as u64 + scratch.len() as u64)
        .map_err(|_| offset_overflow())?;
    stats.entries_written += group.len() as u64;
    stats.super_buckets += 1;
    stats.largest_super_bucket_bytes = stats.largest_super_bucket_bytes.max(written);
    group.clear();
    Ok(written)
}
