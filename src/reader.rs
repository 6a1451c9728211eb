//! Query side of the grid index: load the ram directory, seek into the
//! payload file, and snap coordinates onto the nearest edge.
//!
//! A query touches at most nine buckets (the 3x3 file-cell window around
//! the query), each costing one directory read and at most one payload
//! scan. The ram directory is immutable after startup and shared freely;
//! the payload file handle sits behind a mutex so lookups take `&self`
//! and the reader is `Send + Sync`. Readers on different files, or
//! separate readers on the same files, never contend.

use crate::error::{Result, SnapError};
use crate::format::{BUCKET_SENTINEL, CHILD_DIRECTORY_LEN, EMPTY_SLOT, RAM_DIRECTORY_LEN};
use crate::grid::{child_slot_of, file_cell_of, ram_cell_of, FILE_GRID_DIM, RAM_CELL_COUNT};
use crate::spatial::project;
use crate::types::{Coordinate, Edge, PhantomNodes, Snap};
use bytes::Buf;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Read-only handle on a built index.
#[derive(Debug)]
pub struct GridReader {
    ram_directory: Vec<u32>,
    payload: Mutex<BufReader<File>>,
    payload_len: u64,
}

impl GridReader {
    /// Open a built index. The ram directory is read fully into memory;
    /// the payload file stays open for the lifetime of the reader.
    pub fn open_read<P, Q>(ram_index_path: P, file_index_path: Q) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let mut ram_file = File::open(ram_index_path.as_ref())?;
        let ram_len = ram_file.metadata()?.len();
        if ram_len != RAM_DIRECTORY_LEN as u64 {
            return Err(SnapError::IndexCorrupt(format!(
                "ram directory is {} bytes, expected {}",
                ram_len, RAM_DIRECTORY_LEN
            )));
        }

        let mut raw = Vec::with_capacity(RAM_DIRECTORY_LEN);
        ram_file.read_to_end(&mut raw)?;
        if raw.len() != RAM_DIRECTORY_LEN {
            return Err(SnapError::IndexCorrupt(
                "ram directory truncated while reading".into(),
            ));
        }
        let mut slice = raw.as_slice();
        let mut ram_directory = Vec::with_capacity(RAM_CELL_COUNT);
        while slice.has_remaining() {
            ram_directory.push(slice.get_u32_le());
        }

        let payload_file = File::open(file_index_path.as_ref())?;
        let payload_len = payload_file.metadata()?.len();
        debug!(
            payload_bytes = payload_len,
            populated_cells = ram_directory.iter().filter(|&&s| s != EMPTY_SLOT).count(),
            "grid index opened"
        );

        Ok(Self {
            ram_directory,
            payload: Mutex::new(BufReader::new(payload_file)),
            payload_len,
        })
    }

    /// Snap a coordinate onto the closest point of the nearest indexed
    /// edge.
    ///
    /// Candidates come from the nine file cells around the query cell,
    /// scanned south row to north row and west to east within a row;
    /// inside one file cell, edges appear in payload order. The smallest
    /// squared distance wins and ties keep the first candidate
    /// encountered. Returns `None` when the whole neighborhood holds no
    /// edges.
    pub fn snap(&self, query: Coordinate) -> Result<Option<Snap>> {
        if !query.is_valid() {
            return Err(SnapError::InvalidCoordinate {
                lat: query.lat,
                lon: query.lon,
            });
        }

        let candidates = self.collect_candidates(query)?;
        let mut best: Option<Snap> = None;
        for edge in &candidates {
            let projection = project(query, edge.start_coord, edge.target_coord);
            let closer = match &best {
                Some(snap) => projection.dist_sq < snap.dist_sq,
                None => true,
            };
            if closer {
                best = Some(Snap {
                    start: edge.start,
                    target: edge.target,
                    foot: projection.foot,
                    ratio: projection.ratio,
                    dist_sq: projection.dist_sq,
                });
            }
        }
        Ok(best)
    }

    /// Closest point on the nearest indexed edge, or
    /// [`Coordinate::INVALID`] when the neighborhood holds no edges.
    pub fn nearest_on_edge(&self, query: Coordinate) -> Result<Coordinate> {
        Ok(self
            .snap(query)?
            .map(|snap| snap.foot)
            .unwrap_or(Coordinate::INVALID))
    }

    /// Snap both endpoints of a route request and fill `phantom` with
    /// the matched edges and ratios. Returns `false` only when neither
    /// endpoint found an edge; `phantom` is unspecified in that case.
    pub fn find_routing_starts(
        &self,
        start: Coordinate,
        target: Coordinate,
        phantom: &mut PhantomNodes,
    ) -> Result<bool> {
        let start_snap = self.snap(start)?;
        if let Some(snap) = &start_snap {
            phantom.start_node1 = snap.start;
            phantom.start_node2 = snap.target;
            phantom.start_ratio = snap.ratio;
            phantom.start_coord = snap.foot;
        }

        let target_snap = self.snap(target)?;
        if let Some(snap) = &target_snap {
            phantom.target_node1 = snap.start;
            phantom.target_node2 = snap.target;
            phantom.target_ratio = snap.ratio;
            phantom.target_coord = snap.foot;
        }

        Ok(start_snap.is_some() || target_snap.is_some())
    }

    /// Gather candidate edges from the 3x3 window around the query's
    /// file cell. Neighbors outside the grid are skipped rather than
    /// wrapped.
    fn collect_candidates(&self, query: Coordinate) -> Result<Vec<Edge>> {
        let file_cell = file_cell_of(query);
        let row = (file_cell / FILE_GRID_DIM) as i64;
        let col = (file_cell % FILE_GRID_DIM) as i64;

        let mut candidates = Vec::new();
        for row_offset in -1..=1i64 {
            for col_offset in -1..=1i64 {
                let (r, c) = (row + row_offset, col + col_offset);
                if !(0..FILE_GRID_DIM as i64).contains(&r)
                    || !(0..FILE_GRID_DIM as i64).contains(&c)
                {
                    continue;
                }
                let neighbor = r as u32 * FILE_GRID_DIM + c as u32;
                self.read_bucket(neighbor, &mut candidates)?;
            }
        }
        Ok(candidates)
    }

    /// Append every edge stored under one file cell to `out`.
    fn read_bucket(&self, file_cell: u32, out: &mut Vec<Edge>) -> Result<()> {
        let ram_cell = ram_cell_of(file_cell);
        let bucket_start = self.ram_directory[ram_cell as usize];
        if bucket_start == EMPTY_SLOT {
            return Ok(());
        }

        let directory_end = bucket_start as u64 + CHILD_DIRECTORY_LEN as u64;
        if directory_end > self.payload_len {
            return Err(SnapError::IndexCorrupt(format!(
                "super-bucket at {} runs past EOF ({} bytes)",
                bucket_start, self.payload_len
            )));
        }

        let mut payload = self.payload.lock();
        payload.seek(SeekFrom::Start(bucket_start as u64))?;
        let mut directory = [0u8; CHILD_DIRECTORY_LEN];
        payload.read_exact(&mut directory)?;

        let slot = child_slot_of(file_cell) as usize;
        let mut entry_bytes = &directory[slot * 4..slot * 4 + 4];
        let record_start = entry_bytes.get_u32_le();
        if record_start == EMPTY_SLOT {
            return Ok(());
        }
        let record_start = record_start as u64;
        if record_start < directory_end || record_start >= self.payload_len {
            return Err(SnapError::IndexCorrupt(format!(
                "child slot {} of super-bucket at {} points to {}, outside its payload region",
                slot, bucket_start, record_start
            )));
        }

        payload.seek(SeekFrom::Start(record_start))?;
        loop {
            let mut head = [0u8; 4];
            payload.read_exact(&mut head).map_err(missing_terminator)?;
            let start = u32::from_le_bytes(head);
            if start == BUCKET_SENTINEL {
                break;
            }

            let mut rest = [0u8; 20];
            payload.read_exact(&mut rest).map_err(missing_terminator)?;
            let mut rest = &rest[..];
            let target = rest.get_u32_le();
            let start_lat = rest.get_i32_le();
            let start_lon = rest.get_i32_le();
            let target_lat = rest.get_i32_le();
            let target_lon = rest.get_i32_le();
            out.push(Edge {
                start,
                target,
                start_coord: Coordinate::new(start_lat, start_lon),
                target_coord: Coordinate::new(target_lat, target_lon),
            });
        }
        Ok(())
    }
}

fn missing_terminator(err: io::Error) -> SnapError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        SnapError::IndexCorrupt("file bucket has no terminator before EOF".into())
    } else {
        SnapError::Io(err)
    }
}
