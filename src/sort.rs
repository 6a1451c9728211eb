//! Sorting backends for the construction pipeline.
//!
//! Construction emits far more grid entries than fit in RAM, so the
//! builder only depends on the [`SortBackend`] contract: push items,
//! then drain them back in ascending order. [`ExternalSorter`] is the
//! default implementation, spilling sorted runs to temp files and
//! merging them with a binary heap. [`MemorySorter`] keeps everything
//! in RAM and suits small builds and tests.

use crate::error::Result;
use crate::types::Config;
use bytes::{Buf, BufMut, BytesMut};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use tempfile::TempDir;

/// Fixed-width record codec used when a sorter spills items to disk.
pub trait Spill: Sized {
    /// Encoded size of one record.
    const SPILL_LEN: usize;

    /// Append the record to `buf`. Must write exactly [`Self::SPILL_LEN`]
    /// bytes.
    fn spill(&self, buf: &mut BytesMut);

    /// Decode a record from exactly [`Self::SPILL_LEN`] bytes.
    fn restore(bytes: &[u8]) -> Self;
}

/// A sink that accepts items in arbitrary order and hands them back
/// sorted ascending.
pub trait SortBackend<T: Ord> {
    /// Iterator returned by [`SortBackend::into_sorted`]. Items are
    /// wrapped in `Result` because disk-backed implementations can fail
    /// mid-drain.
    type Iter: Iterator<Item = Result<T>>;

    /// Add one item to the sequence.
    fn push(&mut self, item: T) -> Result<()>;

    /// Number of items pushed so far.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finish accepting input and drain everything in ascending order.
    fn into_sorted(self) -> Result<Self::Iter>;
}

/// In-memory backend backed by a `Vec`.
#[derive(Debug, Default)]
pub struct MemorySorter<T> {
    items: Vec<T>,
}

impl<T> MemorySorter<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Ord> SortBackend<T> for MemorySorter<T> {
    type Iter = std::iter::Map<std::vec::IntoIter<T>, fn(T) -> Result<T>>;

    fn push(&mut self, item: T) -> Result<()> {
        self.items.push(item);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.items.len() as u64
    }

    fn into_sorted(mut self) -> Result<Self::Iter> {
        self.items.sort_unstable();
        Ok(self.items.into_iter().map(Ok as fn(T) -> Result<T>))
    }
}

/// External-memory backend: run generation plus k-way merge.
///
/// Items accumulate in RAM until the configured run capacity, then the
/// run is sorted and written to a temp file. `into_sorted` opens every
/// run and merges them through a min-heap, so the whole sequence is
/// never resident at once.
pub struct ExternalSorter<T: Ord + Spill> {
    run_capacity: usize,
    buffer: Vec<T>,
    runs: Vec<PathBuf>,
    temp: TempDir,
    scratch: BytesMut,
    total: u64,
}

impl<T: Ord + Spill> ExternalSorter<T> {
    pub fn new(config: &Config) -> Result<Self> {
        let temp = match &config.temp_dir {
            Some(dir) => TempDir::new_in(dir)?,
            None => TempDir::new()?,
        };
        Ok(Self {
            run_capacity: config.sort_run_capacity,
            buffer: Vec::new(),
            runs: Vec::new(),
            temp,
            scratch: BytesMut::with_capacity(T::SPILL_LEN),
            total: 0,
        })
    }

    fn spill_run(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut run = std::mem::take(&mut self.buffer);
        run.sort_unstable();

        let path = self
            .temp
            .path()
            .join(format!("run-{:04}.bin", self.runs.len()));
        let mut writer = BufWriter::new(File::create(&path)?);
        for item in &run {
            self.scratch.clear();
            item.spill(&mut self.scratch);
            debug_assert_eq!(self.scratch.len(), T::SPILL_LEN);
            writer.write_all(&self.scratch)?;
        }
        writer.flush()?;
        self.runs.push(path);

        run.clear();
        self.buffer = run;
        Ok(())
    }
}

impl<T: Ord + Spill> SortBackend<T> for ExternalSorter<T> {
    type Iter = MergeIter<T>;

    fn push(&mut self, item: T) -> Result<()> {
        self.buffer.push(item);
        self.total += 1;
        if self.buffer.len() >= self.run_capacity {
            self.spill_run()?;
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.total
    }

    fn into_sorted(mut self) -> Result<Self::Iter> {
        if self.runs.is_empty() {
            // Everything fit in one run, no merge needed.
            self.buffer.sort_unstable();
            return Ok(MergeIter::from_memory(self.buffer, self.temp));
        }
        self.spill_run()?;

        let mut readers = Vec::with_capacity(self.runs.len());
        for path in &self.runs {
            readers.push(BufReader::new(File::open(path)?));
        }
        MergeIter::from_runs(readers, self.temp)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RunHead<T> {
    item: T,
    run: usize,
}

enum State<T: Ord + Spill> {
    Memory(std::vec::IntoIter<T>),
    Runs {
        heap: BinaryHeap<Reverse<RunHead<T>>>,
        readers: Vec<BufReader<File>>,
        record: Vec<u8>,
        poisoned: bool,
    },
}

/// Sorted drain over a finished [`ExternalSorter`]. Holds the temp
/// directory alive until the merge completes.
pub struct MergeIter<T: Ord + Spill> {
    state: State<T>,
    _temp: TempDir,
}

impl<T: Ord + Spill> MergeIter<T> {
    fn from_memory(items: Vec<T>, temp: TempDir) -> Self {
        Self {
            state: State::Memory(items.into_iter()),
            _temp: temp,
        }
    }

    fn from_runs(mut readers: Vec<BufReader<File>>, temp: TempDir) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(readers.len());
        let mut record = vec![0u8; T::SPILL_LEN];
        for run in 0..readers.len() {
            if let Some(item) = read_record::<T>(&mut readers[run], &mut record)? {
                heap.push(Reverse(RunHead { item, run }));
            }
        }
        Ok(Self {
            state: State::Runs {
                heap,
                readers,
                record,
                poisoned: false,
            },
            _temp: temp,
        })
    }
}

fn read_record<T: Spill>(reader: &mut BufReader<File>, record: &mut [u8]) -> Result<Option<T>> {
    match reader.read_exact(record) {
        Ok(()) => Ok(Some(T::restore(record))),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl<T: Ord + Spill> Iterator for MergeIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            State::Memory(iter) => iter.next().map(Ok),
            State::Runs {
                heap,
                readers,
                record,
                poisoned,
            } => {
                if *poisoned {
                    return None;
                }
                let Reverse(RunHead { item, run }) = heap.pop()?;
                match read_record::<T>(&mut readers[run], record) {
                    Ok(Some(next_item)) => heap.push(Reverse(RunHead {
                        item: next_item,
                        run,
                    })),
                    Ok(None) => {}
                    Err(err) => {
                        *poisoned = true;
                        return Some(Err(err));
                    }
                }
                Some(Ok(item))
            }
        }
    }
}
