//! Two-level spatial grid index for snapping coordinates onto the
//! nearest edge of a road network.
//!
//! The index is built once from an edge stream that may be far larger
//! than RAM, then queried repeatedly. The world is partitioned into a
//! 32768 x 32768 grid of file cells, coarsened 32x per axis into ram
//! cells: the per-ram-cell directory fits in 4 MiB of memory while each
//! query needs a single seek per touched bucket.
//!
//! ```rust
//! use snapgrid::{Coordinate, Edge, GridBuilder, GridReader};
//!
//! let dir = tempfile::tempdir()?;
//! let ram = dir.path().join("grid.ramIndex");
//! let index = dir.path().join("grid.fileIndex");
//!
//! let mut builder = GridBuilder::open_write()?;
//! builder.add_edge(
//!     Edge::new(1, 2),
//!     Coordinate::new(0, 0),
//!     Coordinate::new(1_000, 1_000),
//! )?;
//! builder.build(&ram, &index)?;
//!
//! let reader = GridReader::open_read(&ram, &index)?;
//! let snapped = reader.nearest_on_edge(Coordinate::new(500, 480))?;
//! assert_eq!(snapped, Coordinate::new(490, 490));
//! # Ok::<(), snapgrid::SnapError>(())
//! ```

pub mod builder;
pub mod error;
pub mod format;
pub mod grid;
pub mod reader;
pub mod sort;
pub mod spatial;
pub mod types;

pub use builder::{BuildStats, GridBuilder};
pub use error::{Result, SnapError};
pub use reader::GridReader;
pub use sort::{ExternalSorter, MemorySorter, SortBackend};
pub use types::{Config, Coordinate, Edge, NodeId, PhantomNodes, Snap, INVALID_NODE_ID};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{Config, Coordinate, Edge, GridBuilder, GridReader, PhantomNodes};
    pub use crate::{Result, Snap, SnapError};
}
