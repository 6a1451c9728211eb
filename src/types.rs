//! Core types for the grid index: fixed-point coordinates, edges, and
//! configuration.
//!
//! Coordinates are stored as signed 32-bit integers in units of 1e-5
//! degrees, matching the on-disk edge record layout. The `geo` crate's
//! `Point` is the degree-space currency at the API boundary.

use geo::Point;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a node in the routing graph.
pub type NodeId = u32;

/// Reserved node id, used on disk as the end-of-bucket marker. Never a
/// real node.
pub const INVALID_NODE_ID: NodeId = u32::MAX;

/// Fixed-point scale: coordinate units per degree.
pub const COORDINATE_PRECISION: f64 = 100_000.0;

/// World bounds in fixed-point units.
pub const MIN_LAT: i32 = -9_000_000;
pub const MAX_LAT: i32 = 9_000_000;
pub const MIN_LON: i32 = -18_000_000;
pub const MAX_LON: i32 = 18_000_000;

/// A geographic coordinate in units of 1e-5 degrees.
///
/// # Examples
///
/// ```rust
/// use snapgrid::Coordinate;
///
/// let c = Coordinate::from_degrees(40.7128, -74.0060);
/// assert_eq!(c.lat, 4_071_280);
/// assert_eq!(c.lon, -7_400_600);
/// assert!(c.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: i32,
    pub lon: i32,
}

impl Coordinate {
    /// Sentinel returned by the legacy nearest-point lookup when the
    /// query neighborhood holds no edges.
    pub const INVALID: Coordinate = Coordinate {
        lat: i32::MAX,
        lon: i32::MAX,
    };

    /// Create a coordinate from fixed-point latitude and longitude.
    pub const fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Create a coordinate from degrees, rounding to the nearest
    /// fixed-point unit.
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat: (lat * COORDINATE_PRECISION).round() as i32,
            lon: (lon * COORDINATE_PRECISION).round() as i32,
        }
    }

    /// Latitude in degrees.
    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / COORDINATE_PRECISION
    }

    /// Longitude in degrees.
    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / COORDINATE_PRECISION
    }

    /// Whether the coordinate lies within the world bounds.
    pub fn is_valid(&self) -> bool {
        (MIN_LAT..=MAX_LAT).contains(&self.lat) && (MIN_LON..=MAX_LON).contains(&self.lon)
    }
}

impl From<Point> for Coordinate {
    /// Converts from a degree-space point (`x` = longitude, `y` = latitude).
    fn from(point: Point) -> Self {
        Self::from_degrees(point.y(), point.x())
    }
}

impl From<Coordinate> for Point {
    fn from(coord: Coordinate) -> Self {
        Point::new(coord.lon_degrees(), coord.lat_degrees())
    }
}

/// A directed edge of the routing graph with its endpoint coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub start: NodeId,
    pub target: NodeId,
    pub start_coord: Coordinate,
    pub target_coord: Coordinate,
}

impl Edge {
    /// Create an edge between two nodes. Endpoint coordinates are filled
    /// in by the builder when the edge is added.
    pub const fn new(start: NodeId, target: NodeId) -> Self {
        Self {
            start,
            target,
            start_coord: Coordinate::new(0, 0),
            target_coord: Coordinate::new(0, 0),
        }
    }

    /// Create an edge with endpoint coordinates already attached.
    pub const fn with_coords(
        start: NodeId,
        target: NodeId,
        start_coord: Coordinate,
        target_coord: Coordinate,
    ) -> Self {
        Self {
            start,
            target,
            start_coord,
            target_coord,
        }
    }
}

/// Result of snapping one coordinate onto the nearest indexed edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    /// Start node of the matched edge.
    pub start: NodeId,
    /// Target node of the matched edge.
    pub target: NodeId,
    /// Closest point on the edge, in fixed-point units.
    pub foot: Coordinate,
    /// Fractional position of `foot` along the edge, clamped to [0, 1].
    pub ratio: f64,
    /// Squared planar distance from the query to `foot`. Only meaningful
    /// for ranking candidates against each other.
    pub dist_sq: f64,
}

/// Phantom start and target positions for a shortest-path query, each
/// parameterized by an edge's node pair and a fractional position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhantomNodes {
    pub start_node1: NodeId,
    pub start_node2: NodeId,
    pub start_ratio: f64,
    pub start_coord: Coordinate,
    pub target_node1: NodeId,
    pub target_node2: NodeId,
    pub target_ratio: f64,
    pub target_coord: Coordinate,
}

impl Default for PhantomNodes {
    fn default() -> Self {
        Self {
            start_node1: INVALID_NODE_ID,
            start_node2: INVALID_NODE_ID,
            start_ratio: 0.0,
            start_coord: Coordinate::INVALID,
            target_node1: INVALID_NODE_ID,
            target_node2: INVALID_NODE_ID,
            target_ratio: 0.0,
            target_coord: Coordinate::INVALID,
        }
    }
}

/// Configuration for index construction.
///
/// # Example
///
/// ```rust
/// use snapgrid::Config;
///
/// let json = r#"{ "sort_run_capacity": 1048576 }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.sort_run_capacity, 1_048_576);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of grid entries buffered in memory before a sorted run is
    /// spilled to disk.
    #[serde(default = "Config::default_sort_run_capacity")]
    pub sort_run_capacity: usize,

    /// Directory for sort spill files. Defaults to the system temp
    /// directory.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Config {
    const fn default_sort_run_capacity() -> usize {
        // 4M entries at 32 bytes each bound a run at 128 MiB.
        4 * 1024 * 1024
    }

    pub fn with_sort_run_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "sort run capacity must be positive");
        self.sort_run_capacity = capacity;
        self
    }

    pub fn with_temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sort_run_capacity: Self::default_sort_run_capacity(),
            temp_dir: None,
        }
    }
}
