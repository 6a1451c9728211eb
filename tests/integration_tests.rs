use snapgrid::grid::{file_cell_of, ram_cell_of, FILE_GRID_DIM, RAM_CELL_COUNT};
use snapgrid::{Config, Coordinate, Edge, GridBuilder, GridReader, MemorySorter, PhantomNodes};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn build_index(edges: &[(u32, u32, Coordinate, Coordinate)]) -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let ram = dir.path().join("grid.ramIndex");
    let index = dir.path().join("grid.fileIndex");

    let mut builder = GridBuilder::open_write().unwrap();
    for &(start, target, a, b) in edges {
        builder.add_edge(Edge::new(start, target), a, b).unwrap();
    }
    builder.build(&ram, &index).unwrap();
    (dir, ram, index)
}

fn open(ram: &Path, index: &Path) -> GridReader {
    GridReader::open_read(ram, index).unwrap()
}

#[test]
fn test_snap_onto_edge_endpoint() {
    let (_dir, ram, index) = build_index(&[(
        1,
        2,
        Coordinate::new(0, 0),
        Coordinate::new(1_000, 1_000),
    )]);
    let reader = open(&ram, &index);

    let nearest = reader.nearest_on_edge(Coordinate::new(0, 0)).unwrap();
    assert_eq!(nearest, Coordinate::new(0, 0));

    let snap = reader.snap(Coordinate::new(0, 0)).unwrap().unwrap();
    assert_eq!(snap.ratio, 0.0);
    assert_eq!(snap.dist_sq, 0.0);
    assert_eq!((snap.start, snap.target), (1, 2));
}

#[test]
fn test_snap_onto_midpoint() {
    let (_dir, ram, index) = build_index(&[(
        1,
        2,
        Coordinate::new(0, 0),
        Coordinate::new(1_000, 1_000),
    )]);
    let reader = open(&ram, &index);

    let snap = reader.snap(Coordinate::new(500, 500)).unwrap().unwrap();
    assert_eq!(snap.foot, Coordinate::new(500, 500));
    assert!((snap.ratio - 0.5).abs() < 1e-9);
}

#[test]
fn test_snap_clamps_past_target() {
    let (_dir, ram, index) = build_index(&[(
        1,
        2,
        Coordinate::new(0, 0),
        Coordinate::new(1_000, 1_000),
    )]);
    let reader = open(&ram, &index);

    // Past the target endpoint but still within one grid cell of it
    // (one file cell spans roughly 549 units of latitude).
    let snap = reader.snap(Coordinate::new(1_090, 1_090)).unwrap().unwrap();
    assert_eq!(snap.foot, Coordinate::new(1_000, 1_000));
    assert_eq!(snap.ratio, 1.0);
    assert_eq!(snap.dist_sq, 2.0 * 90.0 * 90.0);
}

#[test]
fn test_perpendicular_snap_distance() {
    // Due-east edge along the equator, query offset north of its middle.
    let (_dir, ram, index) = build_index(&[(
        3,
        4,
        Coordinate::new(0, 0),
        Coordinate::new(0, 10_000),
    )]);
    let reader = open(&ram, &index);

    let snap = reader.snap(Coordinate::new(500, 5_000)).unwrap().unwrap();
    assert_eq!(snap.foot, Coordinate::new(0, 5_000));
    assert_eq!(snap.dist_sq, 250_000.0);
    assert!((snap.ratio - 0.5).abs() < 1e-9);
}

#[test]
fn test_query_outside_neighborhood_misses() {
    // A short edge occupies one file cell; a query four columns east has
    // no overlap with the 3x3 window around it.
    let (_dir, ram, index) = build_index(&[(
        1,
        2,
        Coordinate::new(0, 0),
        Coordinate::new(0, 500),
    )]);
    let reader = open(&ram, &index);

    assert!(reader.snap(Coordinate::new(0, 4_500)).unwrap().is_none());
    assert_eq!(
        reader.nearest_on_edge(Coordinate::new(0, 4_500)).unwrap(),
        Coordinate::INVALID
    );
}

#[test]
fn test_equidistant_edges_keep_first_in_scan_order() {
    // Two due-east edges 500 units north and south of the query. The
    // southern edge sits in the southern bucket row, which is scanned
    // first, so it wins the tie.
    let south = (1u32, 2u32, Coordinate::new(0, 0), Coordinate::new(0, 1_000));
    let north = (
        5u32,
        6u32,
        Coordinate::new(1_000, 0),
        Coordinate::new(1_000, 1_000),
    );
    let (_dir, ram, index) = build_index(&[north, south]);
    let reader = open(&ram, &index);

    let snap = reader.snap(Coordinate::new(500, 500)).unwrap().unwrap();
    assert_eq!((snap.start, snap.target), (1, 2));
    assert_eq!(snap.foot, Coordinate::new(0, 500));
    assert_eq!(snap.dist_sq, 250_000.0);
}

#[test]
fn test_find_routing_starts_fills_both_ends() {
    let (_dir, ram, index) = build_index(&[
        (1, 2, Coordinate::new(0, 0), Coordinate::new(1_000, 1_000)),
        (
            7,
            8,
            Coordinate::new(50_000, 50_000),
            Coordinate::new(51_000, 51_000),
        ),
    ]);
    let reader = open(&ram, &index);

    let mut phantom = PhantomNodes::default();
    let found = reader
        .find_routing_starts(
            Coordinate::new(500, 500),
            Coordinate::new(50_500, 50_500),
            &mut phantom,
        )
        .unwrap();
    assert!(found);
    assert_eq!((phantom.start_node1, phantom.start_node2), (1, 2));
    assert_eq!(phantom.start_coord, Coordinate::new(500, 500));
    assert!((phantom.start_ratio - 0.5).abs() < 1e-9);
    assert_eq!((phantom.target_node1, phantom.target_node2), (7, 8));
    assert_eq!(phantom.target_coord, Coordinate::new(50_500, 50_500));
    assert!((phantom.target_ratio - 0.5).abs() < 1e-9);
}

#[test]
fn test_find_routing_starts_fails_when_both_ends_miss() {
    let (_dir, ram, index) = build_index(&[(
        1,
        2,
        Coordinate::new(0, 0),
        Coordinate::new(0, 500),
    )]);
    let reader = open(&ram, &index);

    let mut phantom = PhantomNodes::default();
    let found = reader
        .find_routing_starts(
            Coordinate::new(5_000_000, 5_000_000),
            Coordinate::new(-5_000_000, -5_000_000),
            &mut phantom,
        )
        .unwrap();
    assert!(!found);
}

#[test]
fn test_double_add_build_is_byte_identical() {
    let edges = [
        (1, 2, Coordinate::new(0, 0), Coordinate::new(1_000, 1_000)),
        (3, 4, Coordinate::new(0, 0), Coordinate::new(0, 10_000)),
        (
            5,
            6,
            Coordinate::new(-200_000, 300_000),
            Coordinate::new(-201_000, 302_000),
        ),
    ];
    let doubled: Vec<_> = edges.iter().chain(edges.iter()).copied().collect();

    let (_dir_a, ram_a, index_a) = build_index(&edges);
    let (_dir_b, ram_b, index_b) = build_index(&doubled);

    assert_eq!(
        std::fs::read(&ram_a).unwrap(),
        std::fs::read(&ram_b).unwrap()
    );
    assert_eq!(
        std::fs::read(&index_a).unwrap(),
        std::fs::read(&index_b).unwrap()
    );
}

#[test]
fn test_directory_offsets_stay_inside_their_regions() {
    let (_dir, ram, index) = build_index(&[
        (1, 2, Coordinate::new(0, 0), Coordinate::new(2_000, 10_000)),
        (3, 4, Coordinate::new(0, 0), Coordinate::new(0, 50_000)),
        (
            5,
            6,
            Coordinate::new(4_071_280, -7_400_600),
            Coordinate::new(4_072_280, -7_401_600),
        ),
    ]);

    let ram_bytes = std::fs::read(&ram).unwrap();
    let payload = std::fs::read(&index).unwrap();
    assert_eq!(ram_bytes.len(), 4 * RAM_CELL_COUNT);

    let mut bucket_starts: Vec<u64> = ram_bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .filter(|&offset| offset != u32::MAX)
        .map(u64::from)
        .collect();
    bucket_starts.sort_unstable();
    assert!(!bucket_starts.is_empty());

    for (i, &bucket_start) in bucket_starts.iter().enumerate() {
        let bucket_end = bucket_starts
            .get(i + 1)
            .copied()
            .unwrap_or(payload.len() as u64);
        let directory_end = bucket_start + 4_096;
        assert!(directory_end <= payload.len() as u64);

        for slot in 0..1_024usize {
            let at = bucket_start as usize + slot * 4;
            let entry = u32::from_le_bytes([
                payload[at],
                payload[at + 1],
                payload[at + 2],
                payload[at + 3],
            ]);
            if entry == u32::MAX {
                continue;
            }
            assert!(u64::from(entry) >= directory_end);
            assert!(u64::from(entry) < bucket_end);
        }
    }
}

#[test]
fn test_grid_cells_stay_in_bounds_for_sample_coordinates() {
    for &(lat, lon) in &[
        (0, 0),
        (4_071_280, -7_400_600),
        (-3_386_900, 15_122_100),
        (8_900_000, 17_900_000),
        (-8_900_000, -17_900_000),
    ] {
        let file_cell = file_cell_of(Coordinate::new(lat, lon));
        assert!(file_cell < FILE_GRID_DIM * FILE_GRID_DIM);
        assert!(ram_cell_of(file_cell) < RAM_CELL_COUNT as u32);
    }
}

#[test]
fn test_external_sort_spill_produces_same_index_as_memory_sort() {
    let edges: Vec<(u32, u32, Coordinate, Coordinate)> = (0..40)
        .map(|i| {
            let base = i as i32 * 700;
            (
                i,
                i + 1,
                Coordinate::new(base, -base),
                Coordinate::new(base + 900, -base + 1_200),
            )
        })
        .collect();

    // Tiny run capacity forces several spill-and-merge rounds.
    let spill_dir = tempfile::tempdir().unwrap();
    let config = Config::default().with_sort_run_capacity(8);
    let mut builder = GridBuilder::with_config(config).unwrap();
    for &(start, target, a, b) in &edges {
        builder.add_edge(Edge::new(start, target), a, b).unwrap();
    }
    let spill_ram = spill_dir.path().join("grid.ramIndex");
    let spill_index = spill_dir.path().join("grid.fileIndex");
    builder.build(&spill_ram, &spill_index).unwrap();

    let memory_dir = tempfile::tempdir().unwrap();
    let mut builder = GridBuilder::with_backend(MemorySorter::new());
    for &(start, target, a, b) in &edges {
        builder.add_edge(Edge::new(start, target), a, b).unwrap();
    }
    let memory_ram = memory_dir.path().join("grid.ramIndex");
    let memory_index = memory_dir.path().join("grid.fileIndex");
    builder.build(&memory_ram, &memory_index).unwrap();

    assert_eq!(
        std::fs::read(&spill_ram).unwrap(),
        std::fs::read(&memory_ram).unwrap()
    );
    assert_eq!(
        std::fs::read(&spill_index).unwrap(),
        std::fs::read(&memory_index).unwrap()
    );

    // Both variants answer queries; this one sits exactly on edge 0.
    let reader = open(&spill_ram, &spill_index);
    let snap = reader.snap(Coordinate::new(300, 400)).unwrap().unwrap();
    assert_eq!((snap.start, snap.target), (0, 1));
    assert_eq!(snap.foot, Coordinate::new(300, 400));
}

#[test]
fn test_long_edge_found_from_middle_cells() {
    // An edge spanning half a degree of longitude; queries near its
    // middle must still find it even though both endpoints are far away.
    let (_dir, ram, index) = build_index(&[(
        9,
        10,
        Coordinate::new(0, 0),
        Coordinate::new(0, 50_000),
    )]);
    let reader = open(&ram, &index);

    for lon in [10_000, 25_000, 40_000] {
        let snap = reader.snap(Coordinate::new(300, lon)).unwrap().unwrap();
        assert_eq!((snap.start, snap.target), (9, 10));
        assert_eq!(snap.foot, Coordinate::new(0, lon));
    }
}
