//! Planar point-to-segment projection.
//!
//! Distances are squared and computed directly in fixed-point units with
//! latitude and longitude treated as planar axes. The absolute values
//! carry no physical meaning; candidates inside one small neighborhood
//! are only ranked against each other, which planar squared distance
//! does correctly.

use crate::types::Coordinate;

/// Foot of perpendicular of a point onto a segment, with the clamped
/// fractional position and the squared distance to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Closest point on the segment, truncated to fixed-point units.
    pub foot: Coordinate,
    /// Position of `foot` along the segment in [0, 1].
    pub ratio: f64,
    /// Squared planar distance from the query point to `foot`.
    pub dist_sq: f64,
}

/// Project `point` onto the segment from `source` to `target`.
///
/// A degenerate segment (both endpoints equal) projects everything onto
/// `source` with ratio 0.
///
/// # Examples
///
/// ```rust
/// use snapgrid::spatial::project;
/// use snapgrid::Coordinate;
///
/// let p = project(
///     Coordinate::new(500, 5_000),
///     Coordinate::new(0, 0),
///     Coordinate::new(0, 10_000),
/// );
/// assert_eq!(p.foot, Coordinate::new(0, 5_000));
/// assert_eq!(p.ratio, 0.5);
/// assert_eq!(p.dist_sq, 250_000.0);
/// ```
pub fn project(point: Coordinate, source: Coordinate, target: Coordinate) -> Projection {
    let v_lat = (target.lat - source.lat) as f64;
    let v_lon = (target.lon - source.lon) as f64;
    let w_lat = (point.lat - source.lat) as f64;
    let w_lon = (point.lon - source.lon) as f64;

    let length_sq = v_lat * v_lat + v_lon * v_lon;
    if length_sq == 0.0 {
        return Projection {
            foot: source,
            ratio: 0.0,
            dist_sq: w_lat * w_lat + w_lon * w_lon,
        };
    }

    let ratio = (v_lat * w_lat + v_lon * w_lon) / length_sq;
    if ratio <= 0.0 {
        return Projection {
            foot: source,
            ratio: 0.0,
            dist_sq: w_lat * w_lat + w_lon * w_lon,
        };
    }
    if ratio >= 1.0 {
        let d_lat = (point.lat - target.lat) as f64;
        let d_lon = (point.lon - target.lon) as f64;
        return Projection {
            foot: target,
            ratio: 1.0,
            dist_sq: d_lat * d_lat + d_lon * d_lon,
        };
    }

    let foot_lat = source.lat as f64 + ratio * v_lat;
    let foot_lon = source.lon as f64 + ratio * v_lon;
    let d_lat = foot_lat - point.lat as f64;
    let d_lon = foot_lon - point.lon as f64;
    Projection {
        foot: Coordinate::new(foot_lat as i32, foot_lon as i32),
        ratio,
        dist_sq: d_lat * d_lat + d_lon * d_lon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Coordinate = Coordinate::new(0, 0);
    const B: Coordinate = Coordinate::new(1_000, 1_000);

    #[test]
    fn test_project_onto_endpoint() {
        let p = project(Coordinate::new(0, 0), A, B);
        assert_eq!(p.foot, A);
        assert_eq!(p.ratio, 0.0);
        assert_eq!(p.dist_sq, 0.0);
    }

    #[test]
    fn test_project_onto_midpoint() {
        let p = project(Coordinate::new(500, 500), A, B);
        assert_eq!(p.foot, Coordinate::new(500, 500));
        assert!((p.ratio - 0.5).abs() < 1e-9);
        assert_eq!(p.dist_sq, 0.0);
    }

    #[test]
    fn test_clamp_before_source() {
        let p = project(Coordinate::new(-400, -300), A, B);
        assert_eq!(p.foot, A);
        assert_eq!(p.ratio, 0.0);
        assert_eq!(p.dist_sq, 250_000.0);
    }

    #[test]
    fn test_clamp_past_target() {
        let p = project(Coordinate::new(2_000, 2_000), A, B);
        assert_eq!(p.foot, B);
        assert_eq!(p.ratio, 1.0);
        assert_eq!(p.dist_sq, 2_000_000.0);
    }

    #[test]
    fn test_perpendicular_distance() {
        // Due-east segment, query offset 500 units north of its middle.
        let p = project(
            Coordinate::new(500, 5_000),
            Coordinate::new(0, 0),
            Coordinate::new(0, 10_000),
        );
        assert_eq!(p.foot, Coordinate::new(0, 5_000));
        assert!((p.ratio - 0.5).abs() < 1e-9);
        assert_eq!(p.dist_sq, 250_000.0);
    }

    #[test]
    fn test_degenerate_segment() {
        let p = project(Coordinate::new(30, 40), A, A);
        assert_eq!(p.foot, A);
        assert_eq!(p.ratio, 0.0);
        assert_eq!(p.dist_sq, 2_500.0);
    }

    #[test]
    fn test_distances_rank_consistently() {
        let near = project(Coordinate::new(510, 500), A, B);
        let far = project(Coordinate::new(700, 300), A, B);
        assert!(near.dist_sq < far.dist_sq);
    }
}
