//! Field polygon validation and measurement.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    BoundingRect, Contains, GeodesicArea, InteriorPoint, Intersects, Line, LineString,
    MultiPolygon, Point, Polygon,
};
use std::fmt::Write;

/// Square meters per international acre.
pub const SQUARE_METERS_PER_ACRE: f64 = 4_046.856_422_4;

/// Why a geometry cannot be used as a field boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryIssue {
    #[error("geometry has no polygons")]
    Empty,
    #[error("ring {ring} of polygon {polygon} has fewer than 4 positions")]
    DegenerateRing { polygon: usize, ring: usize },
    #[error("geometry contains a non-finite coordinate")]
    NonFinite,
    #[error("ring {ring} of polygon {polygon} intersects itself")]
    SelfIntersection { polygon: usize, ring: usize },
    #[error("hole {ring} of polygon {polygon} is not inside its exterior ring")]
    HoleOutsideShell { polygon: usize, ring: usize },
    #[error("polygons {first} and {second} overlap")]
    OverlappingPolygons { first: usize, second: usize },
    #[error("geometry encloses no area")]
    ZeroArea,
}

/// Checks that `geometry` is usable as a field boundary: at least one polygon,
/// every ring has at least four distinct positions and finite coordinates, no
/// ring crosses itself, holes lie inside their exterior, member polygons do
/// not overlap and the enclosed area is positive.
///
/// Repeated consecutive positions are tolerated. Ring indices count the
/// exterior as 0 and holes from 1.
pub fn validate(geometry: &MultiPolygon<f64>) -> Result<(), GeometryIssue> {
    if geometry.0.is_empty() {
        return Err(GeometryIssue::Empty);
    }
    for (p, polygon) in geometry.0.iter().enumerate() {
        for (r, ring) in rings(polygon).enumerate() {
            let ring = without_repeats(ring);
            if ring.0.len() < 4 {
                return Err(GeometryIssue::DegenerateRing { polygon: p, ring: r });
            }
            if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                return Err(GeometryIssue::NonFinite);
            }
            if ring_self_intersects(&ring) {
                return Err(GeometryIssue::SelfIntersection { polygon: p, ring: r });
            }
        }
        for (h, hole) in polygon.interiors().iter().enumerate() {
            if !ring_within(hole, polygon.exterior()) {
                return Err(GeometryIssue::HoleOutsideShell {
                    polygon: p,
                    ring: h + 1,
                });
            }
        }
    }
    for (i, first) in geometry.0.iter().enumerate() {
        for (j, second) in geometry.0.iter().enumerate().skip(i + 1) {
            if polygons_overlap(first, second) {
                return Err(GeometryIssue::OverlappingPolygons {
                    first: i,
                    second: j,
                });
            }
        }
    }
    if geometry.geodesic_area_unsigned() <= 0.0 {
        return Err(GeometryIssue::ZeroArea);
    }
    Ok(())
}

/// Geodesic area of a longitude/latitude geometry, in acres.
pub fn area_acres(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.geodesic_area_unsigned() / SQUARE_METERS_PER_ACRE
}

fn rings(polygon: &Polygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors().iter())
}

fn without_repeats(ring: &LineString<f64>) -> LineString<f64> {
    let mut coords = ring.0.clone();
    coords.dedup();
    LineString(coords)
}

fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    let segments: Vec<_> = ring.lines().collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                // Neighbouring segments always share a vertex.
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return true,
            }
        }
    }
    false
}

/// True when a segment of `a` passes through the interior of a segment of `b`.
/// Touching at a vertex or running along a shared edge is not a crossing.
fn rings_cross(a: &LineString<f64>, b: &LineString<f64>) -> bool {
    let others: Vec<Line<f64>> = b.lines().collect();
    a.lines().any(|segment| {
        others.iter().any(|other| {
            matches!(
                line_intersection(segment, *other),
                Some(LineIntersection::SinglePoint {
                    is_proper: true,
                    ..
                })
            )
        })
    })
}

fn ring_within(inner: &LineString<f64>, shell: &LineString<f64>) -> bool {
    if rings_cross(inner, shell) {
        return false;
    }
    let area = Polygon::new(shell.clone(), vec![]);
    inner.coords().all(|c| area.intersects(&Point::from(*c)))
}

fn polygons_overlap(a: &Polygon<f64>, b: &Polygon<f64>) -> bool {
    let (Some(box_a), Some(box_b)) = (a.bounding_rect(), b.bounding_rect()) else {
        return false;
    };
    if !box_a.intersects(&box_b) {
        return false;
    }
    if rings_cross(a.exterior(), b.exterior()) {
        return true;
    }
    reaches_into(a, b) || reaches_into(b, a)
}

/// Whether some interior position of `a` lies strictly inside `b`.
fn reaches_into(a: &Polygon<f64>, b: &Polygon<f64>) -> bool {
    a.interior_point().is_some_and(|point| b.contains(&point))
        || a.exterior().coords().any(|c| b.contains(&Point::from(*c)))
}

/// Renders a geometry as WKT, used for tabular sinks.
pub fn to_wkt(geometry: &MultiPolygon<f64>) -> String {
    let mut out = String::from("MULTIPOLYGON (");
    for (p, polygon) in geometry.0.iter().enumerate() {
        if p > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for (r, ring) in rings(polygon).enumerate() {
            if r > 0 {
                out.push_str(", ");
            }
            out.push('(');
            for (i, c) in ring.coords().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{} {}", c.x, c.y);
            }
            out.push(')');
        }
        out.push(')');
    }
    out.push(')');
    out
}
