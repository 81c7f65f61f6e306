//! Line building, line merging and ring-to-polygon assembly.

use std::collections::BTreeMap;

use geo::{BoundingRect, Contains, Coord, LineString, Polygon};
use rstar::{
    AABB, RTree,
    primitives::{GeomWithData, Rectangle},
};

/// Minimum number of points of a closed ring: three distinct vertices plus
/// the closing point.
pub const MIN_RING_POINTS: usize = 4;

/// Build a line from ordered node references, skipping unresolved nodes.
///
/// Returns `None` when fewer than two points resolve.
#[must_use]
pub fn resolve_line(refs: &[i64], nodes: &BTreeMap<i64, Coord>) -> Option<LineString> {
    let coords: Vec<Coord> = refs.iter().filter_map(|id| nodes.get(id).copied()).collect();
    (coords.len() >= 2).then(|| LineString::new(coords))
}

/// Keep a line only when it forms a valid closed ring.
#[must_use]
pub fn closed_ring(line: LineString) -> Option<LineString> {
    (line.0.len() >= MIN_RING_POINTS && line.is_closed()).then_some(line)
}

fn endpoints(line: &LineString) -> Option<(Coord, Coord)> {
    Some((*line.0.first()?, *line.0.last()?))
}

type NodeKey = [u64; 2];

fn node_key(coord: Coord) -> NodeKey {
    // `-0.0 == 0.0` must share a key.
    [coord.x, coord.y].map(|value| {
        if value == 0.0 {
            0.0_f64.to_bits()
        } else {
            value.to_bits()
        }
    })
}

/// Number of line ends meeting at each endpoint.
fn endpoint_degrees(lines: &[LineString]) -> BTreeMap<NodeKey, usize> {
    let mut degrees = BTreeMap::new();
    for (start, end) in lines.iter().filter_map(endpoints) {
        *degrees.entry(node_key(start)).or_insert(0) += 1;
        *degrees.entry(node_key(end)).or_insert(0) += 1;
    }
    degrees
}

/// Merge lines sharing endpoints into maximal lines, reversing parts where
/// needed.
///
/// Lines are only joined through nodes where exactly two line ends meet, so
/// a spur attached to a ring never breaks it. Joins are greedy in input
/// order.
#[must_use]
pub fn merge_lines(lines: Vec<LineString>) -> Vec<LineString> {
    let mut pending: Vec<LineString> = lines.into_iter().filter(|l| l.0.len() >= 2).collect();
    let degrees = endpoint_degrees(&pending);
    let joinable = |coord: Coord| degrees.get(&node_key(coord)) == Some(&2);
    pending.reverse();
    let mut merged = Vec::new();

    while let Some(mut current) = pending.pop() {
        while !current.is_closed() {
            let Some((start, end)) = endpoints(&current) else {
                break;
            };
            let Some(position) = pending.iter().rposition(|candidate| {
                endpoints(candidate).is_some_and(|(s, e)| {
                    (joinable(end) && (s == end || e == end))
                        || (joinable(start) && (s == start || e == start))
                })
            }) else {
                break;
            };
            let next = pending.remove(position);
            current = join(current, next, start, end, joinable(end));
        }
        merged.push(current);
    }
    merged
}

fn join(
    current: LineString,
    mut next: LineString,
    start: Coord,
    end: Coord,
    end_joinable: bool,
) -> LineString {
    let mut coords = current.0;
    let (next_start, next_end) = endpoints(&next).unwrap_or((start, end));
    if end_joinable && next_start == end {
        coords.extend(next.0.into_iter().skip(1));
    } else if end_joinable && next_end == end {
        next.0.reverse();
        coords.extend(next.0.into_iter().skip(1));
    } else if next_end == start {
        next.0.extend(coords.into_iter().skip(1));
        coords = next.0;
    } else {
        next.0.reverse();
        next.0.extend(coords.into_iter().skip(1));
        coords = next.0;
    }
    LineString::new(coords)
}

/// Merge ring fragments and keep the valid closed rings.
#[must_use]
pub fn rings_from_lines(lines: Vec<LineString>) -> Vec<LineString> {
    merge_lines(lines)
        .into_iter()
        .filter_map(closed_ring)
        .collect()
}

type RingEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Attach every inner ring contained in an outer ring as a hole of it.
///
/// Produces one polygon per outer ring. Inner rings inside no outer ring are
/// discarded.
#[must_use]
pub fn polygons_with_holes(outers: Vec<LineString>, inners: &[LineString]) -> Vec<Polygon> {
    let envelopes: Vec<RingEnvelope> = inners
        .iter()
        .enumerate()
        .filter_map(|(index, ring)| {
            let rect = ring.bounding_rect()?;
            let (min, max) = (rect.min(), rect.max());
            Some(GeomWithData::new(
                Rectangle::from_corners([min.x, min.y], [max.x, max.y]),
                index,
            ))
        })
        .collect();
    let index = RTree::bulk_load(envelopes);

    outers
        .into_iter()
        .map(|outer| {
            let shell = Polygon::new(outer.clone(), Vec::new());
            let holes = outer
                .bounding_rect()
                .map(|rect| {
                    let envelope = AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    );
                    let mut candidates: Vec<usize> = index
                        .locate_in_envelope(&envelope)
                        .map(|entry| entry.data)
                        .collect();
                    candidates.sort_unstable();
                    candidates
                        .into_iter()
                        .filter_map(|candidate| inners.get(candidate))
                        .filter(|inner| shell.contains(&Polygon::new((*inner).clone(), Vec::new())))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            Polygon::new(outer, holes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, line_string};
    use rstest::rstest;

    fn square(min: f64, max: f64) -> LineString {
        line_string![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
            (x: min, y: min),
        ]
    }

    #[rstest]
    fn resolve_skips_missing_nodes() {
        let nodes = BTreeMap::from([(1, coord! { x: 0.0, y: 0.0 }), (3, coord! { x: 1.0, y: 1.0 })]);
        let line = resolve_line(&[1, 2, 3], &nodes).expect("two nodes resolve");
        assert_eq!(line.0.len(), 2);
        assert!(resolve_line(&[1, 2], &nodes).is_none(), "single point is not a line");
    }

    #[rstest]
    fn closed_ring_requires_closure_and_four_points() {
        assert!(closed_ring(square(0.0, 10.0)).is_some());
        let open = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        assert!(closed_ring(open).is_none());
        let degenerate = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 0.0)];
        assert!(closed_ring(degenerate).is_none());
    }

    #[rstest]
    fn merges_fragments_with_reversal() {
        let a = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0)];
        let b = line_string![(x: 0.0, y: 0.0), (x: 0.0, y: 10.0), (x: 10.0, y: 10.0)];
        let merged = merge_lines(vec![a, b]);
        assert_eq!(merged.len(), 1);
        let ring = merged.into_iter().next().expect("one ring");
        assert!(ring.is_closed());
        assert_eq!(ring.0.len(), 5);
    }

    #[rstest]
    fn keeps_disconnected_lines_apart() {
        let a = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)];
        let b = line_string![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0)];
        assert_eq!(merge_lines(vec![a, b]).len(), 2);
    }

    #[rstest]
    fn rings_from_three_fragments() {
        let parts = vec![
            line_string![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0)],
            line_string![(x: 4.0, y: 4.0), (x: 0.0, y: 4.0), (x: 0.0, y: 0.0)],
            line_string![(x: 4.0, y: 4.0), (x: 4.0, y: 0.0)],
        ];
        let rings = rings_from_lines(parts);
        assert_eq!(rings.len(), 1);
    }

    #[rstest]
    fn spur_at_a_ring_node_does_not_break_the_ring() {
        let south = line_string![(x: 0.0, y: 0.0), (x: 5.0, y: -5.0), (x: 10.0, y: 0.0)];
        let spur = line_string![(x: 10.0, y: 0.0), (x: 20.0, y: 0.0)];
        let north = line_string![(x: 10.0, y: 0.0), (x: 5.0, y: 5.0), (x: 0.0, y: 0.0)];
        let rings = rings_from_lines(vec![south, spur, north]);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].0.len(), 5);
    }

    #[rstest]
    fn lines_meeting_at_a_junction_stay_apart() {
        let a = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)];
        let b = line_string![(x: 1.0, y: 0.0), (x: 2.0, y: 0.0)];
        let c = line_string![(x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        assert_eq!(merge_lines(vec![a, b, c]).len(), 3);
    }

    #[rstest]
    fn attaches_only_contained_inner_rings() {
        let outers = vec![square(0.0, 10.0), square(20.0, 30.0)];
        let inners = vec![square(2.0, 4.0), square(40.0, 45.0), square(22.0, 24.0)];
        let polygons = polygons_with_holes(outers, &inners);
        assert_eq!(polygons.len(), 2);
        let holes: Vec<usize> = polygons.iter().map(|p| p.interiors().len()).collect();
        assert_eq!(holes, [1, 1]);
    }

    #[rstest]
    fn overlapping_inner_ring_is_not_a_hole() {
        let polygons = polygons_with_holes(vec![square(0.0, 10.0)], &[square(5.0, 15.0)]);
        let polygon = polygons.first().expect("one polygon");
        assert!(polygon.interiors().is_empty());
    }
}
