//! Geometry reconstruction from node, way and relation topology.
//!
//! A [`Topology`] holds the coordinates, way node lists and relation members
//! needed for one extraction. Its methods turn selected element ids into
//! [`Feature`]s. Elements that cannot form a valid geometry are dropped and
//! logged at `debug` level; reconstruction itself never fails.

use std::collections::BTreeMap;

use geo::{Coord, Geometry, LineString, MultiLineString, Point};
use log::debug;

use crate::{ElementId, MemberRole, RelationMember};

mod assemble;
mod reproject;

pub use assemble::{
    MIN_RING_POINTS, closed_ring, merge_lines, polygons_with_holes, resolve_line, rings_from_lines,
};
pub use reproject::{ProjectionError, Reprojector, STORAGE_EPSG, proj_definition, validate_epsg};

/// A geometry tagged with the element it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Source element.
    pub id: ElementId,
    /// Reconstructed geometry in storage coordinates.
    pub geometry: Geometry,
}

impl Feature {
    /// Pair a geometry with its source element.
    #[must_use]
    pub const fn new(id: ElementId, geometry: Geometry) -> Self {
        Self { id, geometry }
    }
}

/// Split multi-part geometries into their single parts.
#[must_use]
pub fn explode(geometry: Geometry) -> Vec<Geometry> {
    match geometry {
        Geometry::MultiPoint(points) => points.into_iter().map(Geometry::Point).collect(),
        Geometry::MultiLineString(lines) => lines.into_iter().map(Geometry::LineString).collect(),
        Geometry::MultiPolygon(polygons) => polygons.into_iter().map(Geometry::Polygon).collect(),
        Geometry::GeometryCollection(collection) => {
            collection.into_iter().flat_map(explode).collect()
        }
        single => vec![single],
    }
}

/// Coordinates and references read from the raw schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    /// Node coordinates by node id.
    pub nodes: BTreeMap<i64, Coord>,
    /// Ordered node references by way id.
    pub ways: BTreeMap<i64, Vec<i64>>,
    /// Ordered members by relation id.
    pub relations: BTreeMap<i64, Vec<RelationMember>>,
}

impl Topology {
    /// One point per node with known coordinates.
    pub fn points<I: IntoIterator<Item = i64>>(&self, ids: I) -> Vec<Feature> {
        ids.into_iter()
            .filter_map(|id| {
                let Some(coord) = self.nodes.get(&id) else {
                    debug!("node {id} has no coordinates, dropping");
                    return None;
                };
                Some(Feature::new(
                    ElementId::node(id),
                    Geometry::Point(Point::from(*coord)),
                ))
            })
            .collect()
    }

    fn way_line(&self, way: i64) -> Option<LineString> {
        let refs = self.ways.get(&way)?;
        resolve_line(refs, &self.nodes)
    }

    /// One line per way with at least two resolved nodes.
    pub fn way_lines<I: IntoIterator<Item = i64>>(&self, ids: I) -> Vec<Feature> {
        ids.into_iter()
            .filter_map(|id| {
                let Some(line) = self.way_line(id) else {
                    debug!("way {id} resolves to fewer than two points, dropping");
                    return None;
                };
                Some(Feature::new(ElementId::way(id), Geometry::LineString(line)))
            })
            .collect()
    }

    /// One polygon per way forming a valid closed ring.
    pub fn way_polygons<I: IntoIterator<Item = i64>>(&self, ids: I) -> Vec<Feature> {
        ids.into_iter()
            .filter_map(|id| {
                let Some(ring) = self.way_line(id).and_then(closed_ring) else {
                    debug!("way {id} is not a closed ring, dropping");
                    return None;
                };
                Some(Feature::new(
                    ElementId::way(id),
                    Geometry::Polygon(geo::Polygon::new(ring, Vec::new())),
                ))
            })
            .collect()
    }

    /// One multi-line per relation with at least two member lines.
    pub fn relation_lines<I: IntoIterator<Item = i64>>(&self, ids: I) -> Vec<Feature> {
        ids.into_iter()
            .filter_map(|id| {
                let members = self.relations.get(&id)?;
                let lines: Vec<LineString> = members
                    .iter()
                    .filter_map(|member| self.way_line(member.way))
                    .collect();
                if lines.len() < 2 {
                    debug!("relation {id} has {} member lines, dropping", lines.len());
                    return None;
                }
                Some(Feature::new(
                    ElementId::relation(id),
                    Geometry::MultiLineString(MultiLineString::new(lines)),
                ))
            })
            .collect()
    }

    /// One polygon per outer ring of each relation, with contained inner
    /// rings of the same relation as holes.
    pub fn relation_polygons<I: IntoIterator<Item = i64>>(&self, ids: I) -> Vec<Feature> {
        ids.into_iter()
            .flat_map(|id| {
                let polygons = self.relation_rings(id);
                if polygons.is_empty() {
                    debug!("relation {id} yields no closed outer ring, dropping");
                }
                polygons
                    .into_iter()
                    .map(move |polygon| Feature::new(ElementId::relation(id), Geometry::Polygon(polygon)))
            })
            .collect()
    }

    fn relation_rings(&self, id: i64) -> Vec<geo::Polygon> {
        let Some(members) = self.relations.get(&id) else {
            return Vec::new();
        };
        let lines_for = |role: &MemberRole| -> Vec<LineString> {
            members
                .iter()
                .filter(|member| &member.role == role)
                .filter_map(|member| self.way_line(member.way))
                .collect()
        };
        let outers = rings_from_lines(lines_for(&MemberRole::Outer));
        if outers.is_empty() {
            return Vec::new();
        }
        let inners = rings_from_lines(lines_for(&MemberRole::Inner));
        polygons_with_holes(outers, &inners)
    }
}
